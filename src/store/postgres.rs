//! PostgreSQL Ledger Store
//!
//! `accounts` and `transfers` tables (see `db::schema`). Balances and
//! amounts are `NUMERIC`, bound and decoded as `rust_decimal::Decimal` and
//! surfaced as canonical decimal text.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{AccountRow, LedgerStore, NewTransfer, StoreError, StoreTx, TransferRow};
use crate::money;

/// PostgreSQL-backed store
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn account_from_row(row: &PgRow) -> Result<AccountRow, StoreError> {
    let balance: Decimal = row.try_get("balance")?;
    Ok(AccountRow {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        balance: money::canonical(balance),
    })
}

fn transfer_from_row(row: &PgRow) -> Result<TransferRow, StoreError> {
    let amount: Decimal = row.try_get("amount")?;
    Ok(TransferRow {
        id: row.try_get("id")?,
        source_account_id: row.try_get("source_account_id")?,
        destination_account_id: row.try_get("destination_account_id")?,
        amount: money::canonical(amount),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn insert_account(
        &self,
        account_id: i64,
        balance: &str,
    ) -> Result<AccountRow, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (account_id, balance)
            VALUES ($1, $2)
            RETURNING id, account_id, balance
            "#,
        )
        .bind(account_id)
        .bind(money::parse(balance)?)
        .fetch_one(&self.pool)
        .await?;

        account_from_row(&row)
    }

    async fn find_account(&self, account_id: i64) -> Result<Option<AccountRow>, StoreError> {
        let row = sqlx::query(r#"SELECT id, account_id, balance FROM accounts WHERE account_id = $1"#)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_transfer(&self, transfer_id: i64) -> Result<Option<TransferRow>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, source_account_id, destination_account_id, amount, created_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(transfer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Open PostgreSQL transaction. sqlx rolls back on drop.
struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_account(&mut self, account_id: i64) -> Result<Option<AccountRow>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, balance FROM accounts
            WHERE account_id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn update_balance(&mut self, id: i64, balance: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(money::parse(balance)?)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!("account row {} not updated", id)));
        }
        Ok(())
    }

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> Result<TransferRow, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO transfers (source_account_id, destination_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, source_account_id, destination_account_id, amount, created_at
            "#,
        )
        .bind(transfer.source_account_id)
        .bind(transfer.destination_account_id)
        .bind(money::parse(&transfer.amount)?)
        .fetch_one(&mut *self.tx)
        .await?;

        transfer_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgStoreTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgStoreTx { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
