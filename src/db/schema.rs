use anyhow::{Context, Result};
use sqlx::PgPool;

/// Create the ledger tables if they do not exist. Safe to run repeatedly.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Ensuring PostgreSQL schema...");

    sqlx::query(CREATE_ACCOUNTS_TABLE)
        .execute(pool)
        .await
        .context("Failed to create accounts table")?;

    sqlx::query(CREATE_TRANSFERS_TABLE)
        .execute(pool)
        .await
        .context("Failed to create transfers table")?;

    tracing::info!("PostgreSQL schema ready");
    Ok(())
}

const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          BIGSERIAL PRIMARY KEY,
    account_id  BIGINT NOT NULL UNIQUE,
    balance     NUMERIC NOT NULL CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    id                      BIGSERIAL PRIMARY KEY,
    source_account_id       BIGINT NOT NULL REFERENCES accounts (account_id),
    destination_account_id  BIGINT NOT NULL REFERENCES accounts (account_id),
    amount                  NUMERIC NOT NULL CHECK (amount > 0),
    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (source_account_id <> destination_account_id)
)
"#;
