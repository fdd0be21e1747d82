//! Decimal Arithmetic Module
//!
//! Exact base-10 arithmetic over monetary amounts carried as decimal text.
//! Balances and amounts cross every boundary (cache, API, store adapters) as
//! strings; all math goes through this module.
//!
//! ## Two Entry Points
//! - `parse` / `canonical` / `try_add` / `try_sub`: fallible, used wherever the input may
//!   come from a client (validation layer, store adapters, transfer engine).
//! - `add` / `sub` / `less_than` / `greater_than` / `equal`: string-in,
//!   string-out operations for values that were already validated. Malformed
//!   input here is a programming error and panics.
//!
//! ## Canonical Form
//! No exponent notation, trailing fractional zeros trimmed, `-0` rendered as
//! `0`. `canonical(parse(canonical(x)))` is always `canonical(x)`.
//!
//! ```rust
//! use txn_ledger::money;
//!
//! assert_eq!(money::sub("500", "150"), "350");
//! assert_eq!(money::add("0.10", "0.20"), "0.3");
//! assert!(money::less_than("99.99", "100"));
//! ```

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Decimal conversion errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Amount exceeds exact decimal range")]
    Overflow,
}

// ============================================================================
// Parse / Format
// ============================================================================

/// Largest number of fractional digits a `Decimal` can carry.
pub const MAX_SCALE: usize = 28;

/// Parse decimal text into an exact `Decimal`.
///
/// Accepts an optional sign, digits, and an optional fractional part.
/// Exponent notation, surrounding garbage, and values a 96-bit mantissa
/// cannot hold exactly are rejected, never rounded.
pub fn parse(text: &str) -> Result<Decimal, MoneyError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let well_formed = !int_part.is_empty()
        && int_part.chars().all(|c| c.is_ascii_digit())
        && frac_part.chars().all(|c| c.is_ascii_digit())
        && (frac_part.is_empty() == !digits.contains('.'));
    if !well_formed {
        return Err(MoneyError::InvalidFormat(text.to_string()));
    }

    let int_sig = int_part.trim_start_matches('0');
    let frac_sig = frac_part.trim_end_matches('0');
    if frac_sig.len() > MAX_SCALE {
        return Err(MoneyError::Overflow);
    }

    let int_sig = if int_sig.is_empty() { "0" } else { int_sig };
    let exact = match (negative, frac_sig.is_empty()) {
        (false, true) => int_sig.to_string(),
        (true, true) => format!("-{}", int_sig),
        (false, false) => format!("{}.{}", int_sig, frac_sig),
        (true, false) => format!("-{}.{}", int_sig, frac_sig),
    };
    let value = Decimal::from_str(&exact).map_err(|_| MoneyError::Overflow)?;
    // from_str rounds away fractional digits the mantissa cannot hold
    if value.scale() as usize != frac_sig.len() {
        return Err(MoneyError::Overflow);
    }
    Ok(value)
}

/// Render a `Decimal` in canonical text form.
pub fn canonical(value: Decimal) -> String {
    let normalized = value.normalize();
    if normalized.is_zero() {
        // normalize() keeps the sign bit of a negative zero
        return "0".to_string();
    }
    normalized.to_string()
}

/// Parse then re-render; used to store and compare amounts consistently.
pub fn normalize(text: &str) -> Result<String, MoneyError> {
    parse(text).map(canonical)
}

fn require(text: &str) -> Decimal {
    match parse(text) {
        Ok(value) => value,
        Err(e) => panic!("money: malformed decimal {:?}: {}", text, e),
    }
}

// ============================================================================
// Arithmetic (validated input only)
// ============================================================================

/// `a + b` in canonical form.
///
/// # Panics
/// If either operand is not a valid decimal or the sum is not exact.
pub fn add(a: &str, b: &str) -> String {
    let (x, y) = (require(a), require(b));
    match exact(x, y, x.checked_add(y)) {
        Ok(sum) => canonical(sum),
        Err(e) => panic!("money: adding {:?} and {:?}: {}", a, b, e),
    }
}

/// Fallible `a + b` for sums whose size depends on client input.
pub fn try_add(a: &str, b: &str) -> Result<String, MoneyError> {
    let (a, b) = (parse(a)?, parse(b)?);
    exact(a, b, a.checked_add(b)).map(canonical)
}

/// `a - b` in canonical form.
///
/// # Panics
/// If either operand is not a valid decimal or the difference is not exact.
pub fn sub(a: &str, b: &str) -> String {
    let (x, y) = (require(a), require(b));
    match exact(x, y, x.checked_sub(y)) {
        Ok(diff) => canonical(diff),
        Err(e) => panic!("money: subtracting {:?} from {:?}: {}", b, a, e),
    }
}

/// Fallible `a - b` for differences whose size depends on client input.
pub fn try_sub(a: &str, b: &str) -> Result<String, MoneyError> {
    let (a, b) = (parse(a)?, parse(b)?);
    exact(a, b, a.checked_sub(b)).map(canonical)
}

/// `checked_add`/`checked_sub` only fail past the integer range. A result
/// whose digits do not fit the mantissa comes back rescaled and rounded, so
/// the scale of the operands must survive.
fn exact(a: Decimal, b: Decimal, result: Option<Decimal>) -> Result<Decimal, MoneyError> {
    match result {
        Some(value) if value.scale() == a.scale().max(b.scale()) => Ok(value),
        _ => Err(MoneyError::Overflow),
    }
}

/// # Panics
/// If either operand is not a valid decimal.
pub fn less_than(a: &str, b: &str) -> bool {
    require(a) < require(b)
}

/// # Panics
/// If either operand is not a valid decimal.
pub fn greater_than(a: &str, b: &str) -> bool {
    require(a) > require(b)
}

/// Numeric equality, so `"1.50" == "1.5"`.
///
/// # Panics
/// If either operand is not a valid decimal.
pub fn equal(a: &str, b: &str) -> bool {
    require(a) == require(b)
}
