use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::errors::LedgerError;
use crate::ledger::EventInput;
use crate::models::EventKind;

/// Validate a ticker symbol before a position is created.
pub fn validate_ticker(ticker: &str) -> Result<(), LedgerError> {
    if ticker.trim().is_empty() {
        return Err(LedgerError::InvalidTicker("ticker must not be empty".into()));
    }
    Ok(())
}

/// Validate a manual event write against the position's current exposure.
///
/// `shares` is the unsigned magnitude the caller is requesting. The replay
/// engine itself is total (it can flip direction when replaying broker
/// history), but manual entries are held to stricter rules: a SELL may not
/// exceed a long holding and a BUY may not over-cover a short. Opening or
/// extending a short via SELL-from-flat is allowed.
pub fn validate_new_event(
    current_shares: i64,
    kind: EventKind,
    shares: i64,
    price: Decimal,
) -> Result<(), LedgerError> {
    if shares <= 0 {
        return Err(LedgerError::InvalidQuantity(format!(
            "shares must be positive, got {shares}"
        )));
    }
    if price <= Decimal::ZERO {
        return Err(LedgerError::InvalidPrice(format!(
            "price must be positive, got {price}"
        )));
    }

    match kind {
        EventKind::Sell if current_shares > 0 && shares > current_shares => {
            Err(LedgerError::InsufficientShares {
                held: current_shares,
                requested: shares,
            })
        }
        EventKind::Buy if current_shares < 0 && shares > -current_shares => {
            Err(LedgerError::InsufficientShares {
                held: current_shares,
                requested: shares,
            })
        }
        _ => Ok(()),
    }
}

/// Signed exposure the ledger holds just before a new event of `kind` at
/// `occurred_at` would replay, given the position's existing events in
/// replay order.
///
/// A backdated entry must be checked here, not against the aggregate's
/// current shares: a SELL dated before the buys it needs would pass the
/// aggregate check yet replay as an unintended short. Equal-timestamp
/// placement mirrors replay order — an existing buy sorts before the new
/// event either way, an existing sell sorts before a new sell (the new
/// event inserts last) but after a new buy.
pub fn exposure_at(events: &[EventInput], kind: EventKind, occurred_at: DateTime<Utc>) -> i64 {
    events
        .iter()
        .filter(|e| {
            e.occurred_at < occurred_at
                || (e.occurred_at == occurred_at && (kind == EventKind::Sell || e.shares > 0))
        })
        .map(|e| e.shares)
        .sum()
}

/// Signed share delta for storage: buys positive, sells negative.
pub fn signed_shares(kind: EventKind, shares: i64) -> i64 {
    match kind {
        EventKind::Buy => shares,
        EventKind::Sell => -shares,
    }
}
