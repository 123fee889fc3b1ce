use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{account_repo, cash_repo};
use crate::errors::LedgerError;
use crate::models::{CashKind, CashTransaction};
use crate::valuation::ValuationCache;

/// Record a deposit or withdrawal. The amount is always positive; direction
/// comes from the kind.
pub async fn add_cash(
    pool: &PgPool,
    cache: Option<&ValuationCache>,
    account_id: Uuid,
    kind: CashKind,
    amount: Decimal,
    occurred_on: NaiveDate,
    note: Option<&str>,
) -> Result<CashTransaction, LedgerError> {
    validate_amount(amount)?;
    account_repo::get_account(pool, account_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("account {account_id}")))?;

    let txn = cash_repo::insert_cash(pool, account_id, kind.as_str(), amount, occurred_on, note)
        .await?;

    tracing::info!(
        account = %account_id,
        cash_txn = %txn.id,
        kind = %kind.as_str(),
        amount = %amount,
        "Cash transaction recorded"
    );

    if let Some(cache) = cache {
        cache.invalidate_account(account_id).await;
    }

    Ok(txn)
}

/// Edit a cash transaction. Account value is always derived at read time,
/// so reverse-then-reapply reduces to an atomic row replacement plus cache
/// invalidation.
pub async fn edit_cash(
    pool: &PgPool,
    cache: Option<&ValuationCache>,
    cash_id: Uuid,
    kind: CashKind,
    amount: Decimal,
    occurred_on: NaiveDate,
    note: Option<&str>,
) -> Result<CashTransaction, LedgerError> {
    validate_amount(amount)?;
    let existing = cash_repo::get_cash(pool, cash_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("cash transaction {cash_id}")))?;

    let txn =
        cash_repo::update_cash(pool, cash_id, kind.as_str(), amount, occurred_on, note).await?;

    tracing::info!(account = %existing.account_id, cash_txn = %cash_id, "Cash transaction edited");

    if let Some(cache) = cache {
        cache.invalidate_account(existing.account_id).await;
    }

    Ok(txn)
}

pub async fn delete_cash(
    pool: &PgPool,
    cache: Option<&ValuationCache>,
    cash_id: Uuid,
) -> Result<(), LedgerError> {
    let existing = cash_repo::get_cash(pool, cash_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("cash transaction {cash_id}")))?;

    cash_repo::delete_cash(pool, cash_id).await?;

    tracing::info!(account = %existing.account_id, cash_txn = %cash_id, "Cash transaction deleted");

    if let Some(cache) = cache {
        cache.invalidate_account(existing.account_id).await;
    }

    Ok(())
}

fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity(format!(
            "cash amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
