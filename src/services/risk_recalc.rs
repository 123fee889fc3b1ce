use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{event_repo, position_repo};
use crate::errors::LedgerError;
use crate::valuation::ValuationService;

#[derive(Debug, Clone, Serialize)]
pub struct RiskRecalcSummary {
    pub total_positions: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// True when the recomputed risk pair differs from what the position row
/// already stores. Writing only on change is what makes a second recalc
/// pass over unchanged data update zero positions.
pub fn risk_changed(
    stored_original: Option<Decimal>,
    stored_current: Option<Decimal>,
    original: Decimal,
    current: Option<Decimal>,
) -> bool {
    stored_original != Some(original) || stored_current != current
}

/// Percent of account value put at risk by a stop:
/// `|entry − stop| × shares / account_value × 100`.
pub fn risk_percent(
    entry_price: Decimal,
    stop_loss: Decimal,
    shares: i64,
    account_value: Decimal,
) -> Decimal {
    (entry_price - stop_loss).abs() * Decimal::from(shares.abs()) / account_value
        * Decimal::ONE_HUNDRED
}

/// Re-derive stored risk percentages for every position of an account.
///
/// Run whenever the starting balance or its effective date changes — the
/// denominator (account value at open) moves for every position at once.
/// Positions without an original stop-loss cannot be computed and are left
/// untouched; positions whose account value at open is non-positive are
/// counted as errors, not fatal to the batch. All writes share one
/// transaction.
pub async fn recalculate_risk(
    pool: &PgPool,
    valuation: &ValuationService,
    account_id: Uuid,
) -> Result<RiskRecalcSummary, LedgerError> {
    let positions = position_repo::positions_for_account(pool, account_id).await?;
    let today = Utc::now().date_naive();

    let mut summary = RiskRecalcSummary {
        total_positions: positions.len(),
        updated: 0,
        unchanged: 0,
        errors: 0,
    };

    let mut tx = pool.begin().await?;

    for pos in &positions {
        let events = event_repo::events_for_position(&mut *tx, pos.id).await?;
        let Some(first) = events.first() else {
            // A position without events should not exist; count, move on.
            summary.errors += 1;
            continue;
        };

        let Some(stop) = first.stop_loss else {
            summary.unchanged += 1;
            continue;
        };

        let value_at_open = valuation
            .value_at(account_id, pos.opened_at.date_naive())
            .await?;
        if value_at_open <= Decimal::ZERO {
            tracing::warn!(
                position = %pos.id,
                opened_at = %pos.opened_at,
                "Risk recalc: non-positive account value at open"
            );
            summary.errors += 1;
            continue;
        }

        let original = risk_percent(first.price, stop, first.shares, value_at_open);

        let current = if pos.is_open() {
            match pos.current_stop_loss {
                Some(current_stop) => {
                    let value_today = valuation.value_at(account_id, today).await?;
                    if value_today > Decimal::ZERO {
                        Some(risk_percent(
                            pos.avg_entry_price,
                            current_stop,
                            pos.current_shares,
                            value_today,
                        ))
                    } else {
                        None
                    }
                }
                None => None,
            }
        } else {
            None
        };

        if risk_changed(
            pos.original_risk_percent,
            pos.current_risk_percent,
            original,
            current,
        ) {
            position_repo::update_risk(&mut *tx, pos.id, Some(original), current).await?;
            summary.updated += 1;
        } else {
            summary.unchanged += 1;
        }
    }

    tx.commit().await?;

    tracing::info!(
        account = %account_id,
        total = summary.total_positions,
        updated = summary.updated,
        unchanged = summary.unchanged,
        errors = summary.errors,
        "Risk recalculation finished"
    );

    Ok(summary)
}
