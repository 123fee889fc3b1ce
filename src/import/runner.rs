use std::io::Read;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{account_repo, event_repo, pending_order_repo, position_repo};
use crate::errors::LedgerError;
use crate::import::parser::{self, BrokerProfile};
use crate::import::reconcile::{self, ImportPlan};
use crate::models::EventSource;
use crate::services::position_service;
use crate::valuation::ValuationCache;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    pub imported_count: usize,
    pub positions_touched: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Import a broker CSV export for an account.
///
/// Parse → reconcile → persist. The whole batch is one transaction: any
/// row-level validation failure aborts before a single write, and any
/// storage failure rolls everything back. Reconciliation warnings
/// (unmatched stops, duplicates) ride along with a successful result.
pub async fn import_batch<R: Read>(
    pool: &PgPool,
    cache: Option<&ValuationCache>,
    account_id: Uuid,
    reader: R,
    profile: Option<&BrokerProfile>,
) -> Result<ImportResult, LedgerError> {
    let start = Instant::now();
    counter!("import_batches_total").increment(1);

    account_repo::get_account(pool, account_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("account {account_id}")))?;

    let default_profile = BrokerProfile::default();
    let profile = profile.unwrap_or(&default_profile);

    let rows = match parser::parse_rows(reader, profile) {
        Ok(rows) => rows,
        Err(row_errors) => {
            counter!("import_failures_total").increment(1);
            tracing::warn!(
                account = %account_id,
                errors = row_errors.len(),
                "Import rejected: row-level validation failures"
            );
            return Ok(ImportResult {
                errors: row_errors.iter().map(|e| e.to_string()).collect(),
                ..Default::default()
            });
        }
    };
    counter!("import_rows_total").increment(rows.len() as u64);

    let plan = reconcile::build_plan(&rows);
    let result = persist_plan(pool, account_id, &plan).await?;

    if let Some(cache) = cache {
        cache.invalidate_account(account_id).await;
    }

    histogram!("import_batch_seconds").record(start.elapsed().as_secs_f64());
    tracing::info!(
        account = %account_id,
        events = result.imported_count,
        positions = result.positions_touched,
        warnings = result.warnings.len(),
        "Import committed"
    );

    Ok(result)
}

/// Materialize a reconciled plan inside one transaction: positions, their
/// events (replayed through the same FIFO engine as manual entry), and
/// residual pending orders.
async fn persist_plan(
    pool: &PgPool,
    account_id: Uuid,
    plan: &ImportPlan,
) -> Result<ImportResult, LedgerError> {
    let mut tx = pool.begin().await?;

    for planned in &plan.positions {
        let Some(first) = planned.events.first() else {
            continue;
        };

        let position = position_repo::insert_position(
            &mut *tx,
            account_id,
            &planned.symbol,
            "EQUITY",
            None,
            None,
            None,
            first.occurred_at,
        )
        .await?;

        for event in &planned.events {
            event_repo::insert_event(
                &mut *tx,
                position.id,
                event.kind.as_str(),
                event.shares,
                event.price,
                event.stop_loss,
                None,
                EventSource::Import.as_str(),
                Some(&event.source_ref),
                event.occurred_at,
                None,
            )
            .await?;
            counter!("ledger_events_total").increment(1);
        }

        position_service::replay_and_store(&mut tx, position.id).await?;

        for order in &planned.orders {
            pending_order_repo::insert_pending_order(
                &mut *tx,
                account_id,
                Some(position.id),
                &order.symbol,
                order.side.as_str(),
                order.status.as_str(),
                order.shares,
                order.price,
                order.placed_at,
                None,
                None,
            )
            .await?;
        }
    }

    for order in &plan.orphan_orders {
        pending_order_repo::insert_pending_order(
            &mut *tx,
            account_id,
            None,
            &order.symbol,
            order.side.as_str(),
            order.status.as_str(),
            order.shares,
            order.price,
            order.placed_at,
            None,
            None,
        )
        .await?;
    }

    tx.commit().await?;

    Ok(ImportResult {
        imported_count: plan.event_count(),
        positions_touched: plan.positions.len(),
        warnings: plan.warnings.clone(),
        errors: Vec::new(),
    })
}
