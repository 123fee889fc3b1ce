use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db::{account_repo, event_repo, position_repo};
use crate::errors::LedgerError;
use crate::ledger::{replay, validate, EventInput, PositionState};
use crate::models::{EventKind, EventSource, Instrument, OptionType, Position, PositionEvent};
use crate::valuation::ValuationCache;

/// A manual event as requested by the caller. `shares` is the unsigned
/// magnitude; direction comes from `kind`.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub kind: EventKind,
    pub shares: i64,
    pub price: Decimal,
    pub occurred_at: Option<DateTime<Utc>>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub note: Option<String>,
}

/// Full replacement of an event's user-editable fields. Edits are modeled
/// as retract + reinsert: the caller supplies the complete new shape and the
/// position replays from scratch.
#[derive(Debug, Clone)]
pub struct EventUpdate {
    pub shares: i64,
    pub price: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub note: Option<String>,
}

/// Open a new position for an account with its first event.
pub async fn open_position(
    pool: &PgPool,
    cache: Option<&ValuationCache>,
    account_id: Uuid,
    ticker: &str,
    instrument: Instrument,
    first: NewEvent,
) -> Result<Position, LedgerError> {
    validate::validate_ticker(ticker)?;
    validate::validate_new_event(0, first.kind, first.shares, first.price)?;

    account_repo::get_account(pool, account_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("account {account_id}")))?;

    let occurred_at = first.occurred_at.unwrap_or_else(Utc::now);
    let (strike, expiry, opt_type) = match &instrument {
        Instrument::Equity => (None, None, None),
        Instrument::Option {
            strike,
            expiry,
            option_type,
        } => (Some(*strike), Some(*expiry), Some(option_type)),
    };

    let mut tx = pool.begin().await?;

    let position = position_repo::insert_position(
        &mut *tx,
        account_id,
        ticker,
        instrument.kind_str(),
        strike,
        expiry,
        opt_type.map(OptionType::as_str),
        occurred_at,
    )
    .await?;

    event_repo::insert_event(
        &mut *tx,
        position.id,
        first.kind.as_str(),
        validate::signed_shares(first.kind, first.shares),
        first.price,
        first.stop_loss,
        first.take_profit,
        EventSource::Manual.as_str(),
        None,
        occurred_at,
        first.note.as_deref(),
    )
    .await?;
    counter!("ledger_events_total").increment(1);

    let state = replay_and_store(&mut tx, position.id).await?;
    let position = position_repo::get_position(&mut *tx, position.id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("position {}", position.id)))?;

    tx.commit().await?;

    tracing::info!(
        position = %position.id,
        account = %account_id,
        ticker = %ticker,
        shares = state.current_shares,
        "Position opened"
    );

    if let Some(cache) = cache {
        cache.invalidate_account(account_id).await;
    }

    Ok(position)
}

/// Append an event to an existing position and recompute its aggregate.
pub async fn add_event(
    pool: &PgPool,
    cache: Option<&ValuationCache>,
    position_id: Uuid,
    event: NewEvent,
) -> Result<PositionEvent, LedgerError> {
    let position = position_repo::get_position(pool, position_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("position {position_id}")))?;

    let occurred_at = event.occurred_at.unwrap_or_else(Utc::now);

    // Exposure as of the event's date, not the aggregate's current shares:
    // a backdated sell must not exceed what the ledger held at that point.
    let existing: Vec<EventInput> = event_repo::events_for_position(pool, position_id)
        .await?
        .iter()
        .map(to_input)
        .collect();
    let held = validate::exposure_at(&existing, event.kind, occurred_at);
    validate::validate_new_event(held, event.kind, event.shares, event.price)?;

    let mut tx = pool.begin().await?;

    let inserted = event_repo::insert_event(
        &mut *tx,
        position_id,
        event.kind.as_str(),
        validate::signed_shares(event.kind, event.shares),
        event.price,
        event.stop_loss,
        event.take_profit,
        EventSource::Manual.as_str(),
        None,
        occurred_at,
        event.note.as_deref(),
    )
    .await?;
    counter!("ledger_events_total").increment(1);

    let state = replay_and_store(&mut tx, position_id).await?;
    let refreshed = event_repo::get_event(&mut *tx, inserted.id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("event {}", inserted.id)))?;

    tx.commit().await?;

    tracing::info!(
        position = %position_id,
        event = %refreshed.id,
        kind = %event.kind,
        shares = event.shares,
        price = %event.price,
        realized = ?refreshed.realized_pnl,
        "Event recorded"
    );

    invalidate_if_valuation_changed(cache, &position, &state).await;

    Ok(refreshed)
}

/// Replace an event's financial fields, then replay the whole position.
pub async fn edit_event(
    pool: &PgPool,
    cache: Option<&ValuationCache>,
    event_id: Uuid,
    update: EventUpdate,
) -> Result<PositionEvent, LedgerError> {
    let existing = event_repo::get_event(pool, event_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("event {event_id}")))?;
    let position = position_repo::get_position(pool, existing.position_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("position {}", existing.position_id)))?;

    let kind = EventKind::from_str(&existing.kind)
        .ok_or_else(|| LedgerError::Internal(anyhow::anyhow!("corrupt event kind {}", existing.kind)))?;

    if update.shares <= 0 {
        return Err(LedgerError::InvalidQuantity(format!(
            "shares must be positive, got {}",
            update.shares
        )));
    }
    if update.price <= Decimal::ZERO {
        return Err(LedgerError::InvalidPrice(format!(
            "price must be positive, got {}",
            update.price
        )));
    }

    let mut tx = pool.begin().await?;

    event_repo::update_event(
        &mut *tx,
        event_id,
        validate::signed_shares(kind, update.shares),
        update.price,
        update.occurred_at,
        update.stop_loss,
        update.take_profit,
        update.note.as_deref(),
    )
    .await?;

    let state = replay_and_store(&mut tx, existing.position_id).await?;
    let refreshed = event_repo::get_event(&mut *tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("event {event_id}")))?;

    tx.commit().await?;

    tracing::info!(
        position = %existing.position_id,
        event = %event_id,
        "Event edited, position replayed"
    );

    invalidate_if_valuation_changed(cache, &position, &state).await;

    Ok(refreshed)
}

/// Delete one event and replay. The last remaining event of a position may
/// not be deleted — delete the position instead.
pub async fn delete_event(
    pool: &PgPool,
    cache: Option<&ValuationCache>,
    event_id: Uuid,
) -> Result<(), LedgerError> {
    let existing = event_repo::get_event(pool, event_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("event {event_id}")))?;
    let position = position_repo::get_position(pool, existing.position_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("position {}", existing.position_id)))?;

    if event_repo::count_events(pool, existing.position_id).await? <= 1 {
        return Err(LedgerError::CannotDeleteLastEvent);
    }

    let mut tx = pool.begin().await?;
    event_repo::delete_event(&mut *tx, event_id).await?;
    let state = replay_and_store(&mut tx, existing.position_id).await?;
    tx.commit().await?;

    tracing::info!(
        position = %existing.position_id,
        event = %event_id,
        "Event deleted, position replayed"
    );

    invalidate_if_valuation_changed(cache, &position, &state).await;

    Ok(())
}

/// Delete a position wholesale; its events and pending orders cascade.
pub async fn delete_position(
    pool: &PgPool,
    cache: Option<&ValuationCache>,
    position_id: Uuid,
) -> Result<(), LedgerError> {
    let position = position_repo::get_position(pool, position_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("position {position_id}")))?;

    position_repo::delete_position(pool, position_id).await?;

    tracing::info!(
        position = %position_id,
        account = %position.account_id,
        ticker = %position.ticker,
        "Position deleted"
    );

    if let Some(cache) = cache {
        cache.invalidate_account(position.account_id).await;
    }

    Ok(())
}

/// Replay a position's full event history inside the caller's transaction
/// and write the derived fields back: per-event snapshots, then the
/// aggregate row. Event write + recomputation commit or roll back together.
pub(crate) async fn replay_and_store(
    conn: &mut PgConnection,
    position_id: Uuid,
) -> Result<PositionState, LedgerError> {
    let rows = event_repo::events_for_position(&mut *conn, position_id).await?;
    let inputs: Vec<EventInput> = rows.iter().map(to_input).collect();
    let state = replay(&inputs);

    for ev in &state.events {
        event_repo::update_event_derived(
            &mut *conn,
            ev.id,
            ev.shares_before,
            ev.shares_after,
            ev.realized_pnl,
        )
        .await?;
    }
    position_repo::update_aggregate(&mut *conn, position_id, &state).await?;
    counter!("ledger_replays_total").increment(1);

    Ok(state)
}

fn to_input(row: &PositionEvent) -> EventInput {
    EventInput {
        id: row.id,
        shares: row.shares,
        price: row.price,
        occurred_at: row.occurred_at,
        stop_loss: row.stop_loss,
        take_profit: row.take_profit,
    }
}

/// Valuation inputs change when realized P&L or the closed date moved.
async fn invalidate_if_valuation_changed(
    cache: Option<&ValuationCache>,
    before: &Position,
    after: &PositionState,
) {
    let changed = before.total_realized_pnl != after.total_realized_pnl
        || before.closed_at != after.closed_at;
    if changed {
        if let Some(cache) = cache {
            cache.invalidate_account(before.account_id).await;
        }
    }
}
