use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::PositionEvent;

/// Replay order: event time, then buys before sells on equal timestamps
/// (same-timestamp stop-loss fills must land after the buy they protect),
/// then insertion sequence. `seq` is the tiebreak rather than `created_at`
/// because one import batch inserts everything in a single transaction and
/// NOW() is fixed per transaction — the timestamps all collide.
const REPLAY_ORDER: &str =
    "ORDER BY occurred_at ASC, CASE WHEN shares > 0 THEN 0 ELSE 1 END ASC, seq ASC";

#[allow(clippy::too_many_arguments)]
pub async fn insert_event<'e>(
    exec: impl PgExecutor<'e>,
    position_id: Uuid,
    kind: &str,
    shares: i64,
    price: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    source: &str,
    source_ref: Option<&str>,
    occurred_at: DateTime<Utc>,
    note: Option<&str>,
) -> anyhow::Result<PositionEvent> {
    let event = sqlx::query_as::<_, PositionEvent>(
        r#"
        INSERT INTO position_events
            (position_id, kind, shares, price, stop_loss, take_profit, source, source_ref, occurred_at, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(position_id)
    .bind(kind)
    .bind(shares)
    .bind(price)
    .bind(stop_loss)
    .bind(take_profit)
    .bind(source)
    .bind(source_ref)
    .bind(occurred_at)
    .bind(note)
    .fetch_one(exec)
    .await?;

    Ok(event)
}

pub async fn get_event<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
) -> anyhow::Result<Option<PositionEvent>> {
    let event = sqlx::query_as::<_, PositionEvent>("SELECT * FROM position_events WHERE id = $1")
        .bind(id)
        .fetch_optional(exec)
        .await?;

    Ok(event)
}

pub async fn events_for_position<'e>(
    exec: impl PgExecutor<'e>,
    position_id: Uuid,
) -> anyhow::Result<Vec<PositionEvent>> {
    let sql = format!("SELECT * FROM position_events WHERE position_id = $1 {REPLAY_ORDER}");
    let events = sqlx::query_as::<_, PositionEvent>(&sql)
        .bind(position_id)
        .fetch_all(exec)
        .await?;

    Ok(events)
}

/// Patch user-editable fields. The caller must replay the position's full
/// history afterwards; this never touches derived columns.
#[allow(clippy::too_many_arguments)]
pub async fn update_event<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
    shares: i64,
    price: Decimal,
    occurred_at: DateTime<Utc>,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    note: Option<&str>,
) -> anyhow::Result<PositionEvent> {
    let event = sqlx::query_as::<_, PositionEvent>(
        r#"
        UPDATE position_events
        SET shares = $2, price = $3, occurred_at = $4, stop_loss = $5, take_profit = $6, note = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(shares)
    .bind(price)
    .bind(occurred_at)
    .bind(stop_loss)
    .bind(take_profit)
    .bind(note)
    .fetch_one(exec)
    .await?;

    Ok(event)
}

/// Write replay-derived fields (shares snapshot + realized P&L) back onto an
/// event row.
pub async fn update_event_derived<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
    shares_before: i64,
    shares_after: i64,
    realized_pnl: Option<Decimal>,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE position_events SET shares_before = $2, shares_after = $3, realized_pnl = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(shares_before)
    .bind(shares_after)
    .bind(realized_pnl)
    .execute(exec)
    .await?;

    Ok(())
}

pub async fn delete_event<'e>(exec: impl PgExecutor<'e>, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM position_events WHERE id = $1")
        .bind(id)
        .execute(exec)
        .await?;

    Ok(())
}

pub async fn count_events<'e>(
    exec: impl PgExecutor<'e>,
    position_id: Uuid,
) -> anyhow::Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM position_events WHERE position_id = $1")
            .bind(position_id)
            .fetch_one(exec)
            .await?;

    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::REPLAY_ORDER;

    // Same-timestamp, same-sign events (two sells of one batch) must replay
    // in a stable order or per-event realized P&L attribution drifts between
    // recomputes. Only a monotonic key guarantees that.
    #[test]
    fn test_replay_order_tiebreaks_on_monotonic_seq() {
        assert!(REPLAY_ORDER.starts_with("ORDER BY occurred_at ASC"));
        assert!(REPLAY_ORDER.ends_with("seq ASC"));
        assert!(!REPLAY_ORDER.contains("created_at"));
    }
}
