use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::ledger::PositionState;
use crate::models::Position;

pub async fn insert_position<'e>(
    exec: impl PgExecutor<'e>,
    account_id: Uuid,
    ticker: &str,
    instrument: &str,
    option_strike: Option<Decimal>,
    option_expiry: Option<NaiveDate>,
    option_type: Option<&str>,
    opened_at: DateTime<Utc>,
) -> anyhow::Result<Position> {
    let pos = sqlx::query_as::<_, Position>(
        r#"
        INSERT INTO positions (account_id, ticker, instrument, option_strike, option_expiry, option_type, opened_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(ticker)
    .bind(instrument)
    .bind(option_strike)
    .bind(option_expiry)
    .bind(option_type)
    .bind(opened_at)
    .fetch_one(exec)
    .await?;

    Ok(pos)
}

pub async fn get_position<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
) -> anyhow::Result<Option<Position>> {
    let pos = sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE id = $1")
        .bind(id)
        .fetch_optional(exec)
        .await?;

    Ok(pos)
}

pub async fn positions_for_account<'e>(
    exec: impl PgExecutor<'e>,
    account_id: Uuid,
) -> anyhow::Result<Vec<Position>> {
    let positions = sqlx::query_as::<_, Position>(
        "SELECT * FROM positions WHERE account_id = $1 ORDER BY opened_at ASC",
    )
    .bind(account_id)
    .fetch_all(exec)
    .await?;

    Ok(positions)
}

/// Write replayed aggregate state back onto the position row. Always called
/// in the same transaction as the event mutation that triggered the replay.
pub async fn update_aggregate<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
    state: &PositionState,
) -> anyhow::Result<Position> {
    let pos = sqlx::query_as::<_, Position>(
        r#"
        UPDATE positions
        SET status = $2,
            current_shares = $3,
            avg_entry_price = $4,
            total_cost = $5,
            total_realized_pnl = $6,
            current_stop_loss = $7,
            current_take_profit = $8,
            closed_at = $9,
            opened_at = COALESCE($10, opened_at)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(state.status.as_str())
    .bind(state.current_shares)
    .bind(state.avg_entry_price)
    .bind(state.total_cost)
    .bind(state.total_realized_pnl)
    .bind(state.current_stop_loss)
    .bind(state.current_take_profit)
    .bind(state.closed_at)
    .bind(state.opened_at)
    .fetch_one(exec)
    .await?;

    Ok(pos)
}

pub async fn update_risk<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
    original_risk_percent: Option<Decimal>,
    current_risk_percent: Option<Decimal>,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE positions SET original_risk_percent = $2, current_risk_percent = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(original_risk_percent)
    .bind(current_risk_percent)
    .execute(exec)
    .await?;

    Ok(())
}

/// Delete a position; events and linked pending orders cascade.
pub async fn delete_position<'e>(exec: impl PgExecutor<'e>, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM positions WHERE id = $1")
        .bind(id)
        .execute(exec)
        .await?;

    Ok(())
}

/// (closed_at, total_realized_pnl) for every closed position of an account,
/// the valuation service's realized-P&L input.
pub async fn closed_positions<'e>(
    exec: impl PgExecutor<'e>,
    account_id: Uuid,
) -> anyhow::Result<Vec<(DateTime<Utc>, Decimal)>> {
    let rows = sqlx::query_as::<_, (DateTime<Utc>, Decimal)>(
        r#"
        SELECT closed_at, total_realized_pnl
        FROM positions
        WHERE account_id = $1 AND status = 'CLOSED' AND closed_at IS NOT NULL
        ORDER BY closed_at ASC
        "#,
    )
    .bind(account_id)
    .fetch_all(exec)
    .await?;

    Ok(rows)
}
