use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::PendingOrder;

#[allow(clippy::too_many_arguments)]
pub async fn insert_pending_order<'e>(
    exec: impl PgExecutor<'e>,
    account_id: Uuid,
    position_id: Option<Uuid>,
    symbol: &str,
    side: &str,
    status: &str,
    shares: i64,
    price: Decimal,
    placed_at: DateTime<Utc>,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> anyhow::Result<PendingOrder> {
    let order = sqlx::query_as::<_, PendingOrder>(
        r#"
        INSERT INTO pending_orders
            (account_id, position_id, symbol, side, status, shares, price, placed_at, stop_loss, take_profit)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(position_id)
    .bind(symbol)
    .bind(side)
    .bind(status)
    .bind(shares)
    .bind(price)
    .bind(placed_at)
    .bind(stop_loss)
    .bind(take_profit)
    .fetch_one(exec)
    .await?;

    Ok(order)
}

pub async fn orders_for_position<'e>(
    exec: impl PgExecutor<'e>,
    position_id: Uuid,
) -> anyhow::Result<Vec<PendingOrder>> {
    let orders = sqlx::query_as::<_, PendingOrder>(
        "SELECT * FROM pending_orders WHERE position_id = $1 ORDER BY placed_at ASC",
    )
    .bind(position_id)
    .fetch_all(exec)
    .await?;

    Ok(orders)
}

pub async fn orders_for_account<'e>(
    exec: impl PgExecutor<'e>,
    account_id: Uuid,
) -> anyhow::Result<Vec<PendingOrder>> {
    let orders = sqlx::query_as::<_, PendingOrder>(
        "SELECT * FROM pending_orders WHERE account_id = $1 ORDER BY placed_at ASC",
    )
    .bind(account_id)
    .fetch_all(exec)
    .await?;

    Ok(orders)
}
