use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for pending_orders table.
///
/// Import-only context record: a cancelled or still-working broker order that
/// was not consumed as a stop-loss match. Never enters cost-basis math.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingOrder {
    pub id: Uuid,
    pub account_id: Uuid,
    pub position_id: Option<Uuid>,

    pub symbol: String,
    /// "BUY", "SHORT" or "SELL".
    pub side: String,
    /// "PENDING" or "CANCELLED".
    pub status: String,
    pub shares: i64,
    pub price: Decimal,
    pub placed_at: DateTime<Utc>,

    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}
