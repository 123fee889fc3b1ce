use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for position_events table — the append-only ledger.
///
/// `shares` is signed: positive for BUY, negative for SELL. `shares_before`,
/// `shares_after` and `realized_pnl` are derived during replay and rewritten
/// whenever the position's history is recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PositionEvent {
    pub id: Uuid,
    /// Monotonic insertion sequence, the final replay-order tiebreak.
    pub seq: i64,
    pub position_id: Uuid,

    /// "BUY" or "SELL".
    pub kind: String,
    pub shares: i64,
    pub price: Decimal,

    /// Stop-loss / take-profit as observed at event time.
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,

    /// "MANUAL", "IMPORT" or "ADJUSTMENT".
    pub source: String,
    /// Correlation id back to the originating import row, when imported.
    pub source_ref: Option<String>,

    pub shares_before: i64,
    pub shares_after: i64,
    /// Set only on events that reduced exposure (sell or short cover).
    pub realized_pnl: Option<Decimal>,

    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
