use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for positions table — the denormalized aggregate.
///
/// Every derived field (shares, cost, realized P&L, status, closed_at) is
/// recomputed from the event history on each mutation; nothing here is ever
/// hand-patched.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Position {
    pub id: Uuid,
    pub account_id: Uuid,
    pub ticker: String,

    /// "EQUITY" or "OPTION".
    pub instrument: String,
    pub option_strike: Option<Decimal>,
    pub option_expiry: Option<NaiveDate>,
    pub option_type: Option<String>,

    /// "OPEN" or "CLOSED".
    pub status: String,
    /// Signed: negative means short.
    pub current_shares: i64,
    pub avg_entry_price: Decimal,
    pub total_cost: Decimal,
    pub total_realized_pnl: Decimal,

    pub current_stop_loss: Option<Decimal>,
    pub current_take_profit: Option<Decimal>,
    pub original_risk_percent: Option<Decimal>,
    pub current_risk_percent: Option<Decimal>,

    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == "OPEN"
    }
}
