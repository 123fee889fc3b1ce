use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for cash_transactions table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CashTransaction {
    pub id: Uuid,
    pub account_id: Uuid,

    /// "DEPOSIT" or "WITHDRAWAL".
    pub kind: String,
    /// Always positive; direction comes from `kind`.
    pub amount: Decimal,
    pub occurred_on: NaiveDate,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
