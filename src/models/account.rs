use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for accounts table.
///
/// `starting_balance` + its effective date anchor all valuations; everything
/// else about account worth is derived from positions and cash transactions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub label: String,
    pub starting_balance: Decimal,
    pub starting_balance_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}
