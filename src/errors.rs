use serde::Serialize;

/// Domain error taxonomy for the ledger engine.
///
/// Validation and conflict errors are rejected before any write; nothing is
/// ever partially applied. Reconciliation warnings are *not* errors — they
/// travel alongside successful results (see `ImportResult`).
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("insufficient shares: holding {held}, requested {requested}")]
    InsufficientShares { held: i64, requested: i64 },

    #[error("cannot delete the last event of a position; delete the position instead")]
    CannotDeleteLastEvent,

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => LedgerError::NotFound("row not found".into()),
            other => LedgerError::Internal(other.into()),
        }
    }
}

/// Wire-friendly error body for embedding transports (HTTP layer, schedulers).
#[derive(Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl LedgerError {
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.to_string(),
        }
    }
}
