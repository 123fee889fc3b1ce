pub mod config;
pub mod db;
pub mod errors;
pub mod import;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod services;
pub mod valuation;

use std::time::Duration;

use crate::config::AppConfig;
use crate::valuation::ValuationService;

/// Shared handle for embedding collaborators (HTTP layer, schedulers).
/// Service errors are `errors::LedgerError`; transports render them with
/// `LedgerError::to_body()`.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    pub valuation: ValuationService,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, config: AppConfig) -> Self {
        let valuation = ValuationService::new(
            db.clone(),
            Duration::from_secs(config.valuation_cache_ttl_secs),
        );
        Self {
            db,
            config,
            valuation,
        }
    }
}

/// Install the tracing subscriber for embedding binaries. Honors `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
