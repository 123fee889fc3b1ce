pub mod cache;
pub mod formula;
pub mod service;

pub use cache::ValuationCache;
pub use formula::{AccountBreakdown, CashFlow, EquityPoint, RealizedClose};
pub use service::ValuationService;
