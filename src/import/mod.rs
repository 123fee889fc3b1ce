pub mod parser;
pub mod reconcile;
pub mod runner;

pub use parser::{parse_rows, BrokerProfile, BrokerRow, RowError, RowSide, RowStatus};
pub use reconcile::{build_plan, ImportPlan, PlannedEvent, PlannedOrder, PlannedPosition};
pub use runner::{import_batch, ImportResult};
