pub mod replay;
pub mod validate;

pub use replay::{replay, EventInput, PositionState, ReplayedEvent};
