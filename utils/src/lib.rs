//! Cross-cutting utilities: logging initialisation and statistics.

pub mod logging;
pub mod stats;

pub use logging::init_tracing;
pub use stats::{DetailType, Direction, StatType, Stats};
