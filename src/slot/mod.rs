//! Slot lifecycle: per-slot configuration, the per-slot pipeline engine,
//! and the manager that owns up to four of them.

pub mod config;
pub mod engine;
pub mod manager;

pub use config::{ConfigError, ConfigStore, SlotConfig};
pub use engine::{SlotEngine, SlotState, SlotStatus, StartError};
pub use manager::{AggregateStatus, SlotManager};
