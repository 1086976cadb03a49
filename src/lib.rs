pub mod collector;
pub mod config;
pub mod fetch;
pub mod merged;
pub mod process;

pub use collector::{CollectReport, Collector, CycleOutcome};
pub use config::Config;
