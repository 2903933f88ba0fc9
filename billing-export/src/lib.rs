pub mod config;
pub mod observability;
pub mod rates;
pub mod task;
pub mod warehouse;

pub use task::{ExportTask, RunOutcome};
