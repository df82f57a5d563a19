pub mod harness;
pub mod latency;
pub mod logger;
pub mod metrics;

pub use harness::{execute, execute_async, StageCall};
pub use logger::RunLogger;
pub use metrics::{RunMetrics, Stage};
