pub mod metrics_collector;
pub mod monitor;
pub mod structured_logger;

pub use metrics_collector::MetricsCollector;
pub use monitor::Monitor;
pub use structured_logger::StructuredLogger;
