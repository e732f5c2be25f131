pub mod adapter_registry;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use adapter_registry::AdapterRegistry;
pub use config::AppConfig;
pub use errors::*;
pub use logging::init_logging;
pub use models::{
    CanonicalRecord, ErrorRecord, HealthReport, HealthStatus, MonitorEvent, MonitorStats,
    ProxyRecord, ProxyScheme, RecordType, StoredRecord, Task, TaskFilter, TaskHash, TaskKind,
    TaskSpec, TaskStatus, ABANDONED_AT_SHUTDOWN, DEFAULT_MAX_RESULTS, INTERRUPTED_BY_RESTART,
    MAX_INTERVAL_SECONDS,
};
pub use traits::*;
