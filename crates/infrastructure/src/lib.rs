pub mod observability;
pub mod proxy;
pub mod storage;
pub mod task_queue;

pub use observability::{MetricsCollector, Monitor, StructuredLogger};
pub use proxy::{
    build_provider, ApiProxyProvider, FileProxyProvider, HttpProxyValidator, ProxyManager,
    ProxyManagerConfig, ProxyPoolStats, StaticProxyProvider,
};
pub use storage::{JsonFileStore, JsonTaskRepository, SqliteStore};
pub use task_queue::TaskQueue;
