pub mod components;
pub mod http_adapter;

pub use components::{
    CancellationFlag, ExecutionConfig, ExecutionOutcome, ExecutionReport, TaskExecutionManager,
    TaskRunner,
};
pub use http_adapter::{register_http_adapters, HttpAdapter, HttpAdapterFactory};
