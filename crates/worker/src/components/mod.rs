use std::any::Any;

pub mod cancellation;
pub mod task_execution;
pub mod task_runner;

pub use cancellation::CancellationFlag;
pub use task_execution::{ExecutionReport, TaskExecutionManager};
pub use task_runner::{ExecutionConfig, ExecutionOutcome, TaskRunner};

/// 取出 panic 负载中的文本
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知panic".to_string()
    }
}
