//! 任务调度核心
//!
//! - [`TaskDeduplicator`]: 按任务指纹过滤重复任务
//! - [`RateThrottler`]: 每秒准入上限
//! - [`TaskScheduler`]: 任务注册表、准入流水线、分发与执行结果记账

pub mod deduplicator;
pub mod scheduler;
pub mod throttler;

pub use deduplicator::TaskDeduplicator;
pub use scheduler::{SchedulerSettings, ShutdownSummary, TaskScheduler, TickSummary};
pub use throttler::RateThrottler;
