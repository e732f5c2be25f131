//! # 数据模型
//!
//! 爬虫调度核心使用的数据结构。
//!
//! ## 核心模型
//!
//! - [`Task`] / [`TaskSpec`]: 抓取任务及其提交参数，[`TaskHash`] 是去重用的派生标识
//! - [`CanonicalRecord`]: 适配器返回、存储层落盘的标准化记录
//! - [`ProxyRecord`]: 代理池中的一条代理
//! - [`MonitorEvent`] / [`MonitorStats`]: 监控事件与统计快照
//!
//! ## 任务状态流转
//!
//! ```text
//! pending → running → completed
//!    │         └────→ failed
//!    └──→ cancelled
//! ```
//!
//! 周期任务执行结束后回到 `pending`，`scheduled_at` 至少前移一个间隔。
//!
//! 所有时间字段使用 `DateTime<Utc>`，所有模型实现 serde 序列化，
//! 任务注册表以 JSON 文档形式按 `id` 持久化。

pub mod monitor;
pub mod proxy;
pub mod record;
pub mod task;

pub use monitor::*;
pub use proxy::*;
pub use record::*;
pub use task::*;
