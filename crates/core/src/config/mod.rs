//! 配置模型与加载
//!
//! 配置按功能分段，每段实现 [`ConfigValidator`]，加载时逐段校验，
//! 任何一段无效都会返回带上下文的错误。

pub mod api_observability;
pub mod app_config;
pub mod proxy_monitor;
pub mod scheduler_storage;
pub mod validation;

pub use api_observability::*;
pub use app_config::*;
pub use proxy_monitor::*;
pub use scheduler_storage::*;
pub use validation::*;
