//! 代理池
//!
//! [`ProxyManager`] 从一个 [`crawler_core::ProxyProvider`] 拉取候选代理，
//! 通过 [`crawler_core::ProxyValidator`] 并发校验后轮询分配。

pub mod manager;
pub mod providers;
pub mod validator;

pub use manager::{ProxyManager, ProxyManagerConfig, ProxyPoolStats};
pub use providers::{build_provider, ApiProxyProvider, FileProxyProvider, StaticProxyProvider};
pub use validator::HttpProxyValidator;
