//! 平台适配器接口
//!
//! 每个平台实现一次 [`CrawlerAdapter`]，并通过 [`AdapterFactory`] 注册到
//! [`crate::AdapterRegistry`]。执行器为每次执行创建新的适配器实例，
//! 实例绑定到本次选中的代理。

use async_trait::async_trait;

use crate::{
    models::{CanonicalRecord, ProxyRecord},
    CrawlerResult,
};

/// 平台抓取能力
///
/// 任何方法返回的错误都会被执行器统一视为任务失败。
#[async_trait]
pub trait CrawlerAdapter: Send + Sync {
    /// 初始化会话，例如检查平台端点是否可用
    async fn start(&self) -> CrawlerResult<()>;

    async fn search(&self, query: &str, max_results: u32) -> CrawlerResult<Vec<CanonicalRecord>>;

    async fn get_content_detail(&self, content_id: &str) -> CrawlerResult<CanonicalRecord>;

    async fn get_comments(
        &self,
        content_id: &str,
        max_results: u32,
    ) -> CrawlerResult<Vec<CanonicalRecord>>;

    async fn get_user_profile(&self, creator_id: &str) -> CrawlerResult<CanonicalRecord>;

    async fn get_user_content(
        &self,
        creator_id: &str,
        max_results: u32,
    ) -> CrawlerResult<Vec<CanonicalRecord>>;

    fn get_platform_name(&self) -> &str;

    fn get_supported_features(&self) -> Vec<String>;
}

/// 适配器构造器
pub trait AdapterFactory: Send + Sync {
    /// 创建绑定到指定代理的适配器，`None` 表示直连
    fn create(&self, proxy: Option<&ProxyRecord>) -> CrawlerResult<Box<dyn CrawlerAdapter>>;

    fn platform(&self) -> &str;

    fn supported_features(&self) -> Vec<String> {
        Vec::new()
    }
}
