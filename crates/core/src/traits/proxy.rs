use async_trait::async_trait;

use crate::{models::ProxyRecord, CrawlerResult};

/// 代理来源
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// 拉取一批候选代理，`limit` 为期望数量上限
    async fn fetch(&self, limit: usize) -> CrawlerResult<Vec<ProxyRecord>>;

    fn name(&self) -> &str;
}

/// 代理可用性探测
#[async_trait]
pub trait ProxyValidator: Send + Sync {
    /// 网络错误、超时和非200响应都返回 `false`
    async fn probe(&self, proxy: &ProxyRecord) -> bool;
}
