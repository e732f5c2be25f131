use async_trait::async_trait;

use crate::{
    models::{CanonicalRecord, RecordType},
    CrawlerResult,
};

/// 持久化网关
///
/// 所有写入都以 `(platform, id)` 为键幂等更新。
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn store_content(&self, record: &CanonicalRecord) -> CrawlerResult<()>;

    async fn store_comment(&self, record: &CanonicalRecord) -> CrawlerResult<()>;

    async fn store_creator(&self, record: &CanonicalRecord) -> CrawlerResult<()>;

    async fn close(&self) -> CrawlerResult<()>;

    /// 按记录类型分派到对应的写入方法
    async fn store_record(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        match record.record_type {
            RecordType::Content => self.store_content(record).await,
            RecordType::Comment => self.store_comment(record).await,
            RecordType::Creator => self.store_creator(record).await,
        }
    }
}
