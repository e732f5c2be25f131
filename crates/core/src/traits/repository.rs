use async_trait::async_trait;

use crate::{models::Task, CrawlerResult};

/// 任务注册表的持久化接口
///
/// 注册表以 `id` 为键整体保存。保存失败会以 `CrawlerError::Registry`
/// 返回，调度器将其视为致命错误。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn load_all(&self) -> CrawlerResult<Vec<Task>>;

    async fn save_all(&self, tasks: &[Task]) -> CrawlerResult<()>;
}
