use thiserror::Error;

/// 爬虫调度系统错误类型定义
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("任务参数校验失败: {0}")]
    Validation(String),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("非法的任务状态转换: {0}")]
    InvalidTransition(String),

    #[error("平台适配器错误: {0}")]
    Adapter(String),

    #[error("数据持久化错误: {0}")]
    Persistence(String),

    /// 任务注册表无法持久化，属于基础设施故障
    #[error("任务注册表持久化失败: {0}")]
    Registry(String),

    #[error("代理错误: {0}")]
    Proxy(String),

    #[error("不支持的平台: {0}")]
    UnsupportedPlatform(String),

    #[error("任务队列已满")]
    QueueFull,

    #[error("任务队列已关闭")]
    QueueClosed,

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl CrawlerError {
    /// 是否为需要上抛到进程边界的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlerError::Registry(_))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CrawlerError::Validation(message.into())
    }

    pub fn adapter(message: impl Into<String>) -> Self {
        CrawlerError::Adapter(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        CrawlerError::Persistence(message.into())
    }
}

impl From<serde_json::Error> for CrawlerError {
    fn from(err: serde_json::Error) -> Self {
        CrawlerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type CrawlerResult<T> = std::result::Result<T, CrawlerError>;
