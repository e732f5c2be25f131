use serde::{Deserialize, Serialize};

use super::validation::ConfigValidator;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 轮询间隔（秒），取值 1..=60
    pub tick_interval_seconds: u64,
    pub max_concurrent_tasks: usize,
    pub max_tasks_per_second: usize,
    pub dedup_capacity: usize,
    pub queue_capacity: usize,
    pub dequeue_timeout_ms: u64,
    pub shutdown_timeout_seconds: u64,
    /// 为 false 时一次性任务完成后从注册表移除
    pub retain_completed_tasks: bool,
    pub default_max_results: u32,
    pub max_results_limit: u32,
    /// 单次适配器调用的重试次数
    pub adapter_retries: u32,
    pub adapter_retry_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 5,
            max_concurrent_tasks: 5,
            max_tasks_per_second: 10,
            dedup_capacity: 10_000,
            queue_capacity: 1000,
            dequeue_timeout_ms: 1000,
            shutdown_timeout_seconds: 30,
            retain_completed_tasks: true,
            default_max_results: 100,
            max_results_limit: 10_000,
            adapter_retries: 0,
            adapter_retry_delay_ms: 1000,
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if !(1..=60).contains(&self.tick_interval_seconds) {
            return Err(anyhow::anyhow!(
                "调度间隔必须在1到60秒之间: {}",
                self.tick_interval_seconds
            ));
        }

        if self.max_concurrent_tasks == 0 {
            return Err(anyhow::anyhow!("最大并发任务数必须大于0"));
        }

        if self.max_tasks_per_second == 0 {
            return Err(anyhow::anyhow!("每秒最大准入数必须大于0"));
        }

        if self.dedup_capacity < 2 {
            return Err(anyhow::anyhow!("去重容量至少为2"));
        }

        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("任务队列容量必须大于0"));
        }

        if self.dequeue_timeout_ms == 0 {
            return Err(anyhow::anyhow!("出队超时必须大于0"));
        }

        if self.default_max_results == 0 {
            return Err(anyhow::anyhow!("默认结果数必须大于0"));
        }

        if self.default_max_results > self.max_results_limit {
            return Err(anyhow::anyhow!(
                "默认结果数 {} 超过上限 {}",
                self.default_max_results,
                self.max_results_limit
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// 任务注册表文件
    pub task_file: String,
    pub backend: StorageBackend,
    /// JSON 记录存储目录
    pub data_dir: String,
    pub sqlite_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            task_file: "data/scheduled_tasks.json".to_string(),
            backend: StorageBackend::Json,
            data_dir: "data".to_string(),
            sqlite_url: "sqlite://data/crawler.db".to_string(),
        }
    }
}

impl ConfigValidator for StorageConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.task_file.trim().is_empty() {
            return Err(anyhow::anyhow!("任务注册表文件路径不能为空"));
        }

        match self.backend {
            StorageBackend::Json if self.data_dir.trim().is_empty() => {
                Err(anyhow::anyhow!("JSON存储目录不能为空"))
            }
            StorageBackend::Sqlite if !self.sqlite_url.starts_with("sqlite:") => Err(
                anyhow::anyhow!("SQLite连接串必须以 sqlite: 开头: {}", self.sqlite_url),
            ),
            _ => Ok(()),
        }
    }
}
