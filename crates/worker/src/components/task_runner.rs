use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crawler_core::{
    AdapterRegistry, CanonicalRecord, CrawlerAdapter, CrawlerError, CrawlerResult, MonitorEvent,
    PersistenceGateway, ProxyRecord, Task, TaskKind, TaskMonitor,
};
use crawler_infrastructure::ProxyManager;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::{panic_message, CancellationFlag};

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// 单次适配器调用失败后的重试次数
    pub adapter_retries: u32,
    pub adapter_retry_delay: Duration,
    /// 无可用代理时是否判定失败
    pub require_proxy: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            adapter_retries: 0,
            adapter_retry_delay: Duration::from_millis(1000),
            require_proxy: false,
        }
    }
}

/// 一次执行的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Succeeded { records: usize },
    Failed { error: String },
    /// 在检查点观察到取消标记后退出
    Cancelled,
}

enum Interrupt {
    Cancelled,
    Error(CrawlerError),
}

impl From<CrawlerError> for Interrupt {
    fn from(err: CrawlerError) -> Self {
        Interrupt::Error(err)
    }
}

type StepResult<T> = Result<T, Interrupt>;

/// 执行单个任务的抓取流水线
///
/// 选择代理 → 创建适配器 → 按任务类型抓取 → 逐条写入持久化网关。
/// 取消检查点位于首次调用前、抓取步骤之间以及每条记录写入之间。
pub struct TaskRunner {
    registry: AdapterRegistry,
    gateway: Arc<dyn PersistenceGateway>,
    proxy_manager: Option<Arc<ProxyManager>>,
    monitor: Arc<dyn TaskMonitor>,
    config: ExecutionConfig,
}

impl TaskRunner {
    pub fn new(
        registry: AdapterRegistry,
        gateway: Arc<dyn PersistenceGateway>,
        proxy_manager: Option<Arc<ProxyManager>>,
        monitor: Arc<dyn TaskMonitor>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            registry,
            gateway,
            proxy_manager,
            monitor,
            config,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    pub async fn run(&self, task: &Task, cancel: &CancellationFlag) -> ExecutionOutcome {
        let started = Instant::now();
        let result = match AssertUnwindSafe(self.run_with_proxy(task, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("任务 {} 的抓取流水线发生panic: {}", task.id, message);
                Err(CrawlerError::Internal(format!("执行过程中发生panic: {message}")).into())
            }
        };
        let outcome = match result {
            Ok(records) => ExecutionOutcome::Succeeded { records },
            Err(Interrupt::Cancelled) => ExecutionOutcome::Cancelled,
            Err(Interrupt::Error(e)) => ExecutionOutcome::Failed {
                error: e.to_string(),
            },
        };
        let duration = started.elapsed();

        match &outcome {
            ExecutionOutcome::Succeeded { records } => self.monitor.record(MonitorEvent::Success {
                task_id: task.id.clone(),
                platform: task.platform.clone(),
                duration,
                records: *records,
            }),
            ExecutionOutcome::Failed { error } => self.monitor.record(MonitorEvent::Failure {
                task_id: task.id.clone(),
                platform: task.platform.clone(),
                duration,
                error: error.clone(),
            }),
            ExecutionOutcome::Cancelled => {
                info!("任务 {} 在检查点观察到取消标记，已退出", task.id);
            }
        }

        outcome
    }

    async fn run_with_proxy(&self, task: &Task, cancel: &CancellationFlag) -> StepResult<usize> {
        checkpoint(cancel)?;

        let Some(manager) = &self.proxy_manager else {
            return self.run_pipeline(task, None, cancel).await;
        };

        let proxy = manager.acquire().await;
        if proxy.is_none() {
            self.monitor.record(MonitorEvent::ProxyExhausted {
                task_id: task.id.clone(),
            });
            if self.config.require_proxy {
                return Err(CrawlerError::Proxy("没有可用的代理".to_string()).into());
            }
            warn!("任务 {} 没有可用代理，直连执行", task.id);
        }

        let result = self.run_pipeline(task, proxy.as_ref(), cancel).await;

        if let Some(proxy) = &proxy {
            if let Err(Interrupt::Error(CrawlerError::Adapter(_) | CrawlerError::Network(_))) =
                &result
            {
                manager.report_failure(proxy).await;
            }
        }

        result
    }

    async fn run_pipeline(
        &self,
        task: &Task,
        proxy: Option<&ProxyRecord>,
        cancel: &CancellationFlag,
    ) -> StepResult<usize> {
        let adapter = self.registry.create_adapter(&task.platform, proxy).await?;
        let adapter: &dyn CrawlerAdapter = adapter.as_ref();

        self.with_retry("start", cancel, move || adapter.start()).await?;
        checkpoint(cancel)?;

        let max = task.max_results;
        match task.kind {
            TaskKind::Search => {
                let query = task.query.as_deref().unwrap_or_default();
                let records = self
                    .with_retry("search", cancel, move || adapter.search(query, max))
                    .await?;
                self.store_all(&records, cancel).await
            }
            TaskKind::Detail => {
                let content_id = target(task)?;
                let detail = self
                    .with_retry("get_content_detail", cancel, move || {
                        adapter.get_content_detail(content_id)
                    })
                    .await?;
                self.store_all(std::slice::from_ref(&detail), cancel).await?;
                checkpoint(cancel)?;

                let comments = self
                    .with_retry("get_comments", cancel, move || adapter.get_comments(content_id, max))
                    .await?;
                Ok(1 + self.store_all(&comments, cancel).await?)
            }
            TaskKind::Creator => {
                let creator_id = target(task)?;
                let profile = self
                    .with_retry("get_user_profile", cancel, move || adapter.get_user_profile(creator_id))
                    .await?;
                self.store_all(std::slice::from_ref(&profile), cancel).await?;
                checkpoint(cancel)?;

                let contents = self
                    .with_retry("get_user_content", cancel, move || {
                        adapter.get_user_content(creator_id, max)
                    })
                    .await?;
                Ok(1 + self.store_all(&contents, cancel).await?)
            }
        }
    }

    async fn store_all(
        &self,
        records: &[CanonicalRecord],
        cancel: &CancellationFlag,
    ) -> StepResult<usize> {
        for record in records {
            checkpoint(cancel)?;
            self.gateway.store_record(record).await?;
        }
        Ok(records.len())
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationFlag,
        mut call: F,
    ) -> StepResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CrawlerResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.adapter_retries => {
                    attempt += 1;
                    warn!(
                        "适配器调用 {operation} 失败 (第 {attempt}/{} 次重试): {e}",
                        self.config.adapter_retries
                    );
                    tokio::time::sleep(self.config.adapter_retry_delay).await;
                    checkpoint(cancel)?;
                }
                Err(e) => {
                    debug!("适配器调用 {operation} 失败: {e}");
                    return Err(e.into());
                }
            }
        }
    }
}

fn checkpoint(cancel: &CancellationFlag) -> StepResult<()> {
    if cancel.is_cancelled() {
        Err(Interrupt::Cancelled)
    } else {
        Ok(())
    }
}

fn target(task: &Task) -> StepResult<&str> {
    task.target_id
        .as_deref()
        .ok_or_else(|| CrawlerError::validation(format!("{} 任务缺少 target_id", task.kind)).into())
}
