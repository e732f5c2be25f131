use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crawler_api::AppState;
use crawler_core::{
    config::{AppConfig, StorageBackend},
    AdapterRegistry, PersistenceGateway, TaskRepository,
};
use crawler_dispatcher::{SchedulerSettings, ShutdownSummary, TaskScheduler};
use crawler_infrastructure::{
    build_provider, HttpProxyValidator, JsonFileStore, JsonTaskRepository, MetricsCollector,
    Monitor, ProxyManager, ProxyManagerConfig, SqliteStore,
};
use crawler_worker::{register_http_adapters, ExecutionConfig, TaskRunner};
use tracing::{error, info, warn};

use crate::shutdown::ShutdownManager;

/// API服务在关闭时的最长等待时间
const API_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const DISPATCH_EXIT_GRACE: Duration = Duration::from_secs(1);

/// 主应用程序
///
/// 组件在 [`Application::new`] 中显式装配，不使用全局状态。
pub struct Application {
    config: AppConfig,
    scheduler: Arc<TaskScheduler>,
    monitor: Arc<Monitor>,
    proxy_manager: Option<Arc<ProxyManager>>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let metrics = Arc::new(MetricsCollector::new());
        let monitor = Arc::new(Monitor::with_metrics(
            config.monitor.clone(),
            Arc::clone(&metrics),
        ));

        let repository: Arc<dyn TaskRepository> =
            Arc::new(JsonTaskRepository::new(&config.storage.task_file));
        let gateway = create_gateway(&config).await?;
        let proxy_manager = create_proxy_manager(&config, &metrics)?;

        let registry = AdapterRegistry::new();
        register_http_adapters(&registry, &config.platforms).await;
        info!("已注册 {} 个平台", config.platforms.len());

        let execution = ExecutionConfig {
            adapter_retries: config.scheduler.adapter_retries,
            adapter_retry_delay: Duration::from_millis(config.scheduler.adapter_retry_delay_ms),
            require_proxy: config.proxy.require_proxy,
        };
        let runner = Arc::new(TaskRunner::new(
            registry.clone(),
            gateway,
            proxy_manager.clone(),
            monitor.clone(),
            execution,
        ));

        let scheduler = Arc::new(
            TaskScheduler::new(
                SchedulerSettings::from(&config.scheduler),
                runner,
                repository,
                registry,
                monitor.clone(),
            )
            .with_metrics(metrics),
        );

        Ok(Self {
            config,
            scheduler,
            monitor,
            proxy_manager,
        })
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// 运行直到 `stop` 完成或调度循环遇到致命错误
    ///
    /// 关闭流程：广播关闭信号，调度器停止准入，等待执行中的任务，
    /// 放弃超时的任务并持久化注册表，最后关闭记录存储。
    pub async fn run<F>(&self, stop: F) -> Result<ShutdownSummary>
    where
        F: Future<Output = ()>,
    {
        let loaded = self.scheduler.load().await.context("加载任务注册表失败")?;
        info!("任务注册表已加载，共 {} 个任务", loaded);

        if let Some(proxy_manager) = &self.proxy_manager {
            match proxy_manager.refresh().await {
                Ok(valid) => info!("代理池预热完成，可用代理 {} 个", valid),
                Err(e) => warn!("代理池预热失败，将在首次分配时重试: {e}"),
            }
        }

        let shutdown_manager = ShutdownManager::new();

        let dispatch_handle = {
            let scheduler = Arc::clone(&self.scheduler);
            let shutdown_rx = shutdown_manager.subscribe();
            tokio::spawn(async move { scheduler.run_dispatch_loop(shutdown_rx).await })
        };

        let mut scheduler_handle = {
            let scheduler = Arc::clone(&self.scheduler);
            let shutdown_rx = shutdown_manager.subscribe();
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };

        let api_handle = if self.config.api.enabled {
            let state = AppState {
                scheduler: Arc::clone(&self.scheduler),
                monitor: Arc::clone(&self.monitor),
            };
            let api_config = self.config.api.clone();
            let stop_api = shutdown_manager.wait();
            Some(tokio::spawn(async move {
                if let Err(e) = crawler_api::serve(state, &api_config, stop_api).await {
                    error!("API服务运行失败: {e}");
                }
            }))
        } else {
            None
        };

        let mut fatal = None;
        let mut scheduler_exited = false;
        tokio::select! {
            _ = stop => {
                info!("收到关闭请求，开始优雅关闭...");
            }
            result = &mut scheduler_handle => {
                scheduler_exited = true;
                match result {
                    Ok(Ok(())) => warn!("调度循环意外退出"),
                    Ok(Err(e)) => {
                        error!("调度循环遇到致命错误: {e}");
                        fatal = Some(anyhow::Error::new(e).context("调度循环失败"));
                    }
                    Err(e) => {
                        error!("调度循环异常终止: {e}");
                        fatal = Some(anyhow::anyhow!("调度循环异常终止: {e}"));
                    }
                }
            }
        }

        shutdown_manager.shutdown();

        if !scheduler_exited {
            match scheduler_handle.await {
                Ok(Err(e)) if fatal.is_none() => {
                    fatal = Some(anyhow::Error::new(e).context("调度循环失败"));
                }
                Err(e) => warn!("等待调度循环退出失败: {e}"),
                _ => {}
            }
        }
        // 执行池满时分发循环可能正阻塞在提交上
        let mut dispatch_handle = dispatch_handle;
        if tokio::time::timeout(DISPATCH_EXIT_GRACE, &mut dispatch_handle)
            .await
            .is_err()
        {
            warn!("分发循环未能及时退出，强制停止");
            dispatch_handle.abort();
        }

        let summary = self.scheduler.shutdown().await;

        if let Some(handle) = api_handle {
            if tokio::time::timeout(API_SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("API服务关闭超时");
            }
        }

        match (fatal, summary) {
            (Some(e), Err(shutdown_err)) => {
                error!("致命错误后的关闭流程也失败: {shutdown_err}");
                Err(e)
            }
            (Some(e), Ok(_)) => Err(e),
            (None, summary) => summary.context("调度器关闭失败"),
        }
    }
}

async fn create_gateway(config: &AppConfig) -> Result<Arc<dyn PersistenceGateway>> {
    let gateway: Arc<dyn PersistenceGateway> = match config.storage.backend {
        StorageBackend::Json => Arc::new(
            JsonFileStore::open(&config.storage.data_dir)
                .await
                .with_context(|| format!("打开JSON存储目录失败: {}", config.storage.data_dir))?,
        ),
        StorageBackend::Sqlite => Arc::new(
            SqliteStore::connect(&config.storage.sqlite_url)
                .await
                .with_context(|| format!("连接SQLite失败: {}", config.storage.sqlite_url))?,
        ),
    };
    info!("记录存储后端: {:?}", config.storage.backend);
    Ok(gateway)
}

fn create_proxy_manager(
    config: &AppConfig,
    metrics: &Arc<MetricsCollector>,
) -> Result<Option<Arc<ProxyManager>>> {
    let Some(provider) = build_provider(&config.proxy).context("创建代理来源失败")? else {
        return Ok(None);
    };

    let validator = Arc::new(HttpProxyValidator::new(
        config.proxy.probe_url.clone(),
        Duration::from_secs(config.proxy.validation_timeout_seconds),
    ));
    let manager = ProxyManager::new(
        provider,
        validator,
        ProxyManagerConfig::from(&config.proxy),
    )
    .with_metrics(Arc::clone(metrics));

    info!("代理池已启用，来源: {:?}", config.proxy.provider);
    Ok(Some(Arc::new(manager)))
}
