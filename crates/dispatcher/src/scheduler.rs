use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crawler_core::{
    config::SchedulerConfig, AdapterRegistry, CrawlerError, CrawlerResult, MonitorEvent, Task,
    TaskFilter, TaskMonitor, TaskRepository, TaskSpec, TaskStatus, ABANDONED_AT_SHUTDOWN,
};
use crawler_infrastructure::{MetricsCollector, StructuredLogger, TaskQueue};
use crawler_worker::{
    CancellationFlag, ExecutionOutcome, ExecutionReport, TaskExecutionManager, TaskRunner,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::deduplicator::TaskDeduplicator;
use crate::throttler::RateThrottler;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub max_concurrent_tasks: usize,
    pub max_tasks_per_second: usize,
    pub dedup_capacity: usize,
    pub queue_capacity: usize,
    pub dequeue_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub retain_completed_tasks: bool,
    pub default_max_results: u32,
    pub max_results_limit: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_seconds),
            max_concurrent_tasks: config.max_concurrent_tasks,
            max_tasks_per_second: config.max_tasks_per_second,
            dedup_capacity: config.dedup_capacity,
            queue_capacity: config.queue_capacity,
            dequeue_timeout: Duration::from_millis(config.dequeue_timeout_ms),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_seconds),
            retain_completed_tasks: config.retain_completed_tasks,
            default_max_results: config.default_max_results,
            max_results_limit: config.max_results_limit,
        }
    }
}

/// 单次轮询的准入结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub due: usize,
    pub admitted: usize,
    pub duplicates: usize,
    /// 因准入速率或队列容量推迟到下一轮的任务数
    pub deferred: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownSummary {
    pub in_flight: usize,
    pub aborted: usize,
    pub abandoned: usize,
}

/// 已准入、等待执行池接收的任务
struct Dispatch {
    task: Task,
    cancel: CancellationFlag,
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<String, Task>,
    /// 已准入但尚未处理执行报告的任务
    cancel_flags: HashMap<String, CancellationFlag>,
}

/// 任务调度器
///
/// 任务注册表的唯一写入方。轮询循环按 `(scheduled_at, created_at)` 顺序对到期任务
/// 执行去重与限流检查，通过后投入有界队列；分发循环把队列中的任务交给执行池；
/// 执行结果以报告形式回到调度器完成状态记账与周期重排。
pub struct TaskScheduler {
    settings: SchedulerSettings,
    state: tokio::sync::Mutex<SchedulerState>,
    deduplicator: Mutex<TaskDeduplicator>,
    throttler: Mutex<RateThrottler>,
    queue: TaskQueue<Dispatch>,
    executor: TaskExecutionManager,
    runner: Arc<TaskRunner>,
    reports: tokio::sync::Mutex<mpsc::UnboundedReceiver<ExecutionReport>>,
    repository: Arc<dyn TaskRepository>,
    registry: AdapterRegistry,
    monitor: Arc<dyn TaskMonitor>,
    metrics: Option<Arc<MetricsCollector>>,
    accepting: AtomicBool,
}

impl TaskScheduler {
    pub fn new(
        settings: SchedulerSettings,
        runner: Arc<TaskRunner>,
        repository: Arc<dyn TaskRepository>,
        registry: AdapterRegistry,
        monitor: Arc<dyn TaskMonitor>,
    ) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let executor = TaskExecutionManager::new(
            Arc::clone(&runner),
            settings.max_concurrent_tasks,
            report_tx,
        );

        Self {
            deduplicator: Mutex::new(TaskDeduplicator::new(settings.dedup_capacity)),
            throttler: Mutex::new(RateThrottler::new(settings.max_tasks_per_second)),
            queue: TaskQueue::new(settings.queue_capacity),
            executor,
            runner,
            reports: tokio::sync::Mutex::new(report_rx),
            repository,
            registry,
            monitor,
            metrics: None,
            state: tokio::sync::Mutex::new(SchedulerState::default()),
            accepting: AtomicBool::new(true),
            settings,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// 从注册表恢复任务
    pub async fn load(&self) -> CrawlerResult<usize> {
        let tasks = self.repository.load_all().await.map_err(into_registry_error)?;
        let mut state = self.state.lock().await;

        let mut restored = 0;
        for mut task in tasks {
            if task.restore_after_restart() {
                restored += 1;
                debug!("任务 {} 恢复为 {}", task.id, task.status);
            }
            state.tasks.insert(task.id.clone(), task);
        }
        if restored > 0 {
            self.persist(&state).await?;
        }

        info!(
            "从注册表加载了 {} 个任务，其中 {} 个状态已修正",
            state.tasks.len(),
            restored
        );
        Ok(state.tasks.len())
    }

    /// 校验并登记新任务，返回任务 id
    pub async fn submit(&self, spec: TaskSpec) -> CrawlerResult<String> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(CrawlerError::Internal("调度器正在关闭，不再接受任务".to_string()));
        }
        spec.validate(self.settings.max_results_limit)?;
        if !self.registry.contains(&spec.platform).await {
            return Err(CrawlerError::validation(format!(
                "未注册的平台: {}",
                spec.platform
            )));
        }

        let task = Task::from_spec(spec, self.settings.default_max_results, Utc::now());
        let task_id = task.id.clone();

        let mut state = self.state.lock().await;
        state.tasks.insert(task_id.clone(), task.clone());
        if let Err(e) = self.persist(&state).await {
            state.tasks.remove(&task_id);
            return Err(e);
        }

        StructuredLogger::log_task_submitted(&task);
        Ok(task_id)
    }

    /// 取消任务
    ///
    /// 待执行的任务立即进入 cancelled；执行中的任务只设置取消标记，
    /// 状态在执行方退出并回报后才改变。
    pub async fn cancel(&self, task_id: &str) -> CrawlerResult<Task> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| CrawlerError::TaskNotFound {
                id: task_id.to_string(),
            })?;

        if task.status == TaskStatus::Running {
            if let Some(flag) = state.cancel_flags.get(task_id) {
                flag.cancel();
            }
            StructuredLogger::log_task_cancelled(task_id, true);
            return Ok(task.clone());
        }

        task.mark_cancelled()?;
        let snapshot = task.clone();
        self.persist(state).await?;
        StructuredLogger::log_task_cancelled(task_id, false);
        Ok(snapshot)
    }

    /// 从注册表删除未在执行中的任务
    pub async fn remove_task(&self, task_id: &str) -> CrawlerResult<Task> {
        let mut state = self.state.lock().await;
        match state.tasks.get(task_id) {
            None => {
                return Err(CrawlerError::TaskNotFound {
                    id: task_id.to_string(),
                })
            }
            Some(task) if task.status == TaskStatus::Running => {
                return Err(CrawlerError::InvalidTransition(format!(
                    "任务 {task_id} 正在执行，无法删除"
                )))
            }
            Some(_) => {}
        }

        let removed = state.tasks.remove(task_id).ok_or_else(|| CrawlerError::TaskNotFound {
            id: task_id.to_string(),
        })?;
        self.persist(&state).await?;
        info!("任务 {} 已从注册表删除", task_id);
        Ok(removed)
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.state.lock().await.tasks.get(task_id).cloned()
    }

    /// 按创建时间排序的任务列表
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub async fn task_count(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    pub async fn running_count(&self) -> usize {
        self.executor.running_count().await
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// 调整每秒准入上限
    pub fn set_rate(&self, max_per_second: usize) {
        self.throttler().set_rate(max_per_second);
        info!("每秒准入上限调整为 {}", max_per_second);
    }

    /// 扫描到期任务并执行准入
    ///
    /// 准入检查不做 I/O；通过的任务投入队列，不在此等待执行。
    pub async fn tick(&self) -> CrawlerResult<TickSummary> {
        let started = Instant::now();
        let now = Utc::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !self.accepting.load(Ordering::SeqCst) {
            return Ok(TickSummary::default());
        }

        let mut due: Vec<(DateTime<Utc>, DateTime<Utc>, String)> = state
            .tasks
            .values()
            .filter(|task| task.is_due(now))
            .map(|task| (task.scheduled_at, task.created_at, task.id.clone()))
            .collect();
        due.sort();

        let mut summary = TickSummary {
            due: due.len(),
            ..TickSummary::default()
        };

        for (position, (_, _, task_id)) in due.iter().enumerate() {
            let Some(task) = state.tasks.get_mut(task_id) else {
                continue;
            };

            if self.queue.remaining_capacity() == 0 {
                summary.deferred = due.len() - position;
                warn!("任务队列已满，{} 个到期任务推迟到下一轮", summary.deferred);
                break;
            }

            let hash = task.task_hash();
            if self.deduplicator().is_duplicate(&hash) {
                summary.duplicates += 1;
                self.monitor.record(MonitorEvent::Duplicate {
                    task_id: task_id.clone(),
                });
                StructuredLogger::log_task_deferred(task_id, "duplicate");
                continue;
            }

            if !self.throttler().try_admit() {
                self.deduplicator().remove(&hash);
                summary.deferred = due.len() - position;
                self.monitor.record(MonitorEvent::Throttled {
                    task_id: task_id.clone(),
                });
                StructuredLogger::log_task_deferred(task_id, "throttled");
                break;
            }

            let mut admitted = task.clone();
            admitted.mark_running()?;
            let cancel = CancellationFlag::new();
            if let Err(e) = self.queue.try_enqueue(Dispatch {
                task: admitted.clone(),
                cancel: cancel.clone(),
            }) {
                self.deduplicator().remove(&hash);
                summary.deferred = due.len() - position;
                warn!("任务 {} 入队失败: {}", task_id, e);
                break;
            }

            *task = admitted;
            state.cancel_flags.insert(task_id.clone(), cancel);
            self.monitor.record(MonitorEvent::Admission {
                task_id: task_id.clone(),
                platform: task.platform.clone(),
            });
            StructuredLogger::log_task_admitted(task);
            summary.admitted += 1;
        }

        if summary.admitted > 0 {
            self.persist(state).await?;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_tick_duration(started.elapsed().as_secs_f64());
            metrics.update_queue_depth(self.queue.len());
        }
        if summary.due > 0 {
            debug!(
                "本轮到期 {} 个，准入 {} 个，重复 {} 个，推迟 {} 个",
                summary.due, summary.admitted, summary.duplicates, summary.deferred
            );
        }
        Ok(summary)
    }

    /// 处理已到达的执行报告，返回处理的数量
    ///
    /// 轮询循环正在等待报告时直接返回，报告由轮询循环处理。
    pub async fn process_reports(&self) -> CrawlerResult<usize> {
        let mut reports = Vec::new();
        {
            let Ok(mut receiver) = self.reports.try_lock() else {
                return Ok(0);
            };
            while let Ok(report) = receiver.try_recv() {
                reports.push(report);
            }
        }
        self.apply_reports(reports).await
    }

    /// 等待所有已准入任务完成记账，超时返回 `false`
    pub async fn drain(&self, timeout: Duration) -> CrawlerResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_reports().await?;
            if self.state.lock().await.cancel_flags.is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// 轮询循环：定时准入到期任务并处理执行报告，直到收到关闭信号
    ///
    /// 只有注册表持久化失败会以错误返回。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> CrawlerResult<()> {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("调度器启动，轮询间隔 {:?}", self.settings.tick_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("调度器收到关闭信号，停止准入");
                    self.accepting.store(false, Ordering::SeqCst);
                    break;
                }
                _ = ticker.tick() => {
                    self.process_reports().await?;
                    if let Err(e) = self.tick().await {
                        if e.is_fatal() {
                            error!("调度轮询遇到致命错误: {}", e);
                            return Err(e);
                        }
                        error!("调度轮询失败: {}", e);
                    }
                }
                Some(report) = self.next_report() => {
                    self.apply_reports(vec![report]).await?;
                }
            }
        }

        Ok(())
    }

    /// 分发循环：从队列取出已准入的任务交给执行池
    pub async fn run_dispatch_loop(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "分发循环启动，最大并发 {}",
            self.executor.max_concurrent_tasks()
        );
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("分发循环收到关闭信号");
                    break;
                }
                dispatch = self.queue.dequeue(self.settings.dequeue_timeout) => {
                    let Some(Dispatch { task, cancel }) = dispatch else {
                        if self.queue.is_closed() {
                            break;
                        }
                        continue;
                    };
                    if let Some(metrics) = &self.metrics {
                        metrics.update_queue_depth(self.queue.len());
                    }
                    let task_id = task.id.clone();
                    if let Err(e) = self.executor.execute(task, cancel).await {
                        error!("任务 {} 提交到执行池失败: {}", task_id, e);
                    }
                }
            }
        }
    }

    /// 关闭调度器
    ///
    /// 停止准入，在超时内等待执行中的任务，之后强制中止剩余任务并把
    /// 仍处于 running 的任务记为失败，最后持久化注册表并关闭持久化网关。
    pub async fn shutdown(&self) -> CrawlerResult<ShutdownSummary> {
        self.accepting.store(false, Ordering::SeqCst);
        self.queue.close().await;

        let in_flight = self.executor.running_count().await;
        let aborted = if self.executor.wait_idle(self.settings.shutdown_timeout).await {
            Vec::new()
        } else {
            warn!(
                "等待 {:?} 后仍有任务在执行，强制中止",
                self.settings.shutdown_timeout
            );
            self.executor.abort_all().await
        };

        let mut never_started = 0;
        while self.queue.dequeue(Duration::from_millis(1)).await.is_some() {
            never_started += 1;
        }
        if never_started > 0 {
            info!("{} 个已准入任务未开始执行", never_started);
        }

        self.process_reports().await?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut abandoned = 0;
        for task in state.tasks.values_mut() {
            if task.status == TaskStatus::Running {
                task.mark_abandoned(ABANDONED_AT_SHUTDOWN);
                abandoned += 1;
            }
        }
        state.cancel_flags.clear();
        self.persist(state).await?;
        drop(guard);

        StructuredLogger::log_scheduler_shutdown(in_flight, abandoned);

        if let Err(e) = self.runner.gateway().close().await {
            warn!("关闭持久化网关失败: {}", e);
        }

        Ok(ShutdownSummary {
            in_flight,
            aborted: aborted.len(),
            abandoned,
        })
    }

    async fn next_report(&self) -> Option<ExecutionReport> {
        self.reports.lock().await.recv().await
    }

    async fn apply_reports(&self, reports: Vec<ExecutionReport>) -> CrawlerResult<usize> {
        if reports.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        for report in &reports {
            self.apply_report(state, report, now);
        }
        self.persist(state).await?;
        Ok(reports.len())
    }

    fn apply_report(&self, state: &mut SchedulerState, report: &ExecutionReport, now: DateTime<Utc>) {
        let cancel_requested = state
            .cancel_flags
            .remove(&report.task_id)
            .is_some_and(|flag| flag.is_cancelled());

        let Some(task) = state.tasks.get_mut(&report.task_id) else {
            warn!("收到未知任务 {} 的执行报告", report.task_id);
            return;
        };
        let hash = task.task_hash();
        let duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX);

        let applied = match &report.outcome {
            ExecutionOutcome::Succeeded { records } => task
                .record_success(now)
                .map(|_| StructuredLogger::log_task_completed(task, *records, duration_ms)),
            ExecutionOutcome::Failed { error } => task
                .record_failure(now, error.clone())
                .map(|_| StructuredLogger::log_task_failed(task, error, duration_ms)),
            ExecutionOutcome::Cancelled => task
                .mark_cancelled()
                .map(|_| StructuredLogger::log_task_cancelled(&report.task_id, true)),
        };
        if let Err(e) = applied {
            warn!("任务 {} 的执行报告无法应用: {}", report.task_id, e);
            return;
        }

        // 执行结束后才观察到的取消请求，不再安排下一次执行
        if cancel_requested && task.status == TaskStatus::Pending {
            if task.mark_cancelled().is_ok() {
                StructuredLogger::log_task_cancelled(&report.task_id, true);
            }
        }

        if task.is_recurring() || task.status != TaskStatus::Completed {
            self.deduplicator().remove(&hash);
        }

        if task.is_recurring() && task.status == TaskStatus::Pending {
            StructuredLogger::log_task_rescheduled(&task.id, task.scheduled_at);
        }

        if !self.settings.retain_completed_tasks
            && !task.is_recurring()
            && task.status == TaskStatus::Completed
        {
            state.tasks.remove(&report.task_id);
            debug!("一次性任务 {} 已完成，从注册表移除", report.task_id);
        }
    }

    async fn persist(&self, state: &SchedulerState) -> CrawlerResult<()> {
        let tasks: Vec<Task> = state.tasks.values().cloned().collect();
        self.repository
            .save_all(&tasks)
            .await
            .map_err(into_registry_error)
    }

    fn deduplicator(&self) -> MutexGuard<'_, TaskDeduplicator> {
        self.deduplicator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn throttler(&self) -> MutexGuard<'_, RateThrottler> {
        self.throttler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn into_registry_error(err: CrawlerError) -> CrawlerError {
    match err {
        CrawlerError::Registry(_) => err,
        other => CrawlerError::Registry(other.to_string()),
    }
}
