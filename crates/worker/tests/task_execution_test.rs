use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use crawler_core::{
    AdapterFactory, AdapterRegistry, CanonicalRecord, CrawlerAdapter, CrawlerError,
    CrawlerResult, MonitorEvent, PersistenceGateway, ProxyProvider, ProxyRecord, ProxyValidator,
    RecordType, Task, TaskMonitor, TaskSpec,
};
use crawler_infrastructure::{ProxyManager, ProxyManagerConfig};
use crawler_worker::{
    CancellationFlag, ExecutionConfig, ExecutionOutcome, TaskExecutionManager, TaskRunner,
};
use tokio::sync::mpsc;

/// 平台行为与调用记录，由工厂创建的所有适配器共享
#[derive(Default)]
struct PlatformState {
    calls: Mutex<Vec<String>>,
    proxies: Mutex<Vec<Option<String>>>,
    fail_first: AtomicU32,
    fail_always: Mutex<Option<String>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// 在指定调用发生后触发的取消标记
    cancel_after: Mutex<Option<(String, CancellationFlag)>>,
}

impl PlatformState {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, call: &str) -> CrawlerResult<()> {
        self.calls.lock().unwrap().push(call.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((after, flag)) = self.cancel_after.lock().unwrap().as_ref() {
            if after == call {
                flag.cancel();
            }
        }
        if let Some(failing) = self.fail_always.lock().unwrap().as_ref() {
            if failing == call {
                return Err(CrawlerError::adapter(format!("{call} failed")));
            }
        }
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.fetch_sub(1, Ordering::SeqCst);
            return Err(CrawlerError::Network("connection reset".to_string()));
        }
        Ok(())
    }
}

struct MockAdapter {
    state: Arc<PlatformState>,
}

fn records(prefix: &str, count: u32, record_type: RecordType) -> Vec<CanonicalRecord> {
    (0..count)
        .map(|i| CanonicalRecord::new(format!("{prefix}{i}"), "mock", record_type))
        .collect()
}

#[async_trait]
impl CrawlerAdapter for MockAdapter {
    async fn start(&self) -> CrawlerResult<()> {
        self.state.enter("start").await
    }

    async fn search(&self, _query: &str, max_results: u32) -> CrawlerResult<Vec<CanonicalRecord>> {
        self.state.enter("search").await?;
        Ok(records("s", max_results.min(3), RecordType::Content))
    }

    async fn get_content_detail(&self, content_id: &str) -> CrawlerResult<CanonicalRecord> {
        self.state.enter("get_content_detail").await?;
        Ok(CanonicalRecord::new(content_id, "mock", RecordType::Content))
    }

    async fn get_comments(
        &self,
        _content_id: &str,
        max_results: u32,
    ) -> CrawlerResult<Vec<CanonicalRecord>> {
        self.state.enter("get_comments").await?;
        Ok(records("c", max_results.min(2), RecordType::Comment))
    }

    async fn get_user_profile(&self, creator_id: &str) -> CrawlerResult<CanonicalRecord> {
        self.state.enter("get_user_profile").await?;
        Ok(CanonicalRecord::new(creator_id, "mock", RecordType::Creator))
    }

    async fn get_user_content(
        &self,
        _creator_id: &str,
        max_results: u32,
    ) -> CrawlerResult<Vec<CanonicalRecord>> {
        self.state.enter("get_user_content").await?;
        Ok(records("u", max_results.min(4), RecordType::Content))
    }

    fn get_platform_name(&self) -> &str {
        "mock"
    }

    fn get_supported_features(&self) -> Vec<String> {
        vec!["search".to_string()]
    }
}

struct MockFactory {
    state: Arc<PlatformState>,
}

impl AdapterFactory for MockFactory {
    fn create(&self, proxy: Option<&ProxyRecord>) -> CrawlerResult<Box<dyn CrawlerAdapter>> {
        self.state
            .proxies
            .lock()
            .unwrap()
            .push(proxy.map(|p| p.address.clone()));
        Ok(Box::new(MockAdapter {
            state: Arc::clone(&self.state),
        }))
    }

    fn platform(&self) -> &str {
        "mock"
    }
}

#[derive(Default)]
struct MockGateway {
    stored: Mutex<Vec<CanonicalRecord>>,
}

impl MockGateway {
    fn stored(&self) -> Vec<CanonicalRecord> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceGateway for MockGateway {
    async fn store_content(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.stored.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn store_comment(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.stored.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn store_creator(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.stored.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn close(&self) -> CrawlerResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingMonitor {
    events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingMonitor {
    fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

impl TaskMonitor for RecordingMonitor {
    fn record(&self, event: MonitorEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct StaticProvider(Vec<ProxyRecord>);

#[async_trait]
impl ProxyProvider for StaticProvider {
    async fn fetch(&self, limit: usize) -> CrawlerResult<Vec<ProxyRecord>> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

struct AcceptAll(bool);

#[async_trait]
impl ProxyValidator for AcceptAll {
    async fn probe(&self, _proxy: &ProxyRecord) -> bool {
        self.0
    }
}

struct Harness {
    state: Arc<PlatformState>,
    gateway: Arc<MockGateway>,
    monitor: Arc<RecordingMonitor>,
    runner: Arc<TaskRunner>,
}

async fn harness(config: ExecutionConfig, proxy_manager: Option<Arc<ProxyManager>>) -> Harness {
    let state = Arc::new(PlatformState::default());
    let registry = AdapterRegistry::new();
    registry
        .register(
            "mock",
            Arc::new(MockFactory {
                state: Arc::clone(&state),
            }),
        )
        .await;
    let gateway = Arc::new(MockGateway::default());
    let monitor = Arc::new(RecordingMonitor::default());
    let runner = Arc::new(TaskRunner::new(
        registry,
        gateway.clone(),
        proxy_manager,
        monitor.clone(),
        config,
    ));
    Harness {
        state,
        gateway,
        monitor,
        runner,
    }
}

fn task(spec: TaskSpec) -> Task {
    let mut task = Task::from_spec(spec, 100, Utc::now());
    task.mark_running().unwrap();
    task
}

#[tokio::test]
async fn test_search_pipeline_stores_results() {
    let h = harness(ExecutionConfig::default(), None).await;
    let task = task(TaskSpec::search("mock", "rust").with_max_results(2));

    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    assert_eq!(outcome, ExecutionOutcome::Succeeded { records: 2 });
    assert_eq!(h.state.calls(), vec!["start", "search"]);
    assert_eq!(h.gateway.stored().len(), 2);
    assert_eq!(h.monitor.names(), vec!["success"]);
    assert_eq!(h.state.proxies.lock().unwrap().clone(), vec![None]);
}

#[tokio::test]
async fn test_detail_pipeline_fetches_comments() {
    let h = harness(ExecutionConfig::default(), None).await;
    let task = task(TaskSpec::detail("mock", "note-1"));

    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    assert_eq!(outcome, ExecutionOutcome::Succeeded { records: 3 });
    assert_eq!(
        h.state.calls(),
        vec!["start", "get_content_detail", "get_comments"]
    );
    let stored = h.gateway.stored();
    assert_eq!(stored[0].id, "note-1");
    assert_eq!(stored[1].record_type, RecordType::Comment);
}

#[tokio::test]
async fn test_creator_pipeline_fetches_profile_and_content() {
    let h = harness(ExecutionConfig::default(), None).await;
    let task = task(TaskSpec::creator("mock", "user-1"));

    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    assert_eq!(outcome, ExecutionOutcome::Succeeded { records: 5 });
    assert_eq!(
        h.state.calls(),
        vec!["start", "get_user_profile", "get_user_content"]
    );
    assert_eq!(h.gateway.stored()[0].record_type, RecordType::Creator);
}

#[tokio::test]
async fn test_adapter_error_fails_execution() {
    let h = harness(ExecutionConfig::default(), None).await;
    *h.state.fail_always.lock().unwrap() = Some("get_comments".to_string());
    let task = task(TaskSpec::detail("mock", "note-1"));

    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    match outcome {
        ExecutionOutcome::Failed { error } => assert!(error.contains("get_comments failed")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    // 失败前已写入的记录保留
    assert_eq!(h.gateway.stored().len(), 1);
    assert_eq!(h.monitor.names(), vec!["failure"]);
}

#[tokio::test]
async fn test_retry_recovers_transient_errors() {
    let config = ExecutionConfig {
        adapter_retries: 2,
        adapter_retry_delay: Duration::from_millis(1),
        require_proxy: false,
    };
    let h = harness(config, None).await;
    h.state.fail_first.store(2, Ordering::SeqCst);
    let task = task(TaskSpec::search("mock", "rust"));

    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    assert_eq!(outcome, ExecutionOutcome::Succeeded { records: 3 });
    assert_eq!(h.state.calls(), vec!["start", "start", "start", "search"]);
}

#[tokio::test]
async fn test_without_retries_first_error_is_final() {
    let h = harness(ExecutionConfig::default(), None).await;
    h.state.fail_first.store(1, Ordering::SeqCst);
    let task = task(TaskSpec::search("mock", "rust"));

    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    assert!(matches!(outcome, ExecutionOutcome::Failed { .. }));
    assert_eq!(h.state.calls(), vec!["start"]);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let h = harness(ExecutionConfig::default(), None).await;
    let task = task(TaskSpec::search("mock", "rust"));
    let flag = CancellationFlag::new();
    flag.cancel();

    let outcome = h.runner.run(&task, &flag).await;

    assert_eq!(outcome, ExecutionOutcome::Cancelled);
    assert!(h.state.calls().is_empty());
    assert!(h.monitor.names().is_empty());
}

#[tokio::test]
async fn test_cancellation_observed_between_steps() {
    let h = harness(ExecutionConfig::default(), None).await;
    let flag = CancellationFlag::new();
    *h.state.cancel_after.lock().unwrap() = Some(("get_content_detail".to_string(), flag.clone()));
    let task = task(TaskSpec::detail("mock", "note-1"));

    let outcome = h.runner.run(&task, &flag).await;

    assert_eq!(outcome, ExecutionOutcome::Cancelled);
    assert_eq!(h.state.calls(), vec!["start", "get_content_detail"]);
    assert!(h.gateway.stored().is_empty());
}

#[tokio::test]
async fn test_unknown_platform_fails() {
    let h = harness(ExecutionConfig::default(), None).await;
    let task = task(TaskSpec::search("weibo", "rust"));

    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    match outcome {
        ExecutionOutcome::Failed { error } => assert!(error.contains("weibo")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

fn proxy_manager(addresses: &[&str], valid: bool) -> Arc<ProxyManager> {
    let proxies = addresses
        .iter()
        .map(|a| ProxyRecord::parse(a).unwrap())
        .collect();
    Arc::new(ProxyManager::new(
        Arc::new(StaticProvider(proxies)),
        Arc::new(AcceptAll(valid)),
        ProxyManagerConfig::default(),
    ))
}

#[tokio::test]
async fn test_each_execution_rotates_proxy() {
    let manager = proxy_manager(&["10.0.0.1:80", "10.0.0.2:80"], true);
    let h = harness(ExecutionConfig::default(), Some(manager)).await;

    for _ in 0..3 {
        let task = task(TaskSpec::search("mock", "rust"));
        let outcome = h.runner.run(&task, &CancellationFlag::new()).await;
        assert!(matches!(outcome, ExecutionOutcome::Succeeded { .. }));
    }

    assert_eq!(
        h.state.proxies.lock().unwrap().clone(),
        vec![
            Some("10.0.0.1:80".to_string()),
            Some("10.0.0.2:80".to_string()),
            Some("10.0.0.1:80".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_executions_use_different_proxies() {
    let manager = proxy_manager(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"], true);
    let h = harness(ExecutionConfig::default(), Some(manager)).await;
    *h.state.delay.lock().unwrap() = Duration::from_millis(30);

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let runner = h.runner.clone();
            tokio::spawn(async move {
                let task = task(TaskSpec::search("mock", format!("q{i}")));
                runner.run(&task, &CancellationFlag::new()).await
            })
        })
        .collect();
    for handle in handles {
        assert!(matches!(
            handle.await.unwrap(),
            ExecutionOutcome::Succeeded { .. }
        ));
    }

    let used: HashSet<_> = h.state.proxies.lock().unwrap().iter().cloned().collect();
    assert_eq!(used.len(), 3);
    assert!(used.iter().all(Option::is_some));
}

#[tokio::test]
async fn test_failed_execution_reports_proxy() {
    let manager = proxy_manager(&["10.0.0.1:80", "10.0.0.2:80"], true);
    let h = harness(ExecutionConfig::default(), Some(manager.clone())).await;
    *h.state.fail_always.lock().unwrap() = Some("search".to_string());

    let task = task(TaskSpec::search("mock", "rust"));
    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    assert!(matches!(outcome, ExecutionOutcome::Failed { .. }));
    assert_eq!(manager.stats().await.valid_count, 1);
}

#[tokio::test]
async fn test_no_proxy_falls_back_to_direct() {
    let manager = proxy_manager(&["10.0.0.1:80"], false);
    let h = harness(ExecutionConfig::default(), Some(manager)).await;

    let task = task(TaskSpec::search("mock", "rust"));
    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    assert!(matches!(outcome, ExecutionOutcome::Succeeded { .. }));
    assert_eq!(h.state.proxies.lock().unwrap().clone(), vec![None]);
    assert_eq!(h.monitor.names(), vec!["proxy_exhausted", "success"]);
}

#[tokio::test]
async fn test_require_proxy_fails_without_proxy() {
    let manager = proxy_manager(&["10.0.0.1:80"], false);
    let config = ExecutionConfig {
        require_proxy: true,
        ..ExecutionConfig::default()
    };
    let h = harness(config, Some(manager)).await;

    let task = task(TaskSpec::search("mock", "rust"));
    let outcome = h.runner.run(&task, &CancellationFlag::new()).await;

    assert!(matches!(outcome, ExecutionOutcome::Failed { .. }));
    assert!(h.state.calls().is_empty());
    assert_eq!(h.monitor.names(), vec!["proxy_exhausted", "failure"]);
}

#[tokio::test]
async fn test_execution_manager_bounds_concurrency() {
    let h = harness(ExecutionConfig::default(), None).await;
    *h.state.delay.lock().unwrap() = Duration::from_millis(30);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let manager = Arc::new(TaskExecutionManager::new(h.runner.clone(), 2, tx));

    let submitter = {
        let manager = manager.clone();
        tokio::spawn(async move {
            for i in 0..5 {
                let task = task(TaskSpec::search("mock", format!("q{i}")));
                manager.execute(task, CancellationFlag::new()).await.unwrap();
            }
        })
    };

    let mut reports = Vec::new();
    while reports.len() < 5 {
        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("report in time")
            .expect("channel open");
        reports.push(report);
    }
    submitter.await.unwrap();

    assert!(reports
        .iter()
        .all(|r| matches!(r.outcome, ExecutionOutcome::Succeeded { records: 3 })));
    assert!(h.state.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert!(manager.wait_idle(Duration::from_secs(1)).await);
    assert_eq!(manager.running_count().await, 0);
}

#[tokio::test]
async fn test_abort_all_stops_running_tasks() {
    let h = harness(ExecutionConfig::default(), None).await;
    *h.state.delay.lock().unwrap() = Duration::from_secs(10);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let manager = TaskExecutionManager::new(h.runner.clone(), 4, tx);

    let task = task(TaskSpec::search("mock", "slow"));
    let task_id = task.id.clone();
    manager.execute(task, CancellationFlag::new()).await.unwrap();
    assert!(manager.is_running(&task_id).await);

    assert!(!manager.wait_idle(Duration::from_millis(20)).await);
    let aborted = manager.abort_all().await;

    assert_eq!(aborted, vec![task_id]);
    assert_eq!(manager.running_count().await, 0);
    assert!(rx.try_recv().is_err());
}
