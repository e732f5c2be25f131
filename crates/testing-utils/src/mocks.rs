//! 各能力接口的内存实现

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crawler_core::{
    AdapterFactory, CanonicalRecord, CrawlerAdapter, CrawlerError, CrawlerResult, MonitorEvent,
    PersistenceGateway, ProxyRecord, RecordType, Task, TaskMonitor, TaskRepository,
};

/// 模拟平台的可编程行为，同一工厂创建的适配器共享
#[derive(Debug)]
pub struct MockPlatform {
    name: String,
    records_per_call: AtomicUsize,
    failure: Mutex<Option<String>>,
    delay: Mutex<Duration>,
    panic_on_call: AtomicBool,
    calls: AtomicUsize,
}

impl MockPlatform {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            records_per_call: AtomicUsize::new(3),
            failure: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            panic_on_call: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_records_per_call(&self, count: usize) {
        self.records_per_call.store(count, Ordering::SeqCst);
    }

    /// 之后的所有调用都以该错误失败，`None` 恢复正常
    pub fn set_failure(&self, error: Option<&str>) {
        *self.failure.lock().unwrap() = error.map(str::to_string);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// 之后的调用直接 panic，模拟适配器内部崩溃
    pub fn set_panic(&self, panic: bool) {
        self.panic_on_call.store(panic, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn factory(self: &Arc<Self>) -> Arc<MockAdapterFactory> {
        Arc::new(MockAdapterFactory {
            platform: Arc::clone(self),
        })
    }

    async fn call(&self) -> CrawlerResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_call.load(Ordering::SeqCst) {
            panic!("{} 适配器崩溃", self.name);
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failure.lock().unwrap().clone();
        match failure {
            Some(error) => Err(CrawlerError::adapter(error)),
            None => Ok(()),
        }
    }

    fn records(&self, prefix: &str, max: u32, record_type: RecordType) -> Vec<CanonicalRecord> {
        let count = self.records_per_call.load(Ordering::SeqCst).min(max as usize);
        (0..count)
            .map(|i| {
                CanonicalRecord::new(format!("{prefix}-{i}"), self.name.clone(), record_type)
                    .with_attribute("index", i)
            })
            .collect()
    }
}

pub struct MockAdapter {
    platform: Arc<MockPlatform>,
}

#[async_trait]
impl CrawlerAdapter for MockAdapter {
    async fn start(&self) -> CrawlerResult<()> {
        self.platform.call().await
    }

    async fn search(&self, query: &str, max_results: u32) -> CrawlerResult<Vec<CanonicalRecord>> {
        self.platform.call().await?;
        Ok(self.platform.records(query, max_results, RecordType::Content))
    }

    async fn get_content_detail(&self, content_id: &str) -> CrawlerResult<CanonicalRecord> {
        self.platform.call().await?;
        Ok(CanonicalRecord::new(
            content_id,
            self.platform.name.clone(),
            RecordType::Content,
        ))
    }

    async fn get_comments(
        &self,
        content_id: &str,
        max_results: u32,
    ) -> CrawlerResult<Vec<CanonicalRecord>> {
        self.platform.call().await?;
        Ok(self.platform.records(
            &format!("{content_id}-comment"),
            max_results,
            RecordType::Comment,
        ))
    }

    async fn get_user_profile(&self, creator_id: &str) -> CrawlerResult<CanonicalRecord> {
        self.platform.call().await?;
        Ok(CanonicalRecord::new(
            creator_id,
            self.platform.name.clone(),
            RecordType::Creator,
        ))
    }

    async fn get_user_content(
        &self,
        creator_id: &str,
        max_results: u32,
    ) -> CrawlerResult<Vec<CanonicalRecord>> {
        self.platform.call().await?;
        Ok(self.platform.records(
            &format!("{creator_id}-post"),
            max_results,
            RecordType::Content,
        ))
    }

    fn get_platform_name(&self) -> &str {
        &self.platform.name
    }

    fn get_supported_features(&self) -> Vec<String> {
        vec![
            "search".to_string(),
            "detail".to_string(),
            "creator".to_string(),
        ]
    }
}

pub struct MockAdapterFactory {
    platform: Arc<MockPlatform>,
}

impl AdapterFactory for MockAdapterFactory {
    fn create(&self, _proxy: Option<&ProxyRecord>) -> CrawlerResult<Box<dyn CrawlerAdapter>> {
        Ok(Box::new(MockAdapter {
            platform: Arc::clone(&self.platform),
        }))
    }

    fn platform(&self) -> &str {
        &self.platform.name
    }
}

/// 以 `platform:id` 为键的内存记录存储
#[derive(Debug, Default)]
pub struct MockPersistenceGateway {
    records: Mutex<HashMap<String, CanonicalRecord>>,
    writes: AtomicUsize,
    closed: AtomicBool,
    fail: AtomicBool,
}

impl MockPersistenceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<CanonicalRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn upsert(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CrawlerError::persistence("mock store unavailable"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(record.storage_key(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MockPersistenceGateway {
    async fn store_content(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.upsert(record)
    }

    async fn store_comment(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.upsert(record)
    }

    async fn store_creator(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.upsert(record)
    }

    async fn close(&self) -> CrawlerResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// 内存任务注册表，记录保存次数
#[derive(Debug, Default)]
pub struct MockTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
    saves: AtomicUsize,
    fail: AtomicBool,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let repo = Self::default();
        {
            let mut stored = repo.tasks.lock().unwrap();
            for task in tasks {
                stored.insert(task.id.clone(), task);
            }
        }
        repo
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn load_all(&self) -> CrawlerResult<Vec<Task>> {
        Ok(self.tasks.lock().unwrap().values().cloned().collect())
    }

    async fn save_all(&self, tasks: &[Task]) -> CrawlerResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CrawlerError::Registry(
                "mock registry unavailable".to_string(),
            ));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.tasks.lock().unwrap();
        stored.clear();
        for task in tasks {
            stored.insert(task.id.clone(), task.clone());
        }
        Ok(())
    }
}

/// 记录收到的全部监控事件
#[derive(Debug, Default)]
pub struct MockTaskMonitor {
    events: Mutex<Vec<MonitorEvent>>,
}

impl MockTaskMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

impl TaskMonitor for MockTaskMonitor {
    fn record(&self, event: MonitorEvent) {
        self.events.lock().unwrap().push(event);
    }
}
