use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::errors::{CrawlerError, CrawlerResult};

/// 默认的单次抓取结果上限
pub const DEFAULT_MAX_RESULTS: u32 = 100;

/// 周期任务允许的最大间隔（一年）
pub const MAX_INTERVAL_SECONDS: u64 = 365 * 24 * 3600;

/// 任务类型
///
/// - `Search`: 按关键词搜索内容，需要 `query`
/// - `Detail`: 抓取指定内容及其评论，需要 `target_id`
/// - `Creator`: 抓取指定创作者资料及其发布内容，需要 `target_id`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Search,
    Detail,
    Creator,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Search => "search",
            TaskKind::Detail => "detail",
            TaskKind::Creator => "creator",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(TaskKind::Search),
            "detail" => Ok(TaskKind::Detail),
            "creator" => Ok(TaskKind::Creator),
            _ => Err(CrawlerError::validation(format!("未知的任务类型: {s}"))),
        }
    }
}

/// 任务状态
///
/// ```text
/// Pending → Running → Completed
///    │         └────→ Failed
///    └──→ Cancelled
/// ```
///
/// 周期任务在每次执行结束后回到 `Pending`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(CrawlerError::validation(format!("未知的任务状态: {s}"))),
        }
    }
}

/// 任务提交参数
///
/// 调用方通过 `TaskSpec` 描述一次抓取请求，调度器校验通过后生成 [`Task`]。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub kind: TaskKind,
    pub platform: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub max_results: Option<u32>,
    /// 执行间隔（秒），存在即为周期任务
    #[serde(default)]
    pub interval_seconds: Option<u64>,
    /// 周期任务首次执行是否延后一个间隔
    #[serde(default)]
    pub delay_start: bool,
}

impl TaskSpec {
    pub fn search(platform: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(TaskKind::Search, platform).with_query(query)
    }

    pub fn detail(platform: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self::new(TaskKind::Detail, platform).with_target_id(content_id)
    }

    pub fn creator(platform: impl Into<String>, creator_id: impl Into<String>) -> Self {
        Self::new(TaskKind::Creator, platform).with_target_id(creator_id)
    }

    pub fn new(kind: TaskKind, platform: impl Into<String>) -> Self {
        Self {
            name: None,
            kind,
            platform: platform.into(),
            query: None,
            target_id: None,
            max_results: None,
            interval_seconds: None,
            delay_start: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_target_id(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.interval_seconds = Some(seconds);
        self
    }

    pub fn with_delay_start(mut self) -> Self {
        self.delay_start = true;
        self
    }

    /// 校验任务参数，`max_results_limit` 为允许的结果数上限
    pub fn validate(&self, max_results_limit: u32) -> CrawlerResult<()> {
        if self.platform.trim().is_empty() {
            return Err(CrawlerError::validation("platform 不能为空"));
        }

        match self.kind {
            TaskKind::Search => {
                if is_blank(&self.query) {
                    return Err(CrawlerError::validation("search 任务必须提供 query"));
                }
            }
            TaskKind::Detail | TaskKind::Creator => {
                if is_blank(&self.target_id) {
                    return Err(CrawlerError::validation(format!(
                        "{} 任务必须提供 target_id",
                        self.kind
                    )));
                }
            }
        }

        if let Some(max_results) = self.max_results {
            if max_results == 0 {
                return Err(CrawlerError::validation("max_results 必须为正整数"));
            }
            if max_results > max_results_limit {
                return Err(CrawlerError::validation(format!(
                    "max_results 不能超过 {max_results_limit}"
                )));
            }
        }

        match self.interval_seconds {
            Some(0) => return Err(CrawlerError::validation("interval_seconds 必须大于0")),
            Some(secs) if secs > MAX_INTERVAL_SECONDS => {
                return Err(CrawlerError::validation(format!(
                    "interval_seconds 不能超过 {MAX_INTERVAL_SECONDS}"
                )))
            }
            _ => {}
        }

        if self.delay_start && self.interval_seconds.is_none() {
            return Err(CrawlerError::validation(
                "delay_start 仅适用于设置了 interval_seconds 的周期任务",
            ));
        }

        Ok(())
    }

    pub fn task_hash(&self) -> TaskHash {
        TaskHash::derive(
            &self.platform,
            self.kind,
            self.query.as_deref(),
            self.target_id.as_deref(),
        )
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).map_or(true, str::is_empty)
}

/// 任务去重标识
///
/// 由 `(platform, kind, query, target_id)` 派生的 SHA-256 摘要，
/// 与任务 `id` 无关。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHash(String);

#[derive(Serialize)]
struct HashIdentity<'a> {
    platform: &'a str,
    kind: TaskKind,
    query: Option<&'a str>,
    target_id: Option<&'a str>,
}

impl TaskHash {
    pub fn derive(
        platform: &str,
        kind: TaskKind,
        query: Option<&str>,
        target_id: Option<&str>,
    ) -> Self {
        let identity = HashIdentity {
            platform,
            kind,
            query,
            target_id,
        };
        // 固定字段顺序的结构体序列化不会失败
        let encoded = serde_json::to_vec(&identity).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 爬取任务
///
/// 任务只能由调度器修改。周期任务（`interval_seconds` 存在）每次执行后
/// 回到 `Pending` 并推进 `scheduled_at`；一次性任务执行一次后进入终态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: TaskKind,
    pub platform: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    pub max_results: u32,
    #[serde(default)]
    pub interval_seconds: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// 任务过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub platform: Option<String>,
    pub kind: Option<TaskKind>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.platform.as_ref().map_or(true, |p| &task.platform == p)
            && self.kind.map_or(true, |k| task.kind == k)
    }
}

impl Task {
    /// 从已校验的提交参数创建任务
    pub fn from_spec(spec: TaskSpec, default_max_results: u32, now: DateTime<Utc>) -> Self {
        let scheduled_at = match (spec.delay_start, spec.interval_seconds) {
            (true, Some(secs)) => now + seconds(secs),
            _ => now,
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: spec.name,
            kind: spec.kind,
            platform: spec.platform,
            query: spec.query,
            target_id: spec.target_id,
            max_results: spec.max_results.unwrap_or(default_max_results),
            interval_seconds: spec.interval_seconds,
            created_at: now,
            scheduled_at,
            last_executed_at: None,
            status: TaskStatus::Pending,
            execution_count: 0,
            last_error: None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.interval_seconds.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_seconds.map(seconds)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.scheduled_at <= now
    }

    /// 周期任务只有取消才是终态
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Cancelled => true,
            TaskStatus::Completed | TaskStatus::Failed => !self.is_recurring(),
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }

    pub fn task_hash(&self) -> TaskHash {
        TaskHash::derive(
            &self.platform,
            self.kind,
            self.query.as_deref(),
            self.target_id.as_deref(),
        )
    }

    /// 准入通过：Pending → Running
    pub fn mark_running(&mut self) -> CrawlerResult<()> {
        if self.status != TaskStatus::Pending {
            return Err(CrawlerError::InvalidTransition(format!(
                "任务 {} 当前状态为 {}，无法进入 running",
                self.id, self.status
            )));
        }
        self.status = TaskStatus::Running;
        Ok(())
    }

    /// 执行成功后的记账
    pub fn record_success(&mut self, now: DateTime<Utc>) -> CrawlerResult<()> {
        self.ensure_running()?;
        self.status = TaskStatus::Completed;
        self.last_executed_at = Some(now);
        self.execution_count += 1;
        self.last_error = None;
        self.reschedule_after(now);
        Ok(())
    }

    /// 执行失败后的记账，周期任务不会因单次失败而终止
    pub fn record_failure(&mut self, now: DateTime<Utc>, error: impl Into<String>) -> CrawlerResult<()> {
        self.ensure_running()?;
        self.status = TaskStatus::Failed;
        self.last_executed_at = Some(now);
        self.execution_count += 1;
        self.last_error = Some(error.into());
        self.reschedule_after(now);
        Ok(())
    }

    /// 取消任务，仅允许从 Pending 或（执行方确认退出后的）Running 进入
    pub fn mark_cancelled(&mut self) -> CrawlerResult<()> {
        match self.status {
            TaskStatus::Pending | TaskStatus::Running => {
                self.status = TaskStatus::Cancelled;
                Ok(())
            }
            other => Err(CrawlerError::InvalidTransition(format!(
                "任务 {} 当前状态为 {other}，无法取消",
                self.id
            ))),
        }
    }

    /// 关闭时放弃仍在执行的任务
    pub fn mark_abandoned(&mut self, reason: impl Into<String>) {
        if self.status == TaskStatus::Running {
            self.status = TaskStatus::Failed;
            self.last_error = Some(reason.into());
        }
    }

    /// 启动时恢复从注册表读出的任务，返回状态是否被修正
    ///
    /// 执行中被打断的一次性任务记为失败；周期任务回到 Pending，
    /// 保留原有的 `scheduled_at`。
    pub fn restore_after_restart(&mut self) -> bool {
        match (self.status, self.is_recurring()) {
            (TaskStatus::Running, false) => {
                self.status = TaskStatus::Failed;
                self.last_error = Some(INTERRUPTED_BY_RESTART.to_string());
                true
            }
            (TaskStatus::Running | TaskStatus::Failed | TaskStatus::Completed, true) => {
                self.status = TaskStatus::Pending;
                true
            }
            _ => false,
        }
    }

    fn ensure_running(&self) -> CrawlerResult<()> {
        if self.status != TaskStatus::Running {
            return Err(CrawlerError::InvalidTransition(format!(
                "任务 {} 当前状态为 {}，不处于执行中",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn reschedule_after(&mut self, executed_at: DateTime<Utc>) {
        if let Some(interval) = self.interval() {
            let next = executed_at + interval;
            // scheduled_at 只能单调前移
            self.scheduled_at = next.max(self.scheduled_at + interval);
            self.status = TaskStatus::Pending;
        }
    }
}

pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";
pub const ABANDONED_AT_SHUTDOWN: &str = "abandoned at shutdown";

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_requires_query() {
        let spec = TaskSpec::new(TaskKind::Search, "xhs");
        assert!(matches!(spec.validate(1000), Err(CrawlerError::Validation(_))));

        let spec = TaskSpec::search("xhs", "   ");
        assert!(spec.validate(1000).is_err());

        assert!(TaskSpec::search("xhs", "food").validate(1000).is_ok());
    }

    #[test]
    fn test_detail_and_creator_require_target() {
        assert!(TaskSpec::new(TaskKind::Detail, "dy").validate(1000).is_err());
        assert!(TaskSpec::new(TaskKind::Creator, "dy").validate(1000).is_err());
        assert!(TaskSpec::detail("dy", "note-1").validate(1000).is_ok());
        assert!(TaskSpec::creator("dy", "user-1").validate(1000).is_ok());
    }

    #[test]
    fn test_max_results_and_interval_bounds() {
        let spec = TaskSpec::search("xhs", "food").with_max_results(0);
        assert!(spec.validate(1000).is_err());

        let spec = TaskSpec::search("xhs", "food").with_max_results(1001);
        assert!(spec.validate(1000).is_err());

        let spec = TaskSpec::search("xhs", "food").with_interval(0);
        assert!(spec.validate(1000).is_err());

        let spec = TaskSpec::search("xhs", "food").with_delay_start();
        assert!(spec.validate(1000).is_err());
    }

    #[test]
    fn test_task_hash_ignores_non_identity_fields() {
        let a = TaskSpec::search("xhs", "food").with_max_results(10).with_name("a");
        let b = TaskSpec::search("xhs", "food").with_interval(60);
        assert_eq!(a.task_hash(), b.task_hash());

        let c = TaskSpec::search("xhs", "drink");
        assert_ne!(a.task_hash(), c.task_hash());

        let d = TaskSpec::search("dy", "food");
        assert_ne!(a.task_hash(), d.task_hash());

        let now = Utc::now();
        let task = Task::from_spec(a.clone(), 100, now);
        assert_eq!(task.task_hash(), a.task_hash());
    }

    #[test]
    fn test_initial_schedule() {
        let now = Utc::now();
        let task = Task::from_spec(TaskSpec::search("xhs", "food"), 100, now);
        assert_eq!(task.scheduled_at, now);
        assert_eq!(task.max_results, 100);
        assert_eq!(task.status, TaskStatus::Pending);

        let delayed = Task::from_spec(
            TaskSpec::search("xhs", "food").with_interval(60).with_delay_start(),
            100,
            now,
        );
        assert_eq!(delayed.scheduled_at, now + Duration::seconds(60));
    }

    #[test]
    fn test_one_shot_lifecycle() {
        let now = Utc::now();
        let mut task = Task::from_spec(TaskSpec::search("xhs", "food"), 100, now);
        task.mark_running().unwrap();
        task.record_success(now).unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.execution_count, 1);
        assert!(task.last_error.is_none());
        assert!(task.is_terminal());
        assert!(task.mark_running().is_err());
    }

    #[test]
    fn test_recurring_failure_returns_to_pending() {
        let now = Utc::now();
        let mut task = Task::from_spec(TaskSpec::search("xhs", "food").with_interval(10), 100, now);
        task.mark_running().unwrap();
        task.record_failure(now, "boom").unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.execution_count, 1);
        assert_eq!(task.last_error.as_deref(), Some("boom"));
        let last = task.last_executed_at.unwrap();
        assert!(task.scheduled_at - last >= Duration::seconds(10));
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_transitions_cannot_skip_running() {
        let now = Utc::now();
        let mut task = Task::from_spec(TaskSpec::search("xhs", "food"), 100, now);
        assert!(task.record_success(now).is_err());
        assert!(task.record_failure(now, "x").is_err());

        task.mark_cancelled().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.mark_cancelled().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        let kind: TaskKind = serde_json::from_str("\"creator\"").unwrap();
        assert_eq!(kind, TaskKind::Creator);
    }

    #[test]
    fn test_restore_after_restart() {
        let now = Utc::now();

        let mut one_shot = Task::from_spec(TaskSpec::search("xhs", "food"), 100, now);
        one_shot.mark_running().unwrap();
        assert!(one_shot.restore_after_restart());
        assert_eq!(one_shot.status, TaskStatus::Failed);
        assert_eq!(one_shot.last_error.as_deref(), Some(INTERRUPTED_BY_RESTART));

        let mut recurring =
            Task::from_spec(TaskSpec::search("xhs", "food").with_interval(60), 100, now);
        let scheduled_at = recurring.scheduled_at;
        recurring.mark_running().unwrap();
        assert!(recurring.restore_after_restart());
        assert_eq!(recurring.status, TaskStatus::Pending);
        assert_eq!(recurring.scheduled_at, scheduled_at);

        let mut pending = Task::from_spec(TaskSpec::detail("dy", "n1"), 100, now);
        assert!(!pending.restore_after_restart());
        assert_eq!(pending.status, TaskStatus::Pending);
    }
}
