use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 执行过程中上报给监控器的事件
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// 任务通过准入
    Admission { task_id: String, platform: String },
    Success {
        task_id: String,
        platform: String,
        duration: Duration,
        records: usize,
    },
    Failure {
        task_id: String,
        platform: String,
        duration: Duration,
        error: String,
    },
    /// 没有可用代理
    ProxyExhausted { task_id: String },
    /// 因重复被跳过
    Duplicate { task_id: String },
    /// 超出每秒准入上限被延后
    Throttled { task_id: String },
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::Admission { .. } => "admission",
            MonitorEvent::Success { .. } => "success",
            MonitorEvent::Failure { .. } => "failure",
            MonitorEvent::ProxyExhausted { .. } => "proxy_exhausted",
            MonitorEvent::Duplicate { .. } => "duplicate",
            MonitorEvent::Throttled { .. } => "throttled",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// 监控统计快照
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorStats {
    pub uptime_seconds: u64,
    pub admissions: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub duplicates_skipped: u64,
    pub throttled: u64,
    pub proxy_exhausted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub failure_rate: f64,
    pub checked_at: DateTime<Utc>,
}

/// 最近一次失败的记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    pub task_id: String,
    pub platform: String,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}
