use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use crawler_core::{
    config::MonitorConfig, ErrorRecord, HealthReport, HealthStatus, MonitorEvent, MonitorStats,
    TaskMonitor,
};

use super::MetricsCollector;

#[derive(Debug, Default)]
struct MonitorState {
    admissions: u64,
    successes: u64,
    failures: u64,
    duplicates: u64,
    throttled: u64,
    proxy_exhausted: u64,
    latencies: VecDeque<Duration>,
    recent_errors: VecDeque<ErrorRecord>,
}

/// 执行监控器
///
/// 聚合执行事件计数、滚动平均延迟与最近错误，并据此给出健康状态：
/// 失败数超过成功数为 `unhealthy`，失败率超过阈值为 `degraded`。
pub struct Monitor {
    config: MonitorConfig,
    started_at: Instant,
    state: Mutex<MonitorState>,
    metrics: Arc<MetricsCollector>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_metrics(config, Arc::new(MetricsCollector::new()))
    }

    pub fn with_metrics(config: MonitorConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            config,
            started_at: Instant::now(),
            state: Mutex::new(MonitorState::default()),
            metrics,
        }
    }

    // 锁中毒时继续使用内部数据，监控不能让调用方 panic
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get_stats(&self) -> MonitorStats {
        let state = self.state();
        let executed = state.successes + state.failures;
        let success_rate = if executed > 0 {
            state.successes as f64 / executed as f64
        } else {
            0.0
        };
        let average_latency_ms = if state.latencies.is_empty() {
            0.0
        } else {
            let total: Duration = state.latencies.iter().sum();
            total.as_secs_f64() * 1000.0 / state.latencies.len() as f64
        };

        MonitorStats {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            admissions: state.admissions,
            successes: state.successes,
            failures: state.failures,
            success_rate,
            average_latency_ms,
            duplicates_skipped: state.duplicates,
            throttled: state.throttled,
            proxy_exhausted: state.proxy_exhausted,
        }
    }

    pub fn check_health(&self) -> HealthReport {
        let (successes, failures) = {
            let state = self.state();
            (state.successes, state.failures)
        };
        let executed = successes + failures;
        let failure_rate = if executed > 0 {
            failures as f64 / executed as f64
        } else {
            0.0
        };

        let status = if failures > successes {
            HealthStatus::Unhealthy
        } else if failure_rate > self.config.degraded_failure_rate {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            failure_rate,
            checked_at: Utc::now(),
        }
    }

    /// 最近的失败记录，按时间倒序
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        let state = self.state();
        state.recent_errors.iter().rev().take(limit).cloned().collect()
    }

    fn push_latency(&self, state: &mut MonitorState, duration: Duration) {
        state.latencies.push_back(duration);
        while state.latencies.len() > self.config.latency_window {
            state.latencies.pop_front();
        }
    }
}

impl TaskMonitor for Monitor {
    fn record(&self, event: MonitorEvent) {
        let mut state = self.state();
        match event {
            MonitorEvent::Admission { .. } => {
                state.admissions += 1;
                self.metrics.record_admission();
            }
            MonitorEvent::Success { duration, .. } => {
                state.successes += 1;
                self.push_latency(&mut state, duration);
                self.metrics.record_success(duration.as_secs_f64());
            }
            MonitorEvent::Failure {
                task_id,
                platform,
                duration,
                error,
            } => {
                state.failures += 1;
                self.push_latency(&mut state, duration);
                if self.config.max_recent_errors > 0 {
                    state.recent_errors.push_back(ErrorRecord {
                        task_id,
                        platform,
                        error,
                        occurred_at: Utc::now(),
                    });
                    while state.recent_errors.len() > self.config.max_recent_errors {
                        state.recent_errors.pop_front();
                    }
                }
                self.metrics.record_failure(duration.as_secs_f64());
            }
            MonitorEvent::ProxyExhausted { .. } => {
                state.proxy_exhausted += 1;
                self.metrics.record_proxy_exhausted();
            }
            MonitorEvent::Duplicate { .. } => {
                state.duplicates += 1;
                self.metrics.record_duplicate();
            }
            MonitorEvent::Throttled { .. } => {
                state.throttled += 1;
                self.metrics.record_throttled();
            }
        }
    }
}
