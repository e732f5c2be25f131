//! Prometheus 指标
//!
//! 指标通过 `metrics` 门面上报，未安装 recorder 时调用为空操作。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

pub struct MetricsCollector {
    tasks_admitted_total: Counter,
    task_successes_total: Counter,
    task_failures_total: Counter,
    task_duration: Histogram,
    tasks_deduplicated_total: Counter,
    tasks_throttled_total: Counter,
    proxy_exhausted_total: Counter,

    queue_depth: Gauge,
    valid_proxies: Gauge,
    tick_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_admitted_total: counter!("crawler_tasks_admitted_total"),
            task_successes_total: counter!("crawler_task_successes_total"),
            task_failures_total: counter!("crawler_task_failures_total"),
            task_duration: histogram!("crawler_task_duration_seconds"),
            tasks_deduplicated_total: counter!("crawler_tasks_deduplicated_total"),
            tasks_throttled_total: counter!("crawler_tasks_throttled_total"),
            proxy_exhausted_total: counter!("crawler_proxy_exhausted_total"),
            queue_depth: gauge!("crawler_queue_depth"),
            valid_proxies: gauge!("crawler_valid_proxies"),
            tick_duration: histogram!("crawler_tick_duration_seconds"),
        }
    }

    pub fn record_admission(&self) {
        self.tasks_admitted_total.increment(1);
    }

    pub fn record_success(&self, duration_seconds: f64) {
        self.task_successes_total.increment(1);
        self.task_duration.record(duration_seconds);
    }

    pub fn record_failure(&self, duration_seconds: f64) {
        self.task_failures_total.increment(1);
        self.task_duration.record(duration_seconds);
    }

    pub fn record_duplicate(&self) {
        self.tasks_deduplicated_total.increment(1);
    }

    pub fn record_throttled(&self) {
        self.tasks_throttled_total.increment(1);
    }

    pub fn record_proxy_exhausted(&self) {
        self.proxy_exhausted_total.increment(1);
    }

    pub fn update_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }

    pub fn update_valid_proxies(&self, count: usize) {
        self.valid_proxies.set(count as f64);
    }

    pub fn record_tick_duration(&self, duration_seconds: f64) {
        self.tick_duration.record(duration_seconds);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
