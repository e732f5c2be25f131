//! 事件化的结构化日志
//!
//! 调度与代理的关键事件统一从这里输出，字段名保持稳定，便于按 `event` 检索。

use chrono::{DateTime, Utc};
use crawler_core::Task;
use tracing::{debug, error, info, warn};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_submitted(task: &Task) {
        info!(
            event = "task_submitted",
            task.id = %task.id,
            task.kind = %task.kind,
            task.platform = %task.platform,
            task.recurring = task.is_recurring(),
            task.scheduled_at = %task.scheduled_at,
            "Task submitted"
        );
    }

    pub fn log_task_admitted(task: &Task) {
        info!(
            event = "task_admitted",
            task.id = %task.id,
            task.kind = %task.kind,
            task.platform = %task.platform,
            "Task admitted for execution"
        );
    }

    pub fn log_task_deferred(task_id: &str, reason: &str) {
        debug!(
            event = "task_deferred",
            task.id = task_id,
            reason = reason,
            "Task admission deferred"
        );
    }

    pub fn log_task_completed(task: &Task, records: usize, duration_ms: u64) {
        info!(
            event = "task_completed",
            task.id = %task.id,
            task.platform = %task.platform,
            task.kind = %task.kind,
            task.records = records,
            task.duration_ms = duration_ms,
            task.execution_count = task.execution_count,
            "Task execution completed"
        );
    }

    pub fn log_task_failed(task: &Task, error_message: &str, duration_ms: u64) {
        error!(
            event = "task_failed",
            task.id = %task.id,
            task.platform = %task.platform,
            task.kind = %task.kind,
            task.duration_ms = duration_ms,
            task.execution_count = task.execution_count,
            task.error = error_message,
            "Task execution failed"
        );
    }

    pub fn log_task_cancelled(task_id: &str, while_running: bool) {
        info!(
            event = "task_cancelled",
            task.id = task_id,
            task.was_running = while_running,
            "Task cancelled"
        );
    }

    pub fn log_task_rescheduled(task_id: &str, next_run: DateTime<Utc>) {
        debug!(
            event = "task_rescheduled",
            task.id = task_id,
            task.scheduled_at = %next_run,
            "Recurring task rescheduled"
        );
    }

    pub fn log_proxy_pool_refreshed(provider: &str, fetched: usize, valid: usize, duration_ms: u64) {
        info!(
            event = "proxy_pool_refreshed",
            proxy.provider = provider,
            proxy.fetched = fetched,
            proxy.valid = valid,
            duration_ms = duration_ms,
            "Proxy pool refreshed"
        );
    }

    pub fn log_proxy_invalidated(proxy_url: &str, reason: &str) {
        warn!(
            event = "proxy_invalidated",
            proxy.url = proxy_url,
            reason = reason,
            "Proxy removed from rotation"
        );
    }

    pub fn log_scheduler_shutdown(in_flight: usize, abandoned: usize) {
        info!(
            event = "scheduler_shutdown",
            tasks.in_flight = in_flight,
            tasks.abandoned = abandoned,
            "Scheduler stopped"
        );
    }
}
