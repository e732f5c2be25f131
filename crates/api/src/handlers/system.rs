use axum::{extract::State, http::StatusCode, response::IntoResponse};
use crawler_core::{ErrorRecord, HealthReport, HealthStatus, MonitorStats};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiResult,
    response::{success, ApiResponse},
    routes::AppState,
};

const RECENT_ERRORS_LIMIT: usize = 10;

/// 系统统计
#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStats {
    #[serde(flatten)]
    pub monitor: MonitorStats,
    pub total_tasks: usize,
    pub running_tasks: usize,
    pub queue_depth: usize,
    pub recent_errors: Vec<ErrorRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub version: String,
}

pub async fn get_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = SystemStats {
        monitor: state.monitor.get_stats(),
        total_tasks: state.scheduler.task_count().await,
        running_tasks: state.scheduler.running_count().await,
        queue_depth: state.scheduler.queue_depth(),
        recent_errors: state.monitor.recent_errors(RECENT_ERRORS_LIMIT),
    };
    Ok(success(stats))
}

/// 健康检查，`unhealthy` 时返回 503
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.monitor.check_health();
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };

    (
        status,
        ApiResponse::success(HealthResponse {
            report,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
