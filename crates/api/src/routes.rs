use axum::{
    routing::{get, post},
    Router,
};
use crawler_dispatcher::TaskScheduler;
use crawler_infrastructure::Monitor;
use std::sync::Arc;

use crate::handlers::{
    system::{get_stats, health_check},
    tasks::{cancel_task, create_task, delete_task, get_task, list_tasks},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<TaskScheduler>,
    pub monitor: Arc<Monitor>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 任务管理API
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", get(get_task).delete(delete_task))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        // 系统统计
        .route("/api/stats", get(get_stats))
        .with_state(state)
}
