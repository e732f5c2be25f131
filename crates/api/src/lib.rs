//! # 爬虫调度 HTTP API
//!
//! 在 [`TaskScheduler`] 之上提供一层很薄的 axum 接口：
//!
//! | 方法 | 路径 | 说明 |
//! |------|------|------|
//! | POST | `/api/tasks` | 提交任务，成功返回 201 |
//! | GET | `/api/tasks` | 列出任务，可按 `status`、`platform`、`kind` 过滤 |
//! | GET | `/api/tasks/{id}` | 查询任务 |
//! | POST | `/api/tasks/{id}/cancel` | 取消任务 |
//! | DELETE | `/api/tasks/{id}` | 删除非运行中的任务 |
//! | GET | `/api/stats` | 监控统计与队列状态 |
//! | GET | `/health` | 健康检查，不健康时返回 503 |
//!
//! 所有响应使用统一信封 `{success, data, error}`。
//!
//! [`TaskScheduler`]: crawler_dispatcher::TaskScheduler

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use crawler_core::config::ApiConfig;
use std::future::Future;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::info;

use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, config: &ApiConfig) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if config.cors_enabled {
        router.layer(cors_layer(config))
    } else {
        router
    }
}

/// 启动API服务，`shutdown` 完成后停止接收新连接
pub async fn serve<F>(state: AppState, config: &ApiConfig, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("API服务监听于 {}", listener.local_addr()?);

    axum::serve(listener, create_app(state, config))
        .with_graceful_shutdown(shutdown)
        .await
}
