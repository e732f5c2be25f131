use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use crawler_core::{CrawlerError, Task, TaskFilter, TaskKind, TaskSpec, TaskStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::ApiResult,
    response::{created, success, ApiResponse},
    routes::AppState,
};

/// 任务创建请求
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
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
    #[serde(default)]
    pub interval_seconds: Option<u64>,
    #[serde(default)]
    pub delay_start: bool,
}

impl From<CreateTaskRequest> for TaskSpec {
    fn from(request: CreateTaskRequest) -> Self {
        TaskSpec {
            name: request.name,
            kind: request.kind,
            platform: request.platform,
            query: request.query,
            target_id: request.target_id,
            max_results: request.max_results,
            interval_seconds: request.interval_seconds,
            delay_start: request.delay_start,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub id: String,
}

/// 任务查询参数
#[derive(Debug, Default, Deserialize)]
pub struct TaskQueryParams {
    pub status: Option<String>,
    pub platform: Option<String>,
    pub kind: Option<String>,
}

impl TaskQueryParams {
    fn into_filter(self) -> ApiResult<TaskFilter> {
        Ok(TaskFilter {
            status: self
                .status
                .as_deref()
                .map(str::parse::<TaskStatus>)
                .transpose()?,
            platform: self.platform,
            kind: self
                .kind
                .as_deref()
                .map(str::parse::<TaskKind>)
                .transpose()?,
        })
    }
}

/// 提交任务
pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let id = state.scheduler.submit(request.into()).await?;
    info!("通过API提交任务: {}", id);
    Ok(created(CreateTaskResponse { id }))
}

/// 获取任务列表
pub async fn list_tasks(
    State(state): State<AppState>,
    params: Result<Query<TaskQueryParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = params?;
    let filter = params.into_filter()?;
    let tasks: Vec<Task> = state.scheduler.list_tasks(&filter).await;
    Ok(success(tasks))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .scheduler
        .get_task(&id)
        .await
        .ok_or(CrawlerError::TaskNotFound { id })?;
    Ok(success(task))
}

/// 取消任务
///
/// 执行中的任务在下一个检查点停止，返回的快照可能仍是 `running`。
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = state.scheduler.cancel(&id).await?;
    let status = if task.status == TaskStatus::Running {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, ApiResponse::success(task)))
}

/// 删除任务
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = state.scheduler.remove_task(&id).await?;
    info!("通过API删除任务: {}", task.id);
    Ok(success(task))
}
