use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cbsched_core::models::{CallbackTransport, Endpoint, RetryMetadata, Task};

use crate::error::{ApiError, ApiResult};
use crate::response::{created, no_content, success};
use crate::routes::AppState;

/// 调度创建请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub task_identifier: String,
    pub task_key: String,
    pub trigger_time: DateTime<Utc>,
    pub cron_expression: Option<String>,
    pub callback_descriptor: CallbackDescriptor,
    pub task_data: Option<serde_json::Value>,
}

/// 回调端点描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackDescriptor {
    #[serde(rename = "type")]
    pub transport: CallbackTransport,
    pub endpoint: Option<String>,
}

/// 任务视图
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTaskDto {
    pub task_identifier: String,
    pub task_key: String,
    pub trigger_time: DateTime<Utc>,
    pub cron_expression: Option<String>,
    pub task_data: serde_json::Value,
}

impl From<Task> for ScheduleTaskDto {
    fn from(task: Task) -> Self {
        Self {
            task_identifier: task.id,
            task_key: task.key,
            trigger_time: task.trigger_time,
            cron_expression: task.cron_expression,
            task_data: task.payload,
        }
    }
}

/// 重试簿记视图
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatsDto {
    pub last_trigger_time: Option<DateTime<Utc>>,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub executions: u64,
    pub failures: u64,
    pub notification_attempt: u32,
}

impl From<RetryMetadata> for TaskStatsDto {
    fn from(retry: RetryMetadata) -> Self {
        Self {
            last_trigger_time: retry.last_fire_time,
            last_failure_time: retry.last_failure_time,
            executions: retry.executions,
            failures: retry.failures,
            notification_attempt: retry.notification_attempt,
        }
    }
}

fn task_from_request(request: &ScheduleRequest) -> Task {
    Task {
        id: request.task_identifier.clone(),
        key: request.task_key.clone(),
        trigger_time: request.trigger_time,
        cron_expression: request.cron_expression.clone(),
        payload: request
            .task_data
            .clone()
            .unwrap_or(serde_json::Value::Null),
    }
}

fn endpoint_from_request(request: &ScheduleRequest) -> Endpoint {
    Endpoint {
        transport: request.callback_descriptor.transport,
        target: request.callback_descriptor.endpoint.clone(),
    }
}

/// 创建调度任务
pub async fn create_schedule(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let task = task_from_request(&request);
    let endpoint = endpoint_from_request(&request);

    state.registry.schedule_task(&task, &endpoint).await?;
    Ok(created(request))
}

/// 列出命名空间下的全部任务
pub async fn list_schedules(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let tasks = state.registry.get_tasks_for_key(&key).await?;
    let dtos: Vec<ScheduleTaskDto> = tasks.into_iter().map(ScheduleTaskDto::from).collect();
    Ok(success(dtos))
}

/// 查询单个任务
pub async fn get_schedule(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, String)>,
) -> ApiResult<impl axum::response::IntoResponse> {
    match state.registry.get_task(&key, &id).await? {
        Some(task) => Ok(success(ScheduleTaskDto::from(task))),
        None => Err(ApiError::NotFound),
    }
}

/// 查询任务的重试簿记
pub async fn get_schedule_stats(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, String)>,
) -> ApiResult<impl axum::response::IntoResponse> {
    match state.registry.get_task_metadata(&key, &id).await? {
        Some(retry) => Ok(success(TaskStatsDto::from(retry))),
        None => Err(ApiError::NotFound),
    }
}

/// 删除任务；幂等，任务不存在同样返回204
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, String)>,
) -> ApiResult<impl axum::response::IntoResponse> {
    state.registry.delete_task(&key, &id).await?;
    Ok(no_content())
}
