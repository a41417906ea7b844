use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cbsched_core::SchedulerError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("未找到资源")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, error_message) = match &self {
            ApiError::Scheduler(SchedulerError::PastTriggerTime(at)) => (
                StatusCode::BAD_REQUEST,
                "PAST_TRIGGER_TIME",
                format!("触发时间 {at} 已经过去"),
            ),
            ApiError::Scheduler(SchedulerError::DuplicateTask { key, id }) => (
                StatusCode::BAD_REQUEST,
                "DUPLICATE_TASK",
                format!("任务 {key}/{id} 已被调度"),
            ),
            ApiError::Scheduler(SchedulerError::InvalidCron { expr, message }) => (
                StatusCode::BAD_REQUEST,
                "INVALID_CRON_EXPRESSION",
                format!("Cron表达式 '{expr}' 无效: {message}"),
            ),
            ApiError::Scheduler(SchedulerError::InvalidCallbackUrl(msg)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_CALLBACK_URL",
                format!("回调URL无效: {msg}"),
            ),
            ApiError::Scheduler(SchedulerError::InvalidTaskParams(msg)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_TASK_PARAMS",
                format!("任务参数无效: {msg}"),
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "请求的任务不存在".to_string(),
            ),
            ApiError::Scheduler(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SCHEDULING_ERROR",
                format!("调度失败: {err}"),
            ),
        };

        let body = json!({
            "success": false,
            "error": {
                "code": error_type,
                "message": error_message,
            },
            "timestamp": chrono::Utc::now(),
        });

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
