use chrono::{DateTime, Utc};
use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("触发时间已过期: {0}")]
    PastTriggerTime(DateTime<Utc>),

    #[error("任务已存在: {key}/{id}")]
    DuplicateTask { key: String, id: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的回调URL: {0}")]
    InvalidCallbackUrl(String),

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("任务状态解码失败: {0}")]
    Decode(String),

    #[error("回调目标不可达: {0}")]
    RemoteUnreachable(String),

    #[error("回调被拒绝: {0}")]
    CallbackRejected(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("触发器存储错误: {0}")]
    TriggerStore(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误种类标签
///
/// `SchedulerError` 的每个变体对应一个编译期枚举的标签，
/// 供 [`ErrorClassRegistry`](crate::error_registry::ErrorClassRegistry)
/// 按种类判定可恢复性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PastTriggerTime,
    DuplicateTask,
    InvalidCron,
    InvalidCallbackUrl,
    InvalidTaskParams,
    Decode,
    RemoteUnreachable,
    CallbackRejected,
    MessageQueue,
    Serialization,
    TriggerStore,
    Configuration,
    Internal,
}

impl SchedulerError {
    /// 返回错误对应的种类标签
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::PastTriggerTime(_) => ErrorKind::PastTriggerTime,
            SchedulerError::DuplicateTask { .. } => ErrorKind::DuplicateTask,
            SchedulerError::InvalidCron { .. } => ErrorKind::InvalidCron,
            SchedulerError::InvalidCallbackUrl(_) => ErrorKind::InvalidCallbackUrl,
            SchedulerError::InvalidTaskParams(_) => ErrorKind::InvalidTaskParams,
            SchedulerError::Decode(_) => ErrorKind::Decode,
            SchedulerError::RemoteUnreachable(_) => ErrorKind::RemoteUnreachable,
            SchedulerError::CallbackRejected(_) => ErrorKind::CallbackRejected,
            SchedulerError::MessageQueue(_) => ErrorKind::MessageQueue,
            SchedulerError::Serialization(_) => ErrorKind::Serialization,
            SchedulerError::TriggerStore(_) => ErrorKind::TriggerStore,
            SchedulerError::Configuration(_) => ErrorKind::Configuration,
            SchedulerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;
