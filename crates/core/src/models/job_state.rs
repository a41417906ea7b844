use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::Endpoint;

/// 随触发器持久化的内部记录
///
/// 由编解码器写入、重试执行器独占修改；任务注册表创建之后
/// 只会读取它用于列表重建，不再写入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedJobState {
    pub task_id: String,
    pub key: String,
    pub endpoint: Endpoint,
    pub retry: RetryMetadata,
}

impl PersistedJobState {
    pub fn new(task_id: impl Into<String>, key: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            task_id: task_id.into(),
            key: key.into(),
            endpoint,
            retry: RetryMetadata::default(),
        }
    }
}

/// 重试簿记
///
/// 每次触发修改一次，并在触发处理器返回前写回触发器存储
/// （包括删除触发器的路径，持久化先于删除）。
///
/// 不变式：`notification_attempt` 在任何一次成功投递后归零，
/// 且在任务被放弃之前不会超过配置的最大重试次数。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryMetadata {
    /// 最近一次触发（无论成败）的时刻
    pub last_fire_time: Option<DateTime<Utc>>,
    /// 最近一次失败的时刻
    pub last_failure_time: Option<DateTime<Utc>>,
    /// 累计触发次数，成功与失败都计入
    pub executions: u64,
    /// 累计失败次数
    pub failures: u64,
    /// 自上次成功以来的连续重试次数
    pub notification_attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{CallbackTransport, Endpoint};

    #[test]
    fn test_zero_initialized_metadata() {
        let state = PersistedJobState::new("task-1", "ns.orders", Endpoint::queue(None));

        assert_eq!(state.retry.executions, 0);
        assert_eq!(state.retry.failures, 0);
        assert_eq!(state.retry.notification_attempt, 0);
        assert!(state.retry.last_fire_time.is_none());
        assert!(state.retry.last_failure_time.is_none());
        assert_eq!(state.endpoint.transport, CallbackTransport::Queue);
    }
}
