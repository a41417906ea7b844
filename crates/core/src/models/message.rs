use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job_state::PersistedJobState;

/// 出站回调消息
///
/// 两种传输共用的线上格式，字段名与对外契约一致（camelCase）。
/// `last_fire_time` 按RFC3339序列化。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackMessage {
    pub task_id: String,
    pub key: String,
    pub payload: serde_json::Value,
    pub last_fire_time: DateTime<Utc>,
    pub notification_attempt: u32,
}

impl CallbackMessage {
    /// 从当前触发的任务状态和负载构造消息
    pub fn from_state(state: &PersistedJobState, payload: &serde_json::Value) -> Self {
        Self {
            task_id: state.task_id.clone(),
            key: state.key.clone(),
            payload: payload.clone(),
            // 执行器在投递前已把本次触发时刻写入状态
            last_fire_time: state.retry.last_fire_time.unwrap_or_else(Utc::now),
            notification_attempt: state.retry.notification_attempt,
        }
    }
}
