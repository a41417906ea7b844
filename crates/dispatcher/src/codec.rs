use base64::{engine::general_purpose::STANDARD, Engine as _};

use cbsched_core::models::{Endpoint, PersistedJobState, Task};
use cbsched_core::traits::JobData;
use cbsched_core::{Result, SchedulerError};

/// 作业数据编解码器
///
/// 负责调度器随触发器持久化的两个blob：内部簿记状态与不透明负载。
/// 纯序列化，无任何I/O。
#[derive(Debug, Clone, Default)]
pub struct JobDataCodec;

impl JobDataCodec {
    pub fn new() -> Self {
        Self
    }

    /// 编码新任务的持久化数据
    ///
    /// 内部状态以JSON存储，重试簿记零值初始化；负载（缺省为空对象）
    /// 先序列化为JSON再做base64，使得只接受字符串值的存储也能安全持有。
    pub fn encode(&self, task: &Task, endpoint: &Endpoint) -> Result<JobData> {
        let state = PersistedJobState::new(&task.id, &task.key, endpoint.clone());
        let state_blob = self.encode_state(&state)?;

        let payload = if task.payload.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            task.payload.clone()
        };
        let payload_bytes = serde_json::to_vec(&payload)
            .map_err(|e| SchedulerError::Serialization(format!("序列化任务负载失败: {e}")))?;

        Ok(JobData {
            state_blob,
            payload_blob: STANDARD.encode(payload_bytes),
        })
    }

    /// 解码内部簿记状态
    ///
    /// blob缺失或损坏意味着作业本身已不可用，错误是致命且不可重试的。
    pub fn decode_state(&self, data: &JobData) -> Result<PersistedJobState> {
        if data.state_blob.is_empty() {
            return Err(SchedulerError::Decode("作业缺少内部调度状态".to_string()));
        }
        serde_json::from_str(&data.state_blob)
            .map_err(|e| SchedulerError::Decode(format!("解析内部调度状态失败: {e}")))
    }

    /// 解码用户负载
    ///
    /// `encode` 产出的blob总是合法的，这里失败属于内部不变式被破坏。
    pub fn decode_payload(&self, data: &JobData) -> Result<serde_json::Value> {
        let bytes = STANDARD
            .decode(&data.payload_blob)
            .map_err(|e| SchedulerError::Decode(format!("负载base64解码失败: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SchedulerError::Decode(format!("解析负载JSON失败: {e}")))
    }

    /// 重试簿记变更后重新序列化状态，用于写回触发器存储
    pub fn encode_state(&self, state: &PersistedJobState) -> Result<String> {
        serde_json::to_string(state)
            .map_err(|e| SchedulerError::Serialization(format!("序列化内部调度状态失败: {e}")))
    }
}
