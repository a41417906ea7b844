use async_trait::async_trait;

use crate::errors::Result;
use crate::models::PersistedJobState;

/// 回调投递
///
/// 把一次触发的负载投递到任务的回调端点。实现不做内部重试，
/// 重试策略完全由调用方（重试执行器）决定。
#[async_trait]
pub trait CallbackDispatch: Send + Sync {
    async fn dispatch(&self, state: &PersistedJobState, payload: &serde_json::Value)
        -> Result<()>;
}
