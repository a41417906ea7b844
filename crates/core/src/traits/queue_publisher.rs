use async_trait::async_trait;

use crate::errors::Result;

/// 消息队列发布端
///
/// 实现负责把传输层I/O故障映射为 `RemoteUnreachable`（可恢复），
/// 其余故障原样保持致命。
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<()>;
}
