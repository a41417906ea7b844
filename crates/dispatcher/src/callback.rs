use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use cbsched_core::models::{CallbackMessage, CallbackTransport, PersistedJobState};
use cbsched_core::traits::{CallbackDispatch, QueuePublisher};
use cbsched_core::{Result, SchedulerError};

/// 回调分发器
///
/// 把解码后的任务投递到它的回调端点（队列发布或HTTP POST），
/// 并把失败归类为可恢复（远端可能只是暂时不可用）或致命
/// （请求本身不可能成功，重试只会浪费次数、拖延放弃）。
/// 从不在内部重试。
pub struct CallbackDispatcher {
    publisher: Arc<dyn QueuePublisher>,
    http_client: reqwest::Client,
}

impl CallbackDispatcher {
    pub fn new(publisher: Arc<dyn QueuePublisher>, http_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("构建HTTP客户端失败: {e}")))?;

        Ok(Self {
            publisher,
            http_client,
        })
    }

    async fn dispatch_queue(&self, state: &PersistedJobState, message: &CallbackMessage) -> Result<()> {
        let routing_key = state.endpoint.routing_key(&state.key);
        let body = serde_json::to_vec(message)
            .map_err(|e| SchedulerError::Serialization(format!("序列化回调消息失败: {e}")))?;

        // 发布端负责把传输层I/O故障映射为RemoteUnreachable
        self.publisher.publish(routing_key, &body).await?;

        debug!("任务 {}/{} 的回调已发布到 {}", state.key, state.task_id, routing_key);
        Ok(())
    }

    async fn dispatch_http(&self, state: &PersistedJobState, message: &CallbackMessage) -> Result<()> {
        let url = state.endpoint.target.as_deref().ok_or_else(|| {
            SchedulerError::CallbackRejected("HTTP端点缺少回调URL".to_string())
        })?;

        let response = self
            .http_client
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(classify_http_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(
                "任务 {}/{} 的回调已POST到 {}，状态码 {}",
                state.key, state.task_id, url, status
            );
            return Ok(());
        }

        // 5xx是服务端故障，可能自愈；其余状态码说明请求本身就是错的
        if status.is_server_error() {
            Err(SchedulerError::RemoteUnreachable(format!(
                "回调端点返回 {status}"
            )))
        } else {
            Err(SchedulerError::CallbackRejected(format!(
                "回调端点返回 {status}"
            )))
        }
    }
}

/// HTTP传输错误分类
///
/// 连接拒绝、DNS失败、超时、响应中途断开都归为远端不可达；
/// 请求构建（含消息序列化）失败属于本地错误，致命。
fn classify_http_error(err: reqwest::Error) -> SchedulerError {
    if err.is_builder() {
        SchedulerError::CallbackRejected(format!("构建回调请求失败: {err}"))
    } else {
        SchedulerError::RemoteUnreachable(format!("回调请求失败: {err}"))
    }
}

#[async_trait]
impl CallbackDispatch for CallbackDispatcher {
    async fn dispatch(
        &self,
        state: &PersistedJobState,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let message = CallbackMessage::from_state(state, payload);

        match state.endpoint.transport {
            CallbackTransport::Queue => self.dispatch_queue(state, &message).await,
            CallbackTransport::Http => self.dispatch_http(state, &message).await,
        }
    }
}
