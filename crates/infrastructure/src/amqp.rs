use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tracing::{debug, info};

use cbsched_core::config::AmqpConfig;
use cbsched_core::traits::QueuePublisher;
use cbsched_core::{Result, SchedulerError};

/// RabbitMQ回调发布端
///
/// 启动时连接broker并声明topic交换机，发布开启publisher confirm，
/// 确认返回后才算投递完成。
pub struct RabbitMqPublisher {
    _connection: Connection,
    channel: Channel,
    exchange: String,
}

impl RabbitMqPublisher {
    pub async fn connect(config: &AmqpConfig) -> Result<Self> {
        let connect_timeout = Duration::from_secs(config.connection_timeout_seconds);
        let connection = tokio::time::timeout(
            connect_timeout,
            Connection::connect(&config.url, ConnectionProperties::default()),
        )
        .await
        .map_err(|_| {
            SchedulerError::MessageQueue(format!(
                "连接RabbitMQ超时（{}秒）",
                config.connection_timeout_seconds
            ))
        })?
        .map_err(|e| SchedulerError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("创建通道失败: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("开启发布确认失败: {e}")))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!("声明交换机 {} 失败: {e}", config.exchange))
            })?;

        info!("已连接RabbitMQ并声明交换机 {}", config.exchange);

        Ok(Self {
            _connection: connection,
            channel,
            exchange: config.exchange.clone(),
        })
    }
}

/// AMQP错误分类
///
/// 连接/通道级的I/O故障意味着broker可能只是暂时不可达，可恢复；
/// 协议与序列化层面的失败重试不会有任何帮助。
fn classify_amqp_error(err: lapin::Error) -> SchedulerError {
    match err.kind() {
        lapin::ErrorKind::IOError(_)
        | lapin::ErrorKind::InvalidConnectionState(_)
        | lapin::ErrorKind::InvalidChannelState(..) => {
            SchedulerError::RemoteUnreachable(format!("消息代理不可达: {err}"))
        }
        _ => SchedulerError::MessageQueue(format!("发布回调消息失败: {err}")),
    }
}

#[async_trait]
impl QueuePublisher for RabbitMqPublisher {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_delivery_mode(2) // 2 = persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(classify_amqp_error)?;

        confirm.await.map_err(classify_amqp_error)?;

        debug!("回调消息已发布，routing_key={}", routing_key);
        Ok(())
    }
}

/// AMQP未启用时的占位发布端
///
/// 没有可用broker，QUEUE投递直接以致命错误失败。
pub struct DisabledQueuePublisher;

#[async_trait]
impl QueuePublisher for DisabledQueuePublisher {
    async fn publish(&self, routing_key: &str, _body: &[u8]) -> Result<()> {
        Err(SchedulerError::MessageQueue(format!(
            "AMQP未启用，无法发布到 {routing_key}"
        )))
    }
}
