use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use cbsched_api::create_app;
use cbsched_core::traits::{QueuePublisher, TriggerStore};
use cbsched_core::{AppConfig, ErrorClassRegistry};
use cbsched_dispatcher::{
    CallbackDispatcher, CallbackJobExecutor, JobDataCodec, RetryPolicy, TaskRegistry,
};
use cbsched_infrastructure::{
    DisabledQueuePublisher, InMemoryTriggerStore, RabbitMqPublisher, TriggerEngine,
};

/// 主应用程序
///
/// 负责装配各组件：触发器存储、回调分发器、重试执行器、
/// 任务注册表与HTTP API，并驱动触发引擎与API服务直到关闭。
pub struct Application {
    config: AppConfig,
    engine: Arc<TriggerEngine>,
    registry: Arc<TaskRegistry>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        let store = Arc::new(InMemoryTriggerStore::new());

        // 创建回调发布端
        let publisher: Arc<dyn QueuePublisher> = if config.amqp.enabled {
            Arc::new(
                RabbitMqPublisher::connect(&config.amqp)
                    .await
                    .context("初始化AMQP发布端失败")?,
            )
        } else {
            info!("AMQP未启用，QUEUE回调将直接失败");
            Arc::new(DisabledQueuePublisher)
        };

        let dispatcher = Arc::new(
            CallbackDispatcher::new(
                publisher,
                Duration::from_millis(config.scheduler.http_callback_timeout_ms),
            )
            .context("初始化回调分发器失败")?,
        );

        // 启动时构建一次可恢复错误注册表，显式注入执行器
        let error_registry = Arc::new(ErrorClassRegistry::standard());

        let executor = Arc::new(CallbackJobExecutor::new(
            JobDataCodec::new(),
            dispatcher,
            error_registry,
            Arc::clone(&store) as Arc<dyn TriggerStore>,
            RetryPolicy {
                max_attempts: config.scheduler.max_retry_attempts,
                delay: chrono::Duration::milliseconds(config.scheduler.retry_delay_ms as i64),
            },
        ));

        let engine = Arc::new(TriggerEngine::new(
            Arc::clone(&store),
            executor,
            Duration::from_millis(config.scheduler.poll_interval_ms),
            config.scheduler.max_concurrent_fires,
        ));

        let registry = Arc::new(TaskRegistry::new(
            Arc::clone(&store) as Arc<dyn TriggerStore>
        ));

        Ok(Self {
            config,
            engine,
            registry,
        })
    }

    /// 运行应用程序直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let engine_shutdown = shutdown_rx.resubscribe();
        let engine_handle = tokio::spawn(async move {
            engine.run(engine_shutdown).await;
        });

        if self.config.api.enabled {
            self.run_api(shutdown_rx).await?;
        } else {
            // 没有API时仅运行触发引擎
            let mut rx = shutdown_rx;
            let _ = rx.recv().await;
        }

        engine_handle.await.context("等待触发引擎退出失败")?;
        Ok(())
    }

    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let app = create_app(Arc::clone(&self.registry));
        let bind_address = &self.config.api.bind_address;

        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定API监听地址失败: {bind_address}"))?;

        info!("API服务监听 {}", bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("API服务运行失败")?;

        info!("API服务已停止");
        Ok(())
    }
}
