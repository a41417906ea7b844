use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, warn};

use cbsched_core::models::PersistedJobState;
use cbsched_core::traits::{
    CallbackDispatch, FireContext, FireDisposition, JobData, JobHandler, TriggerStore,
};
use cbsched_core::{ErrorClassRegistry, SchedulerError};

use crate::codec::JobDataCodec;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 自上次成功以来允许的最大连续重试次数
    pub max_attempts: u32,
    /// 固定重试延迟，相对失败时刻计算
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::milliseconds(5000),
        }
    }
}

/// 触发时刻的重试状态机
///
/// 每次触发经历 `Scheduled → Firing → {Succeeded, RetryScheduled, Abandoned}`：
/// 解码状态、投递回调、更新计数器，然后决定重试还是放弃。
/// 重试延迟总是相对本次失败时刻的固定值，形成等间隔序列。
/// 状态在每次触发结束前无条件写回一次，且先于任何删除触发器的操作。
///
/// 引擎保证同一任务不会有两次触发并发执行，计数器的读-改-写无需加锁。
pub struct CallbackJobExecutor {
    codec: JobDataCodec,
    dispatcher: Arc<dyn CallbackDispatch>,
    error_registry: Arc<ErrorClassRegistry>,
    store: Arc<dyn TriggerStore>,
    policy: RetryPolicy,
}

/// 一次触发的裁决，计数器更新完毕后对触发器的处置
enum Decision {
    Succeeded,
    Retry {
        attempt: u32,
        failed_at: DateTime<Utc>,
        error: SchedulerError,
    },
    Abandon {
        error: SchedulerError,
    },
}

impl CallbackJobExecutor {
    pub fn new(
        codec: JobDataCodec,
        dispatcher: Arc<dyn CallbackDispatch>,
        error_registry: Arc<ErrorClassRegistry>,
        store: Arc<dyn TriggerStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            codec,
            dispatcher,
            error_registry,
            store,
            policy,
        }
    }

    /// 失败分类：计入失败计数后判定重试资格
    fn classify_failure(&self, state: &mut PersistedJobState, error: SchedulerError) -> Decision {
        let failed_at = Utc::now();
        state.retry.failures += 1;
        state.retry.last_failure_time = Some(failed_at);

        if !self.error_registry.is_recoverable(error.kind()) {
            return Decision::Abandon { error };
        }

        let attempt = state.retry.notification_attempt + 1;
        if attempt <= self.policy.max_attempts {
            state.retry.notification_attempt = attempt;
            Decision::Retry {
                attempt,
                failed_at,
                error,
            }
        } else {
            Decision::Abandon { error }
        }
    }

    /// 写回更新后的簿记状态；负载blob原样保留
    async fn persist_state(&self, ctx: &FireContext, state: &PersistedJobState) {
        let state_blob = match self.codec.encode_state(state) {
            Ok(blob) => blob,
            Err(e) => {
                error!("任务 {} 的状态重编码失败: {e}", ctx.job_key);
                return;
            }
        };
        let data = JobData {
            state_blob,
            payload_blob: ctx.data.payload_blob.clone(),
        };
        if let Err(e) = self.store.put_job_data(&ctx.job_key, data).await {
            error!("任务 {} 的状态写回失败: {e}", ctx.job_key);
        }
    }

    async fn remove_trigger(&self, ctx: &FireContext) {
        if let Err(e) = self.store.delete_job(&ctx.job_key).await {
            error!("删除任务 {} 的触发器失败: {e}", ctx.job_key);
        }
    }

    async fn apply_decision(&self, ctx: &FireContext, decision: Decision) -> FireDisposition {
        match decision {
            Decision::Succeeded => {
                debug!("任务 {} 回调投递成功", ctx.job_key);
                FireDisposition::Completed
            }
            Decision::Retry {
                attempt,
                failed_at,
                error,
            } => {
                let fire_at = failed_at + self.policy.delay;
                match self.store.reschedule_retry(&ctx.job_key, fire_at).await {
                    Ok(()) => {
                        warn!(
                            "任务 {} 回调失败（{error}），第 {attempt} 次重试安排在 {fire_at}",
                            ctx.job_key
                        );
                        FireDisposition::RetryScheduled
                    }
                    Err(reschedule_err) => {
                        // 改期失败时收敛到放弃，避免留下状态不明的触发器
                        error!(
                            "任务 {} 重试改期失败（{reschedule_err}），放弃任务",
                            ctx.job_key
                        );
                        self.remove_trigger(ctx).await;
                        FireDisposition::Abandoned
                    }
                }
            }
            Decision::Abandon { error } => {
                error!("任务 {} 因不可恢复的失败被放弃: {error}", ctx.job_key);
                self.remove_trigger(ctx).await;
                FireDisposition::Abandoned
            }
        }
    }
}

#[async_trait]
impl JobHandler for CallbackJobExecutor {
    async fn execute(&self, ctx: FireContext) -> FireDisposition {
        debug!("任务 {} 开始触发", ctx.job_key);

        let mut state = match self.codec.decode_state(&ctx.data) {
            Ok(state) => state,
            Err(e) => {
                // 作业自己的簿记都读不出来，没有可恢复的余地
                error!("任务 {} 的内部状态无法解码，取消该任务: {e}", ctx.job_key);
                self.remove_trigger(&ctx).await;
                return FireDisposition::Abandoned;
            }
        };

        state.retry.executions += 1;
        state.retry.last_fire_time = Some(ctx.fire_time);

        let outcome = match self.codec.decode_payload(&ctx.data) {
            Ok(payload) => self.dispatcher.dispatch(&state, &payload).await,
            Err(e) => Err(e),
        };

        let decision = match outcome {
            Ok(()) => {
                state.retry.notification_attempt = 0;
                Decision::Succeeded
            }
            Err(e) => self.classify_failure(&mut state, e),
        };

        // 无论成败每次触发都落盘一次，且先于删除触发器
        self.persist_state(&ctx, &state).await;

        self.apply_decision(&ctx, decision).await
    }
}
