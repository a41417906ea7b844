use std::sync::Arc;

use chrono::{Duration, Utc};

use cbsched_core::traits::{FireContext, FireDisposition, JobHandler, JobKey, TriggerStore};
use cbsched_core::{ErrorClassRegistry, SchedulerError};
use cbsched_dispatcher::{CallbackJobExecutor, JobDataCodec, RetryPolicy};
use cbsched_testing_utils::{EndpointBuilder, MockTriggerStore, ScriptedCallbackDispatch, TaskBuilder};

struct Harness {
    store: Arc<MockTriggerStore>,
    dispatch: Arc<ScriptedCallbackDispatch>,
    executor: CallbackJobExecutor,
    job_key: JobKey,
}

/// 搭建一个已注册好单个任务的执行器测试环境
async fn harness(max_attempts: u32, delay_ms: i64) -> Harness {
    let store = Arc::new(MockTriggerStore::new());
    let dispatch = Arc::new(ScriptedCallbackDispatch::new());
    let codec = JobDataCodec::new();

    let task = TaskBuilder::new().with_id("task-1").with_key("ns").build();
    let endpoint = EndpointBuilder::queue().build();
    let data = codec.encode(&task, &endpoint).unwrap();
    let job_key = JobKey::new("task-1", "ns");

    store
        .schedule_job(cbsched_core::traits::JobSpec {
            job_key: job_key.clone(),
            data,
            trigger: cbsched_core::traits::TriggerSpec {
                start_at: task.trigger_time,
                cron: None,
            },
        })
        .await
        .unwrap();

    let executor = CallbackJobExecutor::new(
        codec,
        Arc::clone(&dispatch) as Arc<dyn cbsched_core::traits::CallbackDispatch>,
        Arc::new(ErrorClassRegistry::standard()),
        Arc::clone(&store) as Arc<dyn TriggerStore>,
        RetryPolicy {
            max_attempts,
            delay: Duration::milliseconds(delay_ms),
        },
    );

    Harness {
        store,
        dispatch,
        executor,
        job_key,
    }
}

impl Harness {
    /// 模拟引擎的一次触发：取当前持久化数据，交给执行器
    async fn fire(&self) -> FireDisposition {
        let data = self
            .store
            .job_data(&self.job_key)
            .expect("任务应当仍在存储中");
        self.executor
            .execute(FireContext {
                job_key: self.job_key.clone(),
                data,
                fire_time: Utc::now(),
            })
            .await
    }

    fn metadata(&self) -> cbsched_core::models::RetryMetadata {
        let data = self.store.job_data(&self.job_key).unwrap();
        JobDataCodec::new().decode_state(&data).unwrap().retry
    }
}

#[tokio::test]
async fn test_retry_bound_exhaustion() {
    // maxRetryAttempts=3：1次原始触发 + 3次重试，第4次触发后放弃
    let h = harness(3, 50).await;
    h.dispatch.push_recoverable_failures(10);

    assert_eq!(h.fire().await, FireDisposition::RetryScheduled);
    assert_eq!(h.fire().await, FireDisposition::RetryScheduled);
    assert_eq!(h.fire().await, FireDisposition::RetryScheduled);

    // 放弃前先读出状态：删除触发器之前已经持久化
    assert_eq!(h.fire().await, FireDisposition::Abandoned);

    assert_eq!(h.dispatch.dispatch_count(), 4);
    assert_eq!(h.store.reschedules().len(), 3);
    assert_eq!(h.store.deletes(), vec![h.job_key.clone()]);
}

#[tokio::test]
async fn test_retry_counters_at_abandonment() {
    let h = harness(3, 50).await;
    h.dispatch.push_recoverable_failures(10);

    for _ in 0..3 {
        h.fire().await;
    }
    // 第4次触发放弃任务；放弃路径同样先持久化再删除
    assert_eq!(h.fire().await, FireDisposition::Abandoned);

    let data = h
        .store
        .last_persisted(&h.job_key)
        .expect("放弃前应当已写回状态");
    let retry = JobDataCodec::new().decode_state(&data).unwrap().retry;
    assert_eq!(retry.executions, 4);
    assert_eq!(retry.failures, 4);
    assert_eq!(retry.notification_attempt, 3);
    assert!(retry.last_failure_time.is_some());
}

#[tokio::test]
async fn test_success_resets_streak() {
    let h = harness(5, 50).await;
    h.dispatch.push_recoverable_failures(2);

    assert_eq!(h.fire().await, FireDisposition::RetryScheduled);
    assert_eq!(h.fire().await, FireDisposition::RetryScheduled);
    assert_eq!(h.fire().await, FireDisposition::Completed);

    let retry = h.metadata();
    assert_eq!(retry.notification_attempt, 0);
    assert_eq!(retry.executions, 3);
    assert_eq!(retry.failures, 2);
    assert!(retry.last_fire_time.is_some());

    // 成功路径不会删除触发器
    assert!(h.store.deletes().is_empty());
    assert!(h.store.contains(&h.job_key));
}

#[tokio::test]
async fn test_fatal_error_short_circuits_retries() {
    let h = harness(5, 50).await;
    h.dispatch.push_outcome(Err(SchedulerError::CallbackRejected(
        "HTTP 404".to_string(),
    )));

    assert_eq!(h.fire().await, FireDisposition::Abandoned);

    assert_eq!(h.dispatch.dispatch_count(), 1);
    assert!(h.store.reschedules().is_empty());
    assert_eq!(h.store.deletes(), vec![h.job_key.clone()]);
}

#[tokio::test]
async fn test_fixed_delay_relative_to_failure() {
    // 重试时刻 = 本次失败时刻 + 固定延迟，而不是 延迟*次数
    let delay_ms = 5000;
    let h = harness(5, delay_ms).await;
    h.dispatch.push_recoverable_failures(3);

    for expected_attempt in 1..=3u32 {
        let before = Utc::now();
        assert_eq!(h.fire().await, FireDisposition::RetryScheduled);
        let after = Utc::now();

        let (_, fire_at) = h.store.reschedules()[expected_attempt as usize - 1].clone();
        let delay = Duration::milliseconds(delay_ms);
        assert!(fire_at >= before + delay);
        assert!(fire_at <= after + delay);
    }
}

#[tokio::test]
async fn test_corrupt_state_abandons_without_dispatch() {
    let h = harness(5, 50).await;

    // 直接破坏持久化状态
    let mut data = h.store.job_data(&h.job_key).unwrap();
    data.state_blob = "{broken".to_string();
    h.store.put_job_data(&h.job_key, data).await.unwrap();

    assert_eq!(h.fire().await, FireDisposition::Abandoned);

    assert_eq!(h.dispatch.dispatch_count(), 0);
    assert_eq!(h.store.deletes(), vec![h.job_key.clone()]);
}

#[tokio::test]
async fn test_reschedule_failure_fails_closed_to_abandonment() {
    let h = harness(5, 50).await;
    h.dispatch.push_recoverable_failures(1);
    h.store.fail_next_reschedules();

    // 改期失败不能留下状态不明的触发器，收敛到放弃
    assert_eq!(h.fire().await, FireDisposition::Abandoned);
    assert_eq!(h.store.deletes(), vec![h.job_key.clone()]);

    let snapshots = h.dispatch.dispatched();
    assert_eq!(snapshots.len(), 1);
}

#[tokio::test]
async fn test_state_persisted_before_trigger_removal() {
    let h = harness(5, 50).await;
    h.dispatch.push_outcome(Err(SchedulerError::CallbackRejected(
        "HTTP 400".to_string(),
    )));

    assert_eq!(h.fire().await, FireDisposition::Abandoned);

    // put_job_data发生在delete_job之前：作业已不在，但写回成功过
    assert!(!h.store.contains(&h.job_key));
    let data = h.store.last_persisted(&h.job_key).unwrap();
    let retry = JobDataCodec::new().decode_state(&data).unwrap().retry;
    assert_eq!(retry.failures, 1);
    assert_eq!(retry.executions, 1);
}

#[tokio::test]
async fn test_message_attempt_counter_visible_to_callback() {
    let h = harness(5, 50).await;
    h.dispatch.push_recoverable_failures(2);

    h.fire().await;
    h.fire().await;
    h.fire().await;

    let snapshots = h.dispatch.dispatched();
    // 首次触发时连续重试计数为0，之后每次重试递增
    assert_eq!(snapshots[0].0.retry.notification_attempt, 0);
    assert_eq!(snapshots[1].0.retry.notification_attempt, 1);
    assert_eq!(snapshots[2].0.retry.notification_attempt, 2);
}
