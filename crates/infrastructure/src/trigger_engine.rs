use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use cbsched_core::traits::{
    FireContext, FireDisposition, JobData, JobHandler, JobKey, JobSpec, StoredJob, TriggerSpec,
    TriggerStore,
};
use cbsched_core::{Result, SchedulerError};

/// 内存触发器存储
///
/// 提供至少一次触发语义的进程内调度引擎存储：原子创建、重试改期、
/// 删除，以及按命名空间的作业列表。引擎通过in-flight集合保证
/// 同一作业不会有两次触发并发执行。
pub struct InMemoryTriggerStore {
    jobs: RwLock<HashMap<JobKey, JobEntry>>,
    in_flight: RwLock<HashSet<JobKey>>,
}

struct JobEntry {
    data: JobData,
    start_at: DateTime<Utc>,
    cron: Option<CronTrigger>,
    next_fire_at: DateTime<Utc>,
}

struct CronTrigger {
    expr: String,
    schedule: Schedule,
}

impl InMemoryTriggerStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            in_flight: RwLock::new(HashSet::new()),
        }
    }

    /// 挑出到期且不在途的作业并标记在途
    ///
    /// 标记与挑选在同一个锁段内完成，保证单飞。
    async fn claim_due(&self, now: DateTime<Utc>) -> Vec<FireContext> {
        let jobs = self.jobs.read().await;
        let mut in_flight = self.in_flight.write().await;

        let mut due = Vec::new();
        for (job_key, entry) in jobs.iter() {
            if entry.next_fire_at <= now && !in_flight.contains(job_key) {
                in_flight.insert(job_key.clone());
                due.push(FireContext {
                    job_key: job_key.clone(),
                    data: entry.data.clone(),
                    fire_time: now,
                });
            }
        }
        due
    }

    /// 按触发处理结果推进触发器，并解除在途标记
    async fn complete_fire(&self, job_key: &JobKey, disposition: FireDisposition) {
        match disposition {
            FireDisposition::Completed => {
                enum Advance {
                    /// 作业在触发期间被删除
                    Missing,
                    /// 一次性任务或CRON已走完，移除作业
                    Remove,
                    /// 推进到下一个CRON槽位
                    Next(DateTime<Utc>),
                }

                let mut jobs = self.jobs.write().await;

                // 重试窗口内错过的CRON槽位被消费掉，不补触发
                let advance = match jobs.get(job_key) {
                    None => Advance::Missing,
                    Some(entry) => match &entry.cron {
                        None => Advance::Remove,
                        Some(cron) => match cron.schedule.after(&Utc::now()).next() {
                            Some(next) => Advance::Next(next),
                            None => {
                                warn!("任务 {} 的CRON没有后续触发时刻", job_key);
                                Advance::Remove
                            }
                        },
                    },
                };

                match advance {
                    Advance::Missing => {}
                    Advance::Remove => {
                        debug!("任务 {} 完成并移除", job_key);
                        jobs.remove(job_key);
                    }
                    Advance::Next(next) => {
                        debug!("任务 {} 的下次CRON触发: {}", job_key, next);
                        if let Some(entry) = jobs.get_mut(job_key) {
                            entry.next_fire_at = next;
                        }
                    }
                }
            }
            // 重试改期由处理器完成，放弃时触发器已被处理器删除
            FireDisposition::RetryScheduled | FireDisposition::Abandoned => {}
        }

        self.in_flight.write().await.remove(job_key);
    }

    fn build_entry(spec: &JobSpec) -> Result<JobEntry> {
        let cron = match spec.trigger.cron.as_deref() {
            Some(expr) => {
                let schedule =
                    Schedule::from_str(expr).map_err(|e| SchedulerError::InvalidCron {
                        expr: expr.to_string(),
                        message: e.to_string(),
                    })?;
                Some(CronTrigger {
                    expr: expr.to_string(),
                    schedule,
                })
            }
            None => None,
        };

        // 周期性任务以start_at为起点，首次触发是其后的第一个CRON槽位
        let next_fire_at = match &cron {
            Some(trigger) => trigger
                .schedule
                .after(&spec.trigger.start_at)
                .next()
                .ok_or_else(|| SchedulerError::InvalidCron {
                    expr: trigger.expr.clone(),
                    message: "表达式没有未来的触发时刻".to_string(),
                })?,
            None => spec.trigger.start_at,
        };

        Ok(JobEntry {
            data: spec.data.clone(),
            start_at: spec.trigger.start_at,
            cron,
            next_fire_at,
        })
    }

    fn stored_job(job_key: &JobKey, entry: &JobEntry) -> StoredJob {
        StoredJob {
            job_key: job_key.clone(),
            data: entry.data.clone(),
            trigger: TriggerSpec {
                start_at: entry.start_at,
                cron: entry.cron.as_ref().map(|c| c.expr.clone()),
            },
        }
    }
}

impl Default for InMemoryTriggerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn schedule_job(&self, spec: JobSpec) -> Result<()> {
        let entry = Self::build_entry(&spec)?;

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&spec.job_key) {
            return Err(SchedulerError::DuplicateTask {
                key: spec.job_key.key.clone(),
                id: spec.job_key.id.clone(),
            });
        }

        debug!(
            "作业 {} 已创建，下次触发 {}",
            spec.job_key, entry.next_fire_at
        );
        jobs.insert(spec.job_key, entry);
        Ok(())
    }

    async fn reschedule_retry(&self, job_key: &JobKey, fire_at: DateTime<Utc>) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(job_key).ok_or_else(|| {
            SchedulerError::TriggerStore(format!("作业 {job_key} 不存在，无法改期"))
        })?;

        entry.next_fire_at = fire_at;
        debug!("作业 {} 改期为 {} 单次触发", job_key, fire_at);
        Ok(())
    }

    async fn delete_job(&self, job_key: &JobKey) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        Ok(jobs.remove(job_key).is_some())
    }

    async fn get_job(&self, job_key: &JobKey) -> Result<Option<StoredJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(job_key)
            .map(|entry| Self::stored_job(job_key, entry)))
    }

    async fn list_jobs(&self, key: &str) -> Result<Vec<StoredJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .filter(|(job_key, _)| job_key.key == key)
            .map(|(job_key, entry)| Self::stored_job(job_key, entry))
            .collect())
    }

    async fn put_job_data(&self, job_key: &JobKey, data: JobData) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(job_key).ok_or_else(|| {
            SchedulerError::TriggerStore(format!("作业 {job_key} 不存在，无法写回数据"))
        })?;

        entry.data = data;
        Ok(())
    }
}

/// 触发引擎
///
/// 周期扫描到期触发器，把触发分派到有界工作池，触发结束后
/// 按处理结果推进触发器。收到关闭信号后停止扫描并等待在途
/// 触发全部完成。
pub struct TriggerEngine {
    store: Arc<InMemoryTriggerStore>,
    handler: Arc<dyn JobHandler>,
    poll_interval: Duration,
    fire_permits: Arc<Semaphore>,
    max_concurrent_fires: usize,
}

impl TriggerEngine {
    pub fn new(
        store: Arc<InMemoryTriggerStore>,
        handler: Arc<dyn JobHandler>,
        poll_interval: Duration,
        max_concurrent_fires: usize,
    ) -> Self {
        Self {
            store,
            handler,
            poll_interval,
            fire_permits: Arc::new(Semaphore::new(max_concurrent_fires)),
            max_concurrent_fires,
        }
    }

    /// 运行触发循环直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "触发引擎启动，扫描间隔 {:?}，并发上限 {}",
            self.poll_interval, self.max_concurrent_fires
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("触发引擎收到关闭信号，停止扫描");
                    break;
                }
                _ = ticker.tick() => {
                    self.fire_due_jobs().await;
                }
            }
        }

        // 等待在途触发全部归还许可
        if self
            .fire_permits
            .acquire_many(self.max_concurrent_fires as u32)
            .await
            .is_ok()
        {
            info!("触发引擎已退出");
        }
    }

    async fn fire_due_jobs(&self) {
        let due = self.store.claim_due(Utc::now()).await;

        for ctx in due {
            let permit = match Arc::clone(&self.fire_permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("触发工作池已关闭，丢弃本轮触发");
                    return;
                }
            };

            let store = Arc::clone(&self.store);
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let job_key = ctx.job_key.clone();
                let disposition = handler.execute(ctx).await;
                store.complete_fire(&job_key, disposition).await;
                drop(permit);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn job_spec(id: &str, key: &str, start_at: DateTime<Utc>, cron: Option<&str>) -> JobSpec {
        JobSpec {
            job_key: JobKey::new(id, key),
            data: JobData {
                state_blob: "{}".to_string(),
                payload_blob: "e30=".to_string(),
            },
            trigger: TriggerSpec {
                start_at,
                cron: cron.map(str::to_string),
            },
        }
    }

    #[tokio::test]
    async fn test_schedule_rejects_duplicate_atomically() {
        let store = InMemoryTriggerStore::new();
        let now = Utc::now();

        store.schedule_job(job_spec("a", "ns", now, None)).await.unwrap();
        let err = store
            .schedule_job(job_spec("a", "ns", now, None))
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::DuplicateTask { .. }));
    }

    #[tokio::test]
    async fn test_invalid_cron_rejected_at_creation() {
        let store = InMemoryTriggerStore::new();
        let err = store
            .schedule_job(job_spec("a", "ns", Utc::now(), Some("bogus")))
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryTriggerStore::new();
        store
            .schedule_job(job_spec("a", "ns", Utc::now(), None))
            .await
            .unwrap();

        assert!(store.delete_job(&JobKey::new("a", "ns")).await.unwrap());
        assert!(!store.delete_job(&JobKey::new("a", "ns")).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_due_marks_in_flight() {
        let store = InMemoryTriggerStore::new();
        let past = Utc::now() - ChronoDuration::seconds(1);
        store.schedule_job(job_spec("a", "ns", past, None)).await.unwrap();

        let first = store.claim_due(Utc::now()).await;
        assert_eq!(first.len(), 1);

        // 在途期间同一作业不会被再次挑中
        let second = store.claim_due(Utc::now()).await;
        assert!(second.is_empty());

        store
            .complete_fire(&JobKey::new("a", "ns"), FireDisposition::RetryScheduled)
            .await;
        let third = store.claim_due(Utc::now()).await;
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn test_one_shot_removed_after_completion() {
        let store = InMemoryTriggerStore::new();
        let past = Utc::now() - ChronoDuration::seconds(1);
        store.schedule_job(job_spec("a", "ns", past, None)).await.unwrap();

        let claimed = store.claim_due(Utc::now()).await;
        assert_eq!(claimed.len(), 1);
        store
            .complete_fire(&JobKey::new("a", "ns"), FireDisposition::Completed)
            .await;

        assert!(store.get_job(&JobKey::new("a", "ns")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cron_advances_to_slot_after_completion() {
        let store = InMemoryTriggerStore::new();
        let past = Utc::now() - ChronoDuration::seconds(2);
        store
            .schedule_job(job_spec("a", "ns", past, Some("* * * * * *")))
            .await
            .unwrap();

        let claimed = store.claim_due(Utc::now()).await;
        assert_eq!(claimed.len(), 1);

        let completed_at = Utc::now();
        store
            .complete_fire(&JobKey::new("a", "ns"), FireDisposition::Completed)
            .await;

        let job = store
            .get_job(&JobKey::new("a", "ns"))
            .await
            .unwrap()
            .expect("CRON作业完成后应保留");
        assert_eq!(job.trigger.cron.as_deref(), Some("* * * * * *"));

        // 下一次触发严格在完成时刻之后
        let jobs = store.jobs.read().await;
        let entry = jobs.get(&JobKey::new("a", "ns")).unwrap();
        assert!(entry.next_fire_at > completed_at);
    }

    #[tokio::test]
    async fn test_retry_override_preserves_cron() {
        let store = InMemoryTriggerStore::new();
        let past = Utc::now() - ChronoDuration::seconds(2);
        store
            .schedule_job(job_spec("a", "ns", past, Some("0 0 3 * * *")))
            .await
            .unwrap();

        let retry_at = Utc::now() + ChronoDuration::milliseconds(200);
        store
            .reschedule_retry(&JobKey::new("a", "ns"), retry_at)
            .await
            .unwrap();

        {
            let jobs = store.jobs.read().await;
            let entry = jobs.get(&JobKey::new("a", "ns")).unwrap();
            assert_eq!(entry.next_fire_at, retry_at);
            assert!(entry.cron.is_some());
        }

        // 重试触发成功后恢复CRON节奏：下一个槽位在当前时刻之后
        let claimed = store.claim_due(retry_at + ChronoDuration::seconds(1)).await;
        assert_eq!(claimed.len(), 1);
        store
            .complete_fire(&JobKey::new("a", "ns"), FireDisposition::Completed)
            .await;

        let jobs = store.jobs.read().await;
        let entry = jobs.get(&JobKey::new("a", "ns")).unwrap();
        assert!(entry.next_fire_at > Utc::now());
        assert_eq!(entry.next_fire_at.format("%H:%M:%S").to_string(), "03:00:00");
    }

    #[tokio::test]
    async fn test_reschedule_missing_job_fails() {
        let store = InMemoryTriggerStore::new();
        let err = store
            .reschedule_retry(&JobKey::new("ghost", "ns"), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::TriggerStore(_)));
    }
}
