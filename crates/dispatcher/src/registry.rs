use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tracing::{debug, info};
use url::Url;

use cbsched_core::models::{CallbackTransport, Endpoint, RetryMetadata, Task};
use cbsched_core::traits::{JobKey, JobSpec, StoredJob, TriggerSpec, TriggerStore};
use cbsched_core::{Result, SchedulerError};

use crate::codec::JobDataCodec;

/// 任务注册表
///
/// 对外的调度API：创建、查询、删除任务。校验触发时间、唯一性、
/// CRON表达式与回调URL，然后把触发器和作业原子提交到触发器存储。
/// 查询操作总是从持久化的触发器与作业数据现场重建，从不缓存。
pub struct TaskRegistry {
    store: Arc<dyn TriggerStore>,
    codec: JobDataCodec,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn TriggerStore>) -> Self {
        Self {
            store,
            codec: JobDataCodec::new(),
        }
    }

    /// 注册一个新任务
    pub async fn schedule_task(&self, task: &Task, endpoint: &Endpoint) -> Result<()> {
        validate_task_id(&task.id)?;
        validate_task_key(&task.key)?;

        if task.trigger_time < Utc::now() {
            return Err(SchedulerError::PastTriggerTime(task.trigger_time));
        }

        if let Some(expr) = task.cron_expression.as_deref() {
            validate_cron_expression(expr)?;
        }

        if endpoint.transport == CallbackTransport::Http {
            validate_callback_url(endpoint.target.as_deref())?;
        }

        let job_key = JobKey::new(&task.id, &task.key);
        if self.store.get_job(&job_key).await?.is_some() {
            return Err(SchedulerError::DuplicateTask {
                key: task.key.clone(),
                id: task.id.clone(),
            });
        }

        let data = self.codec.encode(task, endpoint)?;
        let spec = JobSpec {
            job_key: job_key.clone(),
            data,
            trigger: TriggerSpec {
                start_at: task.trigger_time,
                cron: task.cron_expression.clone(),
            },
        };

        // 存储内部再次原子地拒绝重复，防止校验与提交之间的竞争
        self.store.schedule_job(spec).await?;

        info!(
            "任务 {} 已注册，首次触发 {}，cron={:?}",
            job_key, task.trigger_time, task.cron_expression
        );
        Ok(())
    }

    /// 按复合标识删除任务；任务不存在不算错误
    pub async fn delete_task(&self, key: &str, id: &str) -> Result<()> {
        let job_key = JobKey::new(id, key);
        let existed = self.store.delete_job(&job_key).await?;
        debug!("删除任务 {}，删除前存在: {}", job_key, existed);
        Ok(())
    }

    /// 列出命名空间下所有存活任务
    pub async fn get_tasks_for_key(&self, key: &str) -> Result<Vec<Task>> {
        let jobs = self.store.list_jobs(key).await?;
        jobs.iter().map(|job| self.rebuild_task(job)).collect()
    }

    /// 读取单个任务，不存在时返回 `None`
    pub async fn get_task(&self, key: &str, id: &str) -> Result<Option<Task>> {
        let job_key = JobKey::new(id, key);
        match self.store.get_job(&job_key).await? {
            Some(job) => Ok(Some(self.rebuild_task(&job)?)),
            None => Ok(None),
        }
    }

    /// 读取任务的重试簿记，用于观测
    pub async fn get_task_metadata(&self, key: &str, id: &str) -> Result<Option<RetryMetadata>> {
        let job_key = JobKey::new(id, key);
        match self.store.get_job(&job_key).await? {
            Some(job) => {
                let state = self.codec.decode_state(&job.data)?;
                Ok(Some(state.retry))
            }
            None => Ok(None),
        }
    }

    fn rebuild_task(&self, job: &StoredJob) -> Result<Task> {
        let state = self.codec.decode_state(&job.data)?;
        let payload = self.codec.decode_payload(&job.data)?;
        Ok(Task {
            id: state.task_id,
            key: state.key,
            trigger_time: job.trigger.start_at,
            cron_expression: job.trigger.cron.clone(),
            payload,
        })
    }
}

/// 校验任务标识：仅允许字母、数字和连字符
pub fn validate_task_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(SchedulerError::InvalidTaskParams(
            "任务标识不能为空".to_string(),
        ));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(SchedulerError::InvalidTaskParams(format!(
            "任务标识只能包含字母、数字和连字符: {id}"
        )));
    }
    Ok(())
}

/// 校验命名空间key：仅允许字母、数字、连字符和点
pub fn validate_task_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SchedulerError::InvalidTaskParams(
            "任务key不能为空".to_string(),
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(SchedulerError::InvalidTaskParams(format!(
            "任务key只能包含字母、数字、连字符和点: {key}"
        )));
    }
    Ok(())
}

/// 校验CRON表达式是否有效
pub fn validate_cron_expression(expr: &str) -> Result<()> {
    Schedule::from_str(expr).map_err(|e| SchedulerError::InvalidCron {
        expr: expr.to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}

/// 校验HTTP回调URL：必须是绝对的http/https地址
pub fn validate_callback_url(target: Option<&str>) -> Result<()> {
    let raw = target.filter(|t| !t.is_empty()).ok_or_else(|| {
        SchedulerError::InvalidCallbackUrl("HTTP回调必须提供URL".to_string())
    })?;

    let url = Url::parse(raw)
        .map_err(|e| SchedulerError::InvalidCallbackUrl(format!("{raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SchedulerError::InvalidCallbackUrl(format!(
            "不支持的URL scheme: {other}"
        ))),
    }
}
