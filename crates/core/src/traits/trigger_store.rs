use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;

/// 任务的复合标识：`(id, key)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub id: String,
    pub key: String,
}

impl JobKey {
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.key, self.id)
    }
}

/// 随作业持久化的两个独立字符串blob
///
/// `state_blob` 是内部调度簿记的JSON编码，`payload_blob` 是
/// 经过不透明编码（base64）的用户负载。存储层只认字符串。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobData {
    pub state_blob: String,
    pub payload_blob: String,
}

/// 触发规则：一次性起始时刻，外加可选的CRON周期
#[derive(Debug, Clone)]
pub struct TriggerSpec {
    pub start_at: DateTime<Utc>,
    pub cron: Option<String>,
}

/// 创建作业的完整描述，触发器与作业数据一并原子提交
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_key: JobKey,
    pub data: JobData,
    pub trigger: TriggerSpec,
}

/// 存储中的一个存活作业，用于列表与读取重建
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub job_key: JobKey,
    pub data: JobData,
    pub trigger: TriggerSpec,
}

/// 一次触发交给处理器的上下文
#[derive(Debug, Clone)]
pub struct FireContext {
    pub job_key: JobKey,
    pub data: JobData,
    pub fire_time: DateTime<Utc>,
}

/// 触发处理结果，引擎据此决定触发器的后续命运
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDisposition {
    /// 本次触发成功，触发器按原计划继续（CRON推进，一次性移除）
    Completed,
    /// 处理器已安排了一次重试触发，引擎不得再碰该触发器
    RetryScheduled,
    /// 处理器已删除触发器，任务终结
    Abandoned,
}

/// 触发时刻的处理器
///
/// 引擎保证同一 `JobKey` 不会有两次触发并发执行（单飞），
/// 因此处理器可以对作业数据做无锁的读-改-写。
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, ctx: FireContext) -> FireDisposition;
}

/// 触发器存储
///
/// 持久的调度引擎接口：原子创建、重试改期、删除，以及
/// 供注册表读取重建用的查询操作。实现必须保证 `schedule_job`
/// 对重复 `(id, key)` 的拒绝与创建在同一个原子步骤内完成。
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// 原子创建触发器与作业；`(id, key)` 已存在时返回 `DuplicateTask`
    async fn schedule_job(&self, spec: JobSpec) -> Result<()>;

    /// 把触发器改期为在 `fire_at` 单次触发，保留原有的周期类型
    async fn reschedule_retry(&self, job_key: &JobKey, fire_at: DateTime<Utc>) -> Result<()>;

    /// 删除作业及其触发器；幂等，返回删除前是否存在
    async fn delete_job(&self, job_key: &JobKey) -> Result<bool>;

    /// 读取单个作业，不存在时返回 `None`
    async fn get_job(&self, job_key: &JobKey) -> Result<Option<StoredJob>>;

    /// 列出命名空间下的所有存活作业
    async fn list_jobs(&self, key: &str) -> Result<Vec<StoredJob>>;

    /// 写回作业数据（重试簿记更新后调用）
    async fn put_job_data(&self, job_key: &JobKey, data: JobData) -> Result<()>;
}
