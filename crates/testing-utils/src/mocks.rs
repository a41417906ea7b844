//! Mock implementations for the scheduler trait seams
//!
//! This module provides in-memory mock implementations that can be used
//! for unit testing without requiring a running trigger engine, an AMQP
//! broker or real HTTP endpoints.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cbsched_core::errors::{Result, SchedulerError};
use cbsched_core::models::PersistedJobState;
use cbsched_core::traits::{
    CallbackDispatch, JobData, JobKey, JobSpec, QueuePublisher, StoredJob, TriggerStore,
};

/// Mock implementation of TriggerStore for testing
///
/// Keeps jobs in a plain map and records every reschedule/delete call so
/// tests can assert on the executor's interactions with the store.
#[derive(Clone, Default)]
pub struct MockTriggerStore {
    jobs: Arc<Mutex<HashMap<JobKey, StoredJob>>>,
    reschedules: Arc<Mutex<Vec<(JobKey, DateTime<Utc>)>>>,
    deletes: Arc<Mutex<Vec<JobKey>>>,
    last_persisted: Arc<Mutex<HashMap<JobKey, JobData>>>,
    fail_reschedule: Arc<Mutex<bool>>,
}

impl MockTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent reschedule_retry call fail with a store error.
    pub fn fail_next_reschedules(&self) {
        *self.fail_reschedule.lock().unwrap() = true;
    }

    /// Recorded `(job_key, fire_at)` pairs, in call order.
    pub fn reschedules(&self) -> Vec<(JobKey, DateTime<Utc>)> {
        self.reschedules.lock().unwrap().clone()
    }

    /// Recorded deleted job keys, in call order.
    pub fn deletes(&self) -> Vec<JobKey> {
        self.deletes.lock().unwrap().clone()
    }

    /// Current data blob of a job, as last persisted.
    pub fn job_data(&self, job_key: &JobKey) -> Option<JobData> {
        self.jobs
            .lock()
            .unwrap()
            .get(job_key)
            .map(|job| job.data.clone())
    }

    pub fn contains(&self, job_key: &JobKey) -> bool {
        self.jobs.lock().unwrap().contains_key(job_key)
    }

    /// Last data blob written through put_job_data, retained even after
    /// the job was deleted (the executor persists before deleting).
    pub fn last_persisted(&self, job_key: &JobKey) -> Option<JobData> {
        self.last_persisted.lock().unwrap().get(job_key).cloned()
    }
}

#[async_trait]
impl TriggerStore for MockTriggerStore {
    async fn schedule_job(&self, spec: JobSpec) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&spec.job_key) {
            return Err(SchedulerError::DuplicateTask {
                key: spec.job_key.key.clone(),
                id: spec.job_key.id.clone(),
            });
        }
        jobs.insert(
            spec.job_key.clone(),
            StoredJob {
                job_key: spec.job_key,
                data: spec.data,
                trigger: spec.trigger,
            },
        );
        Ok(())
    }

    async fn reschedule_retry(&self, job_key: &JobKey, fire_at: DateTime<Utc>) -> Result<()> {
        if *self.fail_reschedule.lock().unwrap() {
            return Err(SchedulerError::TriggerStore(
                "simulated reschedule failure".to_string(),
            ));
        }
        self.reschedules
            .lock()
            .unwrap()
            .push((job_key.clone(), fire_at));
        Ok(())
    }

    async fn delete_job(&self, job_key: &JobKey) -> Result<bool> {
        self.deletes.lock().unwrap().push(job_key.clone());
        Ok(self.jobs.lock().unwrap().remove(job_key).is_some())
    }

    async fn get_job(&self, job_key: &JobKey) -> Result<Option<StoredJob>> {
        Ok(self.jobs.lock().unwrap().get(job_key).cloned())
    }

    async fn list_jobs(&self, key: &str) -> Result<Vec<StoredJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.job_key.key == key)
            .cloned()
            .collect())
    }

    async fn put_job_data(&self, job_key: &JobKey, data: JobData) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(job_key).ok_or_else(|| {
            SchedulerError::TriggerStore(format!("job {job_key} not found"))
        })?;
        job.data = data.clone();
        self.last_persisted
            .lock()
            .unwrap()
            .insert(job_key.clone(), data);
        Ok(())
    }
}

/// Mock implementation of QueuePublisher for testing
///
/// Records published messages and optionally serves scripted failures
/// (popped in order) before succeeding.
#[derive(Clone, Default)]
pub struct MockQueuePublisher {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    scripted_failures: Arc<Mutex<VecDeque<SchedulerError>>>,
}

impl MockQueuePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error to be returned by the next publish call.
    pub fn push_failure(&self, error: SchedulerError) {
        self.scripted_failures.lock().unwrap().push_back(error);
    }

    /// All successfully published `(routing_key, body)` pairs.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueuePublisher for MockQueuePublisher {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<()> {
        if let Some(error) = self.scripted_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.published
            .lock()
            .unwrap()
            .push((routing_key.to_string(), body.to_vec()));
        Ok(())
    }
}

/// Scripted implementation of CallbackDispatch for executor tests
///
/// Pops one scripted outcome per dispatch call; once the script is
/// exhausted every further call succeeds. Dispatched states are recorded
/// for assertions on counters and message contents.
#[derive(Clone, Default)]
pub struct ScriptedCallbackDispatch {
    script: Arc<Mutex<VecDeque<Result<()>>>>,
    dispatched: Arc<Mutex<Vec<(PersistedJobState, serde_json::Value)>>>,
}

impl ScriptedCallbackDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_outcome(&self, outcome: Result<()>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Convenience: script `n` recoverable failures in a row.
    pub fn push_recoverable_failures(&self, n: usize) {
        for _ in 0..n {
            self.push_outcome(Err(SchedulerError::RemoteUnreachable(
                "simulated transport failure".to_string(),
            )));
        }
    }

    pub fn dispatched(&self) -> Vec<(PersistedJobState, serde_json::Value)> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }
}

#[async_trait]
impl CallbackDispatch for ScriptedCallbackDispatch {
    async fn dispatch(
        &self,
        state: &PersistedJobState,
        payload: &serde_json::Value,
    ) -> Result<()> {
        self.dispatched
            .lock()
            .unwrap()
            .push((state.clone(), payload.clone()));
        match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(()),
        }
    }
}
