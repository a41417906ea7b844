//! Builders for test data
//!
//! Fluent builders producing valid default tasks and endpoints so tests
//! only spell out the fields they actually care about.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use cbsched_core::models::{CallbackTransport, Endpoint, Task};

/// Builder for [`Task`] test instances
pub struct TaskBuilder {
    id: String,
    key: String,
    trigger_time: DateTime<Utc>,
    cron_expression: Option<String>,
    payload: serde_json::Value,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            id: "task-1".to_string(),
            key: "test-ns".to_string(),
            trigger_time: Utc::now() + Duration::seconds(60),
            cron_expression: None,
            payload: json!({"value": 1}),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn with_trigger_time(mut self, trigger_time: DateTime<Utc>) -> Self {
        self.trigger_time = trigger_time;
        self
    }

    pub fn with_cron(mut self, expr: &str) -> Self {
        self.cron_expression = Some(expr.to_string());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Task {
        Task {
            id: self.id,
            key: self.key,
            trigger_time: self.trigger_time,
            cron_expression: self.cron_expression,
            payload: self.payload,
        }
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Endpoint`] test instances
pub struct EndpointBuilder {
    transport: CallbackTransport,
    target: Option<String>,
}

impl EndpointBuilder {
    pub fn queue() -> Self {
        Self {
            transport: CallbackTransport::Queue,
            target: None,
        }
    }

    pub fn http(url: &str) -> Self {
        Self {
            transport: CallbackTransport::Http,
            target: Some(url.to_string()),
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn build(self) -> Endpoint {
        Endpoint {
            transport: self.transport,
            target: self.target,
        }
    }
}
