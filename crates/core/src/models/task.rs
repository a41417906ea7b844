use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 任务定义
///
/// 表示客户端注册的一次回调调度请求。`(id, key)` 在所有存活任务中全局唯一。
///
/// - `id`: 任务标识，仅允许 `[A-Za-z0-9-]`
/// - `key`: 命名空间，仅允许 `[A-Za-z0-9-.]`
/// - `trigger_time`: 首次（或唯一一次）触发的UTC时刻
/// - `cron_expression`: 可选的周期性CRON表达式（6-7字段）
/// - `payload`: 对调度器不透明的JSON负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub key: String,
    pub trigger_time: DateTime<Utc>,
    pub cron_expression: Option<String>,
    pub payload: serde_json::Value,
}

impl Task {
    /// 创建一次性任务
    pub fn new(
        id: impl Into<String>,
        key: impl Into<String>,
        trigger_time: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            trigger_time,
            cron_expression: None,
            payload,
        }
    }

    /// 检查任务是否为周期性任务
    pub fn is_recurring(&self) -> bool {
        self.cron_expression.is_some()
    }
}

/// 回调传输方式
///
/// 封闭的和类型：当前只有消息队列发布与HTTP POST两种传输，
/// 新传输方式属于显式、少见的扩展。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallbackTransport {
    #[serde(rename = "QUEUE")]
    Queue,
    #[serde(rename = "HTTP")]
    Http,
}

/// 回调端点
///
/// 创建任务时附着，之后不可变更。
/// QUEUE传输的 `target` 为路由键，缺省时回退到任务的 `key`；
/// HTTP传输的 `target` 必须是绝对的 http/https URL。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub transport: CallbackTransport,
    pub target: Option<String>,
}

impl Endpoint {
    pub fn queue(target: Option<String>) -> Self {
        Self {
            transport: CallbackTransport::Queue,
            target,
        }
    }

    pub fn http(target: impl Into<String>) -> Self {
        Self {
            transport: CallbackTransport::Http,
            target: Some(target.into()),
        }
    }

    /// 解析实际的路由键：显式target优先，否则使用任务key
    pub fn routing_key<'a>(&'a self, key: &'a str) -> &'a str {
        match self.target.as_deref() {
            Some(target) if !target.is_empty() => target,
            _ => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_wire_names() {
        let json = serde_json::to_string(&CallbackTransport::Queue).unwrap();
        assert_eq!(json, "\"QUEUE\"");
        let json = serde_json::to_string(&CallbackTransport::Http).unwrap();
        assert_eq!(json, "\"HTTP\"");
    }

    #[test]
    fn test_routing_key_fallback() {
        let endpoint = Endpoint::queue(None);
        assert_eq!(endpoint.routing_key("orders"), "orders");

        let endpoint = Endpoint::queue(Some("billing.events".to_string()));
        assert_eq!(endpoint.routing_key("orders"), "billing.events");

        let endpoint = Endpoint::queue(Some(String::new()));
        assert_eq!(endpoint.routing_key("orders"), "orders");
    }
}
