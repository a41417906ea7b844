use std::collections::HashSet;

use crate::errors::ErrorKind;

/// 可恢复错误注册表
///
/// 进程级只读集合，记录哪些错误种类被视为"可恢复"（值得重试）。
/// 在启动时构建一次，随后注入到重试执行器中，运行期不再变更。
#[derive(Debug, Clone)]
pub struct ErrorClassRegistry {
    recoverable: HashSet<ErrorKind>,
}

impl ErrorClassRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            recoverable: HashSet::new(),
        }
    }

    /// 创建标准注册表
    ///
    /// 目前仅远端不可达（连接失败、超时、5xx等传输层故障）被视为可恢复。
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register_recoverable(ErrorKind::RemoteUnreachable);
        registry
    }

    /// 将一个错误种类登记为可恢复
    pub fn register_recoverable(&mut self, kind: ErrorKind) {
        self.recoverable.insert(kind);
    }

    /// 判断错误种类是否可恢复
    pub fn is_recoverable(&self, kind: ErrorKind) -> bool {
        self.recoverable.contains(&kind)
    }
}

impl Default for ErrorClassRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SchedulerError;

    #[test]
    fn test_standard_registry_marks_remote_unreachable() {
        let registry = ErrorClassRegistry::standard();

        assert!(registry.is_recoverable(ErrorKind::RemoteUnreachable));
        assert!(!registry.is_recoverable(ErrorKind::CallbackRejected));
        assert!(!registry.is_recoverable(ErrorKind::Decode));
        assert!(!registry.is_recoverable(ErrorKind::Serialization));
        assert!(!registry.is_recoverable(ErrorKind::TriggerStore));
    }

    #[test]
    fn test_register_additional_kind() {
        let mut registry = ErrorClassRegistry::standard();
        registry.register_recoverable(ErrorKind::MessageQueue);

        assert!(registry.is_recoverable(ErrorKind::MessageQueue));
        assert!(registry.is_recoverable(ErrorKind::RemoteUnreachable));
    }

    #[test]
    fn test_error_kind_projection() {
        let err = SchedulerError::RemoteUnreachable("connection refused".to_string());
        assert_eq!(err.kind(), ErrorKind::RemoteUnreachable);

        let err = SchedulerError::CallbackRejected("404".to_string());
        assert_eq!(err.kind(), ErrorKind::CallbackRejected);
    }
}
