use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use cbsched_dispatcher::TaskRegistry;

use crate::handlers::{
    health::health_check,
    schedules::{
        create_schedule, delete_schedule, get_schedule, get_schedule_stats, list_schedules,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 调度管理API
        .route("/api/schedules", post(create_schedule))
        .route("/api/schedules/{key}", get(list_schedules))
        .route(
            "/api/schedules/{key}/{id}",
            get(get_schedule).delete(delete_schedule),
        )
        .route("/api/schedules/{key}/{id}/stats", get(get_schedule_stats))
        .with_state(state)
}
