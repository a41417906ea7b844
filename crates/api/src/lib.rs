pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use cbsched_dispatcher::TaskRegistry;
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(registry: Arc<TaskRegistry>) -> Router {
    let state = AppState { registry };

    create_routes(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}
