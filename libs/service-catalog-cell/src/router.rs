use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn catalog_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/", get(handlers::list_active_services))
        .route("/search", get(handlers::search_services))
        .route("/category/{category}", get(handlers::list_services_by_category))
        .route("/doctor/{doctor_id}", get(handlers::list_services_by_doctor))
        .route("/{service_id}", get(handlers::get_service));

    let admin_routes = Router::new()
        .route("/", post(handlers::create_service))
        .route("/stats", get(handlers::service_statistics))
        .route("/{service_id}", put(handlers::update_service))
        .route("/{service_id}/status", patch(handlers::toggle_service_status))
        .route(
            "/{service_id}/doctors/{doctor_id}",
            put(handlers::assign_doctor).delete(handlers::remove_doctor),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state)
}
