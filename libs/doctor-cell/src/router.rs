use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/search", get(handlers::search_doctors))
        .route("/{doctor_id}", get(handlers::get_doctor))
        .route("/{doctor_id}/working-hours", get(handlers::get_working_hours))
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots))
        .route("/{doctor_id}/slot-check", get(handlers::check_slot));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/", post(handlers::create_doctor))
        .route("/{doctor_id}", put(handlers::update_doctor))
        .route("/{doctor_id}/availability", patch(handlers::set_availability))
        .route("/{doctor_id}/working-hours", put(handlers::set_working_hours))
        .route("/{doctor_id}/unavailabilities", get(handlers::list_unavailabilities))
        .route(
            "/{doctor_id}/unavailabilities/{unavailability_id}",
            delete(handlers::remove_unavailability),
        )
        .route("/{doctor_id}/schedule", get(handlers::get_schedule))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
