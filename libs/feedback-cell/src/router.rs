use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn feedback_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new().route(
        "/doctors/{doctor_id}/reviews",
        get(handlers::get_doctor_reviews),
    );

    let protected_routes = Router::new()
        .route("/", post(handlers::submit_feedback))
        .route("/stats", get(handlers::get_feedback_stats))
        .route("/reviews", post(handlers::submit_review))
        .route("/reviews/pending", get(handlers::get_pending_reviews))
        .route("/reviews/{review_id}/moderate", post(handlers::moderate_review))
        .route("/patients/{patient_id}/reviews", get(handlers::get_patient_reviews))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
