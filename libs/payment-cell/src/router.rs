use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn payment_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new().route("/methods", get(handlers::get_payment_methods));

    let protected_routes = Router::new()
        .route("/", post(handlers::process_payment))
        .route("/revenue", get(handlers::get_revenue))
        .route("/patients/{patient_id}", get(handlers::get_patient_payments))
        .route("/{payment_id}", get(handlers::get_payment))
        .route("/{payment_id}/invoice", get(handlers::get_invoice))
        .route("/{payment_id}/confirm", post(handlers::confirm_payment))
        .route("/{payment_id}/fail", post(handlers::fail_payment))
        .route("/{payment_id}/refund", post(handlers::refund_payment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
