use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn medical_record_routes(state: Arc<AppConfig>) -> Router {
    // Clinical data is never public
    let protected_routes = Router::new()
        .route(
            "/patients/{patient_id}",
            get(handlers::search_records).post(handlers::create_record),
        )
        .route("/patients/{patient_id}/history", get(handlers::get_medical_history))
        .route("/patients/{patient_id}/summary", get(handlers::get_medical_summary))
        .route(
            "/patients/{patient_id}/prescriptions",
            get(handlers::list_prescriptions).post(handlers::create_prescription),
        )
        .route("/{record_id}", get(handlers::get_record))
        .route(
            "/{record_id}/notes",
            get(handlers::list_notes).post(handlers::add_note),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
