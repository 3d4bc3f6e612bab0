use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, doctor_unavailability_routes};
use doctor_cell::doctor_routes;
use feedback_cell::feedback_routes;
use medical_record_cell::medical_record_routes;
use patient_cell::patient_routes;
use payment_cell::payment_routes;
use service_catalog_cell::catalog_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    let configured = state.is_configured();

    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .route("/health", get(move || health(configured)))
        .nest(
            "/doctors",
            doctor_routes(state.clone()).merge(doctor_unavailability_routes(state.clone())),
        )
        .nest("/patients", patient_routes(state.clone()))
        .nest("/services", catalog_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/records", medical_record_routes(state.clone()))
        .nest("/payments", payment_routes(state.clone()))
        .nest("/feedback", feedback_routes(state))
}

async fn health(configured: bool) -> Json<Value> {
    Json(json!({
        "status": if configured { "ok" } else { "degraded" },
        "configured": configured
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use shared_config::{PaymentConfig, SchedulingConfig};
    use tower::ServiceExt;

    fn config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            supabase_url: "http://127.0.0.1:9".to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            server_port: 3000,
            scheduling: SchedulingConfig::default(),
            payments: PaymentConfig::default(),
        })
    }

    #[tokio::test]
    async fn health_reports_configuration() {
        let response = create_router(config())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cell_routes_require_a_token() {
        let response = create_router(config())
            .oneshot(Request::builder().uri("/appointments/upcoming").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn doctor_unavailability_is_served_under_doctors() {
        let response = create_router(config())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/doctors/5b0c3a5e-8f1e-4c55-9d0a-2f3f1f6a7b11/unavailabilities")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn feedback_routes_are_mounted() {
        let response = create_router(config())
            .oneshot(Request::builder().uri("/feedback/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
