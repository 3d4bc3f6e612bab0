use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use patient_cell::patient_routes;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn patient_registers_under_their_own_id() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(server.uri());
    let patient_id = Uuid::new_v4().to_string();
    let patient = TestUser::with_id(&patient_id, "ada@clinic.test", "patient");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("email", "eq.ada@clinic.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(body_partial_json(json!({"id": patient_id, "email": "ada@clinic.test"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, "ada@clinic.test")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let response = patient_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("authorization", patient.bearer(&config.jwt_secret))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "first_name": "Ada",
                        "last_name": "Lovelace",
                        "email": "Ada@Clinic.test",
                        "phone_number": "+33100000000",
                        "date_of_birth": "1990-01-01"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["id"], patient_id);
}

#[tokio::test]
async fn patients_cannot_read_each_other() {
    let config = TestConfig::default();
    let patient = TestUser::patient("bob@clinic.test");

    let response = patient_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .uri(format!("/{}", Uuid::new_v4()))
                .header("authorization", patient.bearer(&config.jwt_secret))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn doctor_reads_any_patient() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(server.uri());
    let doctor = TestUser::doctor("grace@clinic.test");
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, "ada@clinic.test")
        ])))
        .mount(&server)
        .await;

    let response = patient_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .uri(format!("/{}", patient_id))
                .header("authorization", doctor.bearer(&config.jwt_secret))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "ada@clinic.test");
}

#[tokio::test]
async fn missing_patient_is_not_found() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(server.uri());
    let admin = TestUser::admin("admin@clinic.test");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let response = patient_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .uri(format!("/{}", Uuid::new_v4()))
                .header("authorization", admin.bearer(&config.jwt_secret))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_is_staff_only() {
    let config = TestConfig::default();
    let patient = TestUser::patient("ada@clinic.test");

    let response = patient_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .uri("/search?name=ada")
                .header("authorization", patient.bearer(&config.jwt_secret))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
