use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use service_catalog_cell::catalog_routes;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_body(price: f64, duration: i64) -> Body {
    Body::from(
        json!({
            "name": "Cardiac Check Up",
            "category": "Consultation",
            "price": price,
            "duration_minutes": duration
        })
        .to_string(),
    )
}

#[tokio::test]
async fn admin_creates_service_with_slug() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(server.uri());
    let admin = TestUser::admin("admin@clinic.test");
    let service_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/medical_services"))
        .and(body_partial_json(json!({
            "slug": "cardiac-check-up",
            "category": "consultation",
            "is_active": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::service_response(&service_id, 60.0, 45)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let response = catalog_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("authorization", admin.bearer(&config.jwt_secret))
                .header("content-type", "application/json")
                .body(create_body(60.0, 45))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["id"], service_id);
}

#[tokio::test]
async fn non_admins_cannot_create_services() {
    let config = TestConfig::default();
    let doctor = TestUser::doctor("grace@clinic.test");

    let response = catalog_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("authorization", doctor.bearer(&config.jwt_secret))
                .header("content-type", "application/json")
                .body(create_body(60.0, 45))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rejects_negative_price_and_long_duration() {
    let config = TestConfig::default();
    let admin = TestUser::admin("admin@clinic.test");
    let app = catalog_routes(config.to_arc());

    for (price, duration) in [(-5.0, 30), (40.0, 240)] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header("authorization", admin.bearer(&config.jwt_secret))
                    .header("content-type", "application/json")
                    .body(create_body(price, duration))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn duplicate_name_conflicts() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(server.uri());
    let admin = TestUser::admin("admin@clinic.test");

    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_services"))
        .and(query_param("name", "eq.Cardiac Check Up"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::service_response(&Uuid::new_v4().to_string(), 60.0, 30)
        ])))
        .mount(&server)
        .await;

    let response = catalog_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("authorization", admin.bearer(&config.jwt_secret))
                .header("content-type", "application/json")
                .body(create_body(60.0, 30))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn doctor_listing_includes_unrestricted_services() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    let mut restricted = MockSupabaseResponses::service_response(&Uuid::new_v4().to_string(), 90.0, 60);
    restricted["doctor_ids"] = json!([Uuid::new_v4()]);
    let mut mine = MockSupabaseResponses::service_response(&Uuid::new_v4().to_string(), 80.0, 30);
    mine["doctor_ids"] = json!([doctor_id]);
    let open = MockSupabaseResponses::service_response(&Uuid::new_v4().to_string(), 50.0, 30);

    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_services"))
        .and(query_param("is_active", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([restricted, mine, open])))
        .mount(&server)
        .await;

    let response = catalog_routes(TestConfig::with_supabase_url(server.uri()).to_arc())
        .oneshot(
            Request::builder()
                .uri(format!("/doctor/{}", doctor_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total"], 2);
}

#[tokio::test]
async fn search_rejects_inverted_price_range() {
    let response = catalog_routes(TestConfig::default().to_arc())
        .oneshot(
            Request::builder()
                .uri("/search?min_price=100&max_price=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
