use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{any, body_partial_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedback_cell::feedback_routes;
use shared_database::db_timestamp;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", bearer);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn review_row(id: &str, patient_id: &str, doctor_id: &str, rating: i64, status: &str, anonymous: bool) -> Value {
    json!({
        "id": id,
        "appointment_id": Uuid::new_v4(),
        "patient_id": patient_id,
        "doctor_id": doctor_id,
        "rating": rating,
        "comment": "Very attentive",
        "is_anonymous": anonymous,
        "status": status,
        "moderation_note": null,
        "moderated_at": null,
        "moderated_by": null,
        "created_at": "2025-03-10T09:00:00Z",
        "updated_at": "2025-03-10T09:00:00Z"
    })
}

fn feedback_row(feedback_type: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "user_id": Uuid::new_v4(),
        "type": feedback_type,
        "subject": "Waiting room",
        "content": "Too cold in winter",
        "status": "pending",
        "metadata": {},
        "created_at": "2025-03-10T09:00:00Z"
    })
}

struct Clinic {
    server: MockServer,
    config: TestConfig,
    patient: TestUser,
    admin: TestUser,
    doctor_id: String,
}

impl Clinic {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let config = TestConfig::with_supabase_url(server.uri());
        Self {
            server,
            config,
            patient: TestUser::patient("ada@clinic.test"),
            admin: TestUser::admin("admin@clinic.test"),
            doctor_id: Uuid::new_v4().to_string(),
        }
    }

    fn app(&self) -> Router {
        feedback_routes(self.config.to_arc())
    }

    fn bearer(&self, user: &TestUser) -> String {
        user.bearer(&self.config.jwt_secret)
    }

    /// An appointment of the patient that ended yesterday.
    async fn mount_appointment(&self, status: &str) -> String {
        let appointment_id = Uuid::new_v4().to_string();
        let start = Utc::now() - Duration::days(1);
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", format!("eq.{}", appointment_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::appointment_response(
                    &appointment_id,
                    &self.patient.id,
                    &self.doctor_id,
                    &db_timestamp(start),
                    &db_timestamp(start + Duration::minutes(30)),
                    status,
                )
            ])))
            .mount(&self.server)
            .await;
        appointment_id
    }

    async fn mount_existing_reviews(&self, rows: Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/reviews"))
            .and(query_param_is_missing("status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.server)
            .await;
    }

    fn review(&self, appointment_id: &str, rating: i64) -> Request<Body> {
        request(
            "POST",
            "/reviews",
            Some(&self.bearer(&self.patient)),
            Some(json!({
                "appointment_id": appointment_id,
                "rating": rating,
                "comment": "  Very attentive  ",
                "anonymous": true
            })),
        )
    }
}

#[tokio::test]
async fn review_of_a_completed_visit_awaits_moderation() {
    let clinic = Clinic::start().await;
    let appointment_id = clinic.mount_appointment("completed").await;
    clinic.mount_existing_reviews(json!([])).await;

    let stored = review_row(&Uuid::new_v4().to_string(), &clinic.patient.id, &clinic.doctor_id, 5, "pending", true);
    Mock::given(method("POST"))
        .and(path("/rest/v1/reviews"))
        .and(body_partial_json(json!({
            "appointment_id": appointment_id,
            "doctor_id": clinic.doctor_id,
            "rating": 5,
            "comment": "Very attentive",
            "is_anonymous": true,
            "status": "pending"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([stored])))
        .expect(1)
        .mount(&clinic.server)
        .await;

    let response = clinic.app().oneshot(clinic.review(&appointment_id, 5)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn visits_that_did_not_happen_cannot_be_reviewed() {
    let clinic = Clinic::start().await;
    let appointment_id = clinic.mount_appointment("scheduled").await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/reviews"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&clinic.server)
        .await;

    let response = clinic.app().oneshot(clinic.review(&appointment_id, 4)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn a_visit_is_reviewed_only_once() {
    let clinic = Clinic::start().await;
    let appointment_id = clinic.mount_appointment("completed").await;
    clinic
        .mount_existing_reviews(json!([review_row(
            &Uuid::new_v4().to_string(),
            &clinic.patient.id,
            &clinic.doctor_id,
            3,
            "approved",
            false
        )]))
        .await;

    let response = clinic.app().oneshot(clinic.review(&appointment_id, 4)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn ratings_above_five_never_reach_the_database() {
    let clinic = Clinic::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&clinic.server)
        .await;

    let response = clinic
        .app()
        .oneshot(clinic.review(&Uuid::new_v4().to_string(), 6))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn published_reviews_hide_anonymous_patients() {
    let clinic = Clinic::start().await;
    let named = review_row(&Uuid::new_v4().to_string(), &clinic.patient.id, &clinic.doctor_id, 5, "approved", false);
    let anonymous = review_row(&Uuid::new_v4().to_string(), &clinic.patient.id, &clinic.doctor_id, 4, "approved", true);
    Mock::given(method("GET"))
        .and(path("/rest/v1/reviews"))
        .and(query_param("doctor_id", format!("eq.{}", clinic.doctor_id)))
        .and(query_param("status", "eq.approved"))
        .and(query_param("rating", "eq.5"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([named, anonymous])))
        .expect(1)
        .mount(&clinic.server)
        .await;

    let response = clinic
        .app()
        .oneshot(request(
            "GET",
            &format!("/doctors/{}/reviews?rating=5", clinic.doctor_id),
            None,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["reviews"][0]["patient_id"], clinic.patient.id.as_str());
    assert!(body["reviews"][1]["patient_id"].is_null());
}

#[tokio::test]
async fn moderation_records_the_verdict_and_moderator() {
    let clinic = Clinic::start().await;
    let review_id = Uuid::new_v4().to_string();
    let pending = review_row(&review_id, &clinic.patient.id, &clinic.doctor_id, 2, "pending", false);
    let mut rejected = pending.clone();
    rejected["status"] = json!("rejected");
    rejected["moderation_note"] = json!("Contains personal data");
    rejected["moderated_by"] = json!(clinic.admin.id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/reviews"))
        .and(query_param("id", format!("eq.{}", review_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pending])))
        .mount(&clinic.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/reviews"))
        .and(query_param("id", format!("eq.{}", review_id)))
        .and(query_param("status", "eq.pending"))
        .and(body_partial_json(json!({
            "status": "rejected",
            "moderation_note": "Contains personal data",
            "moderated_by": clinic.admin.id
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([rejected])))
        .expect(1)
        .mount(&clinic.server)
        .await;

    let response = clinic
        .app()
        .oneshot(request(
            "POST",
            &format!("/reviews/{}/moderate", review_id),
            Some(&clinic.bearer(&clinic.admin)),
            Some(json!({ "status": "rejected", "note": "Contains personal data" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "rejected");
}

#[tokio::test]
async fn reviews_cannot_be_moderated_back_to_pending() {
    let clinic = Clinic::start().await;

    let response = clinic
        .app()
        .oneshot(request(
            "POST",
            &format!("/reviews/{}/moderate", Uuid::new_v4()),
            Some(&clinic.bearer(&clinic.admin)),
            Some(json!({ "status": "pending" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patients_cannot_moderate() {
    let clinic = Clinic::start().await;

    let response = clinic
        .app()
        .oneshot(request(
            "POST",
            &format!("/reviews/{}/moderate", Uuid::new_v4()),
            Some(&clinic.bearer(&clinic.patient)),
            Some(json!({ "status": "approved" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn other_patients_reviews_are_private() {
    let clinic = Clinic::start().await;

    let response = clinic
        .app()
        .oneshot(request(
            "GET",
            &format!("/patients/{}/reviews", Uuid::new_v4()),
            Some(&clinic.bearer(&clinic.patient)),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn feedback_is_stored_as_pending() {
    let clinic = Clinic::start().await;
    let mut stored = feedback_row("website");
    stored["user_id"] = json!(clinic.patient.id);
    Mock::given(method("POST"))
        .and(path("/rest/v1/feedback"))
        .and(body_partial_json(json!({
            "user_id": clinic.patient.id,
            "type": "website",
            "status": "pending",
            "metadata": { "page": "/booking" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([stored])))
        .expect(1)
        .mount(&clinic.server)
        .await;

    let response = clinic
        .app()
        .oneshot(request(
            "POST",
            "/",
            Some(&clinic.bearer(&clinic.patient)),
            Some(json!({
                "type": "website",
                "subject": "Waiting room",
                "content": "Too cold in winter",
                "metadata": { "page": "/booking" }
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_feedback_type_is_rejected() {
    let clinic = Clinic::start().await;

    let response = clinic
        .app()
        .oneshot(request(
            "POST",
            "/",
            Some(&clinic.bearer(&clinic.patient)),
            Some(json!({ "type": "billing", "subject": "Fees", "content": "Too high" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("billing"));
}

#[tokio::test]
async fn stats_cover_approved_reviews_and_feedback() {
    let clinic = Clinic::start().await;
    let patient = clinic.patient.id.clone();
    let doctor = clinic.doctor_id.clone();
    Mock::given(method("GET"))
        .and(path("/rest/v1/reviews"))
        .and(query_param("status", "eq.approved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            review_row(&Uuid::new_v4().to_string(), &patient, &doctor, 5, "approved", false),
            review_row(&Uuid::new_v4().to_string(), &patient, &doctor, 4, "approved", false),
            review_row(&Uuid::new_v4().to_string(), &patient, &doctor, 4, "approved", true),
        ])))
        .mount(&clinic.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/feedback"))
        .and(query_param("status", "eq.pending"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([feedback_row("doctor")])))
        .mount(&clinic.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/feedback"))
        .and(query_param_is_missing("limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            feedback_row("doctor"),
            feedback_row("website"),
            feedback_row("website"),
        ])))
        .mount(&clinic.server)
        .await;

    let response = clinic
        .app()
        .oneshot(request("GET", "/stats", Some(&clinic.bearer(&clinic.admin)), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_reviews"], 3);
    assert_eq!(body["average_rating"], 4.3);
    assert_eq!(body["rating_distribution"]["4"], 2);
    assert_eq!(body["rating_distribution"]["1"], 0);
    assert_eq!(body["feedback_by_type"]["website"], 2);
    assert_eq!(body["recent_feedback"].as_array().unwrap().len(), 1);
}
