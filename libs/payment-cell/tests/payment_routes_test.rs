use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Datelike, Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use payment_cell::payment_routes;
use shared_database::db_timestamp;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str, bearer: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", bearer);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn payment_row(
    id: &str,
    appointment_id: &str,
    patient_id: &str,
    method: &str,
    status: &str,
    amount: f64,
) -> Value {
    json!({
        "id": id,
        "appointment_id": appointment_id,
        "patient_id": patient_id,
        "amount": amount,
        "currency": "EUR",
        "method": method,
        "status": status,
        "transaction_reference": null,
        "details": {},
        "failure_reason": null,
        "refund_reason": null,
        "completed_at": if status == "completed" { json!("2025-03-10T10:00:00Z") } else { Value::Null },
        "refunded_at": null,
        "created_at": "2025-03-10T09:00:00Z",
        "updated_at": "2025-03-10T09:00:00Z"
    })
}

fn invoice_row(payment_id: &str, number: &str, status: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "payment_id": payment_id,
        "number": number,
        "issued_on": "2025-03-10",
        "due_on": "2025-04-09",
        "amount": 60.0,
        "vat_rate": 0.2,
        "vat_amount": 12.0,
        "total_amount": 72.0,
        "currency": "EUR",
        "status": status,
        "created_at": "2025-03-10T09:00:00Z"
    })
}

struct Billing {
    server: MockServer,
    config: TestConfig,
    patient: TestUser,
    admin: TestUser,
}

impl Billing {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let config = TestConfig::with_supabase_url(server.uri());
        Self {
            server,
            config,
            patient: TestUser::patient("ada@clinic.test"),
            admin: TestUser::admin("admin@clinic.test"),
        }
    }

    fn app(&self) -> Router {
        payment_routes(self.config.to_arc())
    }

    fn bearer(&self, user: &TestUser) -> String {
        user.bearer(&self.config.jwt_secret)
    }

    /// An appointment for the patient, priced through a 60.00 service.
    async fn mount_appointment(&self, status: &str) -> (String, String) {
        let appointment_id = Uuid::new_v4().to_string();
        let service_id = Uuid::new_v4().to_string();
        let start = Utc::now() + Duration::days(3);

        let mut appointment = MockSupabaseResponses::appointment_response(
            &appointment_id,
            &self.patient.id,
            &Uuid::new_v4().to_string(),
            &db_timestamp(start),
            &db_timestamp(start + Duration::minutes(30)),
            status,
        );
        appointment["service_id"] = json!(service_id);

        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", format!("eq.{}", appointment_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment])))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/medical_services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::service_response(&service_id, 60.0, 30)
            ])))
            .mount(&self.server)
            .await;

        (appointment_id, service_id)
    }

    async fn mount_payment(&self, payment: Value) {
        let id = payment["id"].as_str().unwrap_or_default().to_string();
        Mock::given(method("GET"))
            .and(path("/rest/v1/payments"))
            .and(query_param("id", format!("eq.{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([payment])))
            .mount(&self.server)
            .await;
    }
}

#[tokio::test]
async fn payment_methods_are_public() {
    let config = TestConfig::default();

    let response = payment_routes(config.to_arc())
        .oneshot(Request::builder().uri("/methods").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["currency"], "EUR");
    assert_eq!(body["methods"].as_array().unwrap().len(), 3);
    assert_eq!(body["methods"][0]["code"], "card");
}

#[tokio::test]
async fn cash_payment_completes_and_issues_a_paid_invoice() {
    let billing = Billing::start().await;
    let (appointment_id, _) = billing.mount_appointment("scheduled").await;
    let payment_id = Uuid::new_v4().to_string();
    let number = format!("{}00001", Utc::now().year());

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("appointment_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&billing.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/invoices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&billing.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/payments"))
        .and(body_partial_json(json!({
            "amount": 60.0,
            "method": "cash",
            "status": "completed",
            "currency": "EUR"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([payment_row(
            &payment_id,
            &appointment_id,
            &billing.patient.id,
            "cash",
            "completed",
            60.0
        )])))
        .expect(1)
        .mount(&billing.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/invoices"))
        .and(body_partial_json(json!({
            "number": number,
            "vat_amount": 12.0,
            "total_amount": 72.0,
            "status": "paid"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([invoice_row(
            &payment_id, &number, "paid"
        )])))
        .expect(1)
        .mount(&billing.server)
        .await;

    let response = billing
        .app()
        .oneshot(request(
            "POST",
            "/",
            &billing.bearer(&billing.patient),
            Some(json!({ "appointment_id": appointment_id, "method": "cash" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["payment"]["status"], "completed");
    assert_eq!(body["invoice"]["number"], number);
}

#[tokio::test]
async fn failed_invoice_withdraws_the_payment() {
    let billing = Billing::start().await;
    let (appointment_id, _) = billing.mount_appointment("scheduled").await;
    let payment_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("appointment_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&billing.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/invoices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&billing.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([payment_row(
            &payment_id,
            &appointment_id,
            &billing.patient.id,
            "cash",
            "completed",
            60.0
        )])))
        .mount(&billing.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/invoices"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(MockSupabaseResponses::error_response("boom", "XX000")),
        )
        .mount(&billing.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/payments"))
        .and(query_param("id", format!("eq.{}", payment_id)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&billing.server)
        .await;

    let response = billing
        .app()
        .oneshot(request(
            "POST",
            "/",
            &billing.bearer(&billing.patient),
            Some(json!({ "appointment_id": appointment_id, "method": "cash" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn unknown_payment_method_is_rejected() {
    let config = TestConfig::default();
    let patient = TestUser::patient("ada@clinic.test");

    let response = payment_routes(config.to_arc())
        .oneshot(request(
            "POST",
            "/",
            &patient.bearer(&config.jwt_secret),
            Some(json!({ "appointment_id": Uuid::new_v4(), "method": "crypto" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancelled_appointments_cannot_be_paid() {
    let billing = Billing::start().await;
    let (appointment_id, _) = billing.mount_appointment("cancelled").await;

    let response = billing
        .app()
        .oneshot(request(
            "POST",
            "/",
            &billing.bearer(&billing.patient),
            Some(json!({ "appointment_id": appointment_id, "method": "card" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn second_payment_for_an_appointment_conflicts() {
    let billing = Billing::start().await;
    let (appointment_id, _) = billing.mount_appointment("scheduled").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("appointment_id", format!("eq.{}", appointment_id)))
        .and(query_param("status", "neq.failed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([payment_row(
            &Uuid::new_v4().to_string(),
            &appointment_id,
            &billing.patient.id,
            "card",
            "pending",
            60.0
        )])))
        .mount(&billing.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&billing.server)
        .await;

    let response = billing
        .app()
        .oneshot(request(
            "POST",
            "/",
            &billing.bearer(&billing.patient),
            Some(json!({ "appointment_id": appointment_id, "method": "bank_transfer" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_confirms_pending_card_payment() {
    let billing = Billing::start().await;
    let payment_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();
    billing
        .mount_payment(payment_row(
            &payment_id,
            &appointment_id,
            &billing.patient.id,
            "card",
            "pending",
            60.0,
        ))
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payments"))
        .and(query_param("status", "eq.pending"))
        .and(body_partial_json(json!({
            "status": "completed",
            "transaction_reference": "ch_123"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([payment_row(
            &payment_id,
            &appointment_id,
            &billing.patient.id,
            "card",
            "completed",
            60.0
        )])))
        .expect(1)
        .mount(&billing.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/invoices"))
        .and(body_partial_json(json!({ "status": "paid" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([invoice_row(
            &payment_id,
            "202500007",
            "paid"
        )])))
        .expect(1)
        .mount(&billing.server)
        .await;

    let response = billing
        .app()
        .oneshot(request(
            "POST",
            &format!("/{}/confirm", payment_id),
            &billing.bearer(&billing.admin),
            Some(json!({ "transaction_reference": "ch_123" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "completed");
}

#[tokio::test]
async fn pending_payments_cannot_be_refunded() {
    let billing = Billing::start().await;
    let payment_id = Uuid::new_v4().to_string();
    billing
        .mount_payment(payment_row(
            &payment_id,
            &Uuid::new_v4().to_string(),
            &billing.patient.id,
            "bank_transfer",
            "pending",
            60.0,
        ))
        .await;

    let response = billing
        .app()
        .oneshot(request(
            "POST",
            &format!("/{}/refund", payment_id),
            &billing.bearer(&billing.admin),
            Some(json!({ "reason": "Changed mind" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patients_cannot_refund() {
    let config = TestConfig::default();
    let patient = TestUser::patient("ada@clinic.test");

    let response = payment_routes(config.to_arc())
        .oneshot(request(
            "POST",
            &format!("/{}/refund", Uuid::new_v4()),
            &patient.bearer(&config.jwt_secret),
            Some(json!({ "reason": null })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn patients_cannot_view_other_patients_payments() {
    let billing = Billing::start().await;
    let payment_id = Uuid::new_v4().to_string();
    billing
        .mount_payment(payment_row(
            &payment_id,
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            "cash",
            "completed",
            60.0,
        ))
        .await;

    let response = billing
        .app()
        .oneshot(request(
            "GET",
            &format!("/{}", payment_id),
            &billing.bearer(&billing.patient),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn revenue_sums_completed_payments() {
    let billing = Billing::start().await;
    let patient_id = billing.patient.id.clone();

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("status", "eq.completed"))
        .and(query_param("completed_at", "gte.2025-03-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            payment_row(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), &patient_id, "cash", "completed", 60.0),
            payment_row(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), &patient_id, "card", "completed", 45.5),
        ])))
        .expect(1)
        .mount(&billing.server)
        .await;

    let response = billing
        .app()
        .oneshot(request(
            "GET",
            "/revenue?from=2025-03-01&to=2025-03-31",
            &billing.bearer(&billing.admin),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 105.5);
    assert_eq!(body["payment_count"], 2);
    assert_eq!(body["by_method"]["card"], 45.5);
}

#[tokio::test]
async fn revenue_up_to_the_last_representable_day_is_rejected() {
    let config = TestConfig::default();
    let admin = TestUser::admin("admin@clinic.test");
    let to = chrono::NaiveDate::MAX.to_string().replace('+', "%2B");

    let response = payment_routes(config.to_arc())
        .oneshot(request(
            "GET",
            &format!("/revenue?from=2025-01-01&to={}", to),
            &admin.bearer(&config.jwt_secret),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
