use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    ConfirmPaymentRequest, FailPaymentRequest, ProcessPaymentRequest, RefundPaymentRequest,
    RevenueQuery,
};
use crate::services::PaymentService;

#[axum::debug_handler]
pub async fn get_payment_methods(
    State(state): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let payment_service = PaymentService::new(&state);
    let methods = payment_service.payment_methods();

    Ok(Json(json!({
        "methods": methods,
        "currency": state.payments.currency
    })))
}

#[axum::debug_handler]
pub async fn process_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ProcessPaymentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let payment_service = PaymentService::new(&state);
    let receipt = payment_service
        .process_payment(&user, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(receipt))))
}

#[axum::debug_handler]
pub async fn get_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let payment_service = PaymentService::new(&state);
    let payment = payment_service
        .get_payment(&user, payment_id, auth.token())
        .await?;

    Ok(Json(json!(payment)))
}

#[axum::debug_handler]
pub async fn get_invoice(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let payment_service = PaymentService::new(&state);
    let invoice = payment_service
        .get_invoice(&user, payment_id, auth.token())
        .await?;

    Ok(Json(json!(invoice)))
}

#[axum::debug_handler]
pub async fn get_patient_payments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let payment_service = PaymentService::new(&state);
    let payments = payment_service
        .patient_payments(&user, patient_id, auth.token())
        .await?;

    Ok(Json(json!({
        "payments": payments,
        "total": payments.len()
    })))
}

#[axum::debug_handler]
pub async fn confirm_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let payment_service = PaymentService::new(&state);
    let payment = payment_service
        .confirm_payment(&user, payment_id, request, auth.token())
        .await?;

    Ok(Json(json!(payment)))
}

#[axum::debug_handler]
pub async fn fail_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<FailPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let payment_service = PaymentService::new(&state);
    let payment = payment_service
        .fail_payment(&user, payment_id, request, auth.token())
        .await?;

    Ok(Json(json!(payment)))
}

#[axum::debug_handler]
pub async fn refund_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RefundPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let payment_service = PaymentService::new(&state);
    let payment = payment_service
        .refund_payment(&user, payment_id, request, auth.token())
        .await?;

    Ok(Json(json!(payment)))
}

#[axum::debug_handler]
pub async fn get_revenue(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<RevenueQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let payment_service = PaymentService::new(&state);
    let report = payment_service
        .revenue(&user, query.from, query.to, auth.token())
        .await?;

    Ok(Json(json!(report)))
}
