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
    DoctorReviewQuery, ModerateReviewRequest, SubmitFeedbackRequest, SubmitReviewRequest,
};
use crate::services::FeedbackService;

#[axum::debug_handler]
pub async fn get_doctor_reviews(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DoctorReviewQuery>,
) -> Result<Json<Value>, AppError> {
    let feedback_service = FeedbackService::new(&state);
    let reviews = feedback_service.doctor_reviews(doctor_id, query).await?;

    Ok(Json(json!({
        "reviews": reviews,
        "total": reviews.len()
    })))
}

#[axum::debug_handler]
pub async fn submit_review(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let feedback_service = FeedbackService::new(&state);
    let review = feedback_service
        .submit_review(&user, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(review))))
}

#[axum::debug_handler]
pub async fn get_pending_reviews(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let feedback_service = FeedbackService::new(&state);
    let reviews = feedback_service.pending_reviews(&user, auth.token()).await?;

    Ok(Json(json!({
        "reviews": reviews,
        "total": reviews.len()
    })))
}

#[axum::debug_handler]
pub async fn moderate_review(
    State(state): State<Arc<AppConfig>>,
    Path(review_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ModerateReviewRequest>,
) -> Result<Json<Value>, AppError> {
    let feedback_service = FeedbackService::new(&state);
    let review = feedback_service
        .moderate_review(&user, review_id, request, auth.token())
        .await?;

    Ok(Json(json!(review)))
}

#[axum::debug_handler]
pub async fn get_patient_reviews(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let feedback_service = FeedbackService::new(&state);
    let reviews = feedback_service
        .patient_reviews(&user, patient_id, auth.token())
        .await?;

    Ok(Json(json!({
        "reviews": reviews,
        "total": reviews.len()
    })))
}

#[axum::debug_handler]
pub async fn submit_feedback(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SubmitFeedbackRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let feedback_service = FeedbackService::new(&state);
    let feedback = feedback_service
        .submit_feedback(&user, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(feedback))))
}

#[axum::debug_handler]
pub async fn get_feedback_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let feedback_service = FeedbackService::new(&state);
    let stats = feedback_service.feedback_stats(&user, auth.token()).await?;

    Ok(Json(json!(stats)))
}
