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

use crate::models::{AddNoteRequest, CreatePrescriptionRequest, CreateRecordRequest, RecordSearchQuery};
use crate::services::MedicalRecordService;

#[axum::debug_handler]
pub async fn create_record(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let record_service = MedicalRecordService::new(&state);
    let record = record_service
        .create_record(&user, patient_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(record))))
}

#[axum::debug_handler]
pub async fn search_records(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<RecordSearchQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let record_service = MedicalRecordService::new(&state);
    let records = record_service
        .search_records(&user, patient_id, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "records": records,
        "total": records.len()
    })))
}

#[axum::debug_handler]
pub async fn get_record(
    State(state): State<Arc<AppConfig>>,
    Path(record_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let record_service = MedicalRecordService::new(&state);
    let record = record_service.get_record(&user, record_id, auth.token()).await?;

    Ok(Json(json!(record)))
}

#[axum::debug_handler]
pub async fn add_note(
    State(state): State<Arc<AppConfig>>,
    Path(record_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AddNoteRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let record_service = MedicalRecordService::new(&state);
    let note = record_service
        .add_note(&user, record_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(note))))
}

#[axum::debug_handler]
pub async fn list_notes(
    State(state): State<Arc<AppConfig>>,
    Path(record_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let record_service = MedicalRecordService::new(&state);
    let notes = record_service.list_notes(&user, record_id, auth.token()).await?;

    Ok(Json(json!({
        "notes": notes,
        "total": notes.len()
    })))
}

#[axum::debug_handler]
pub async fn create_prescription(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let record_service = MedicalRecordService::new(&state);
    let prescription = record_service
        .create_prescription(&user, patient_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(prescription))))
}

#[axum::debug_handler]
pub async fn list_prescriptions(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let record_service = MedicalRecordService::new(&state);
    let prescriptions = record_service
        .list_prescriptions(&user, patient_id, auth.token())
        .await?;

    Ok(Json(json!({
        "prescriptions": prescriptions,
        "total": prescriptions.len()
    })))
}

#[axum::debug_handler]
pub async fn get_medical_history(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let record_service = MedicalRecordService::new(&state);
    let history = record_service
        .medical_history(&user, patient_id, auth.token())
        .await?;

    Ok(Json(json!(history)))
}

#[axum::debug_handler]
pub async fn get_medical_summary(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let record_service = MedicalRecordService::new(&state);
    let summary = record_service
        .medical_summary(&user, patient_id, auth.token())
        .await?;

    Ok(Json(json!(summary)))
}
