use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateDoctorRequest, DoctorSearchQuery, ScheduleQuery, SetDoctorAvailabilityRequest,
    SetWorkingHoursRequest, SlotCheckQuery, SlotQuery, UnavailabilityRangeQuery,
    UpdateDoctorRequest,
};
use crate::services::{CalendarService, DoctorService};

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn search_doctors(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<DoctorSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);
    let doctors = doctor_service.search_doctors(&query, None).await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);
    let doctor = doctor_service.get_doctor(doctor_id, None).await?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn get_working_hours(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let calendar = CalendarService::new(&state);
    let hours = calendar.get_working_hours(doctor_id, None).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "working_hours": hours
    })))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let calendar = CalendarService::new(&state);
    let (from, to) = (query.from, query.to);
    let days = calendar
        .get_available_slots(doctor_id, query, Utc::now(), None)
        .await?;

    let total: usize = days.iter().map(|d| d.slots.len()).sum();
    Ok(Json(json!({
        "doctor_id": doctor_id,
        "from": from,
        "to": to,
        "days": days,
        "total_slots": total
    })))
}

#[axum::debug_handler]
pub async fn check_slot(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let calendar = CalendarService::new(&state);
    let available = calendar
        .is_slot_available(doctor_id, query.start_time, query.duration_minutes, None)
        .await;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "start_time": query.start_time,
        "available": available
    })))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let doctor_service = DoctorService::new(&state);
    let doctor = doctor_service
        .create_doctor(&user, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(doctor))))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);
    let doctor = doctor_service
        .update_doctor(&user, doctor_id, request, auth.token())
        .await?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn set_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SetDoctorAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);
    let doctor = doctor_service
        .set_availability(&user, doctor_id, request.is_available, auth.token())
        .await?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn set_working_hours(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SetWorkingHoursRequest>,
) -> Result<Json<Value>, AppError> {
    let calendar = CalendarService::new(&state);
    let hours = calendar
        .set_working_hours(&user, doctor_id, request, auth.token())
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "working_hours": hours
    })))
}

#[axum::debug_handler]
pub async fn list_unavailabilities(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(range): Query<UnavailabilityRangeQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let calendar = CalendarService::new(&state);
    let unavailabilities = calendar
        .list_unavailabilities(doctor_id, range.from, range.to, Some(auth.token()))
        .await?;

    Ok(Json(json!({
        "unavailabilities": unavailabilities,
        "total": unavailabilities.len()
    })))
}

#[axum::debug_handler]
pub async fn remove_unavailability(
    State(state): State<Arc<AppConfig>>,
    Path((doctor_id, unavailability_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    let calendar = CalendarService::new(&state);
    calendar
        .remove_unavailability(&user, doctor_id, unavailability_id, auth.token())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ScheduleQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let calendar = CalendarService::new(&state);
    let schedule = calendar
        .get_doctor_schedule(&user, doctor_id, query.date, auth.token())
        .await?;

    Ok(Json(json!(schedule)))
}
