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
use shared_utils::extractor::require_admin;

use doctor_cell::CreateUnavailabilityRequest;

use crate::models::{
    CancelAppointmentRequest, CompleteAppointmentRequest, CreateAppointmentRequest,
    RescheduleAppointmentRequest, StatsQuery, UpcomingQuery,
};
use crate::services::{AppointmentBookingService, AppointmentStatisticsService, ReminderWorker};

fn own_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .create_appointment(&user, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .get_appointment(&user, appointment_id, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_upcoming_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<UpcomingQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let appointments = if user.is_patient() {
        booking_service
            .upcoming_for_patient(own_id(&user)?, query.limit, auth.token())
            .await?
    } else if user.is_doctor() {
        booking_service
            .upcoming_for_doctor(own_id(&user)?, query.limit, auth.token())
            .await?
    } else if user.is_admin() {
        match (query.patient_id, query.doctor_id) {
            (Some(patient_id), _) => {
                booking_service
                    .upcoming_for_patient(patient_id, query.limit, auth.token())
                    .await?
            }
            (None, Some(doctor_id)) => {
                booking_service
                    .upcoming_for_doctor(doctor_id, query.limit, auth.token())
                    .await?
            }
            (None, None) => {
                return Err(AppError::BadRequest(
                    "patient_id or doctor_id is required".to_string(),
                ))
            }
        }
    } else {
        return Err(AppError::Forbidden("Unknown role".to_string()));
    };

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .confirm_appointment(&user, appointment_id, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .cancel_appointment(&user, appointment_id, request.reason, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .reschedule_appointment(&user, appointment_id, request.start_time, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .complete_appointment(&user, appointment_id, request.notes, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .mark_no_show(&user, appointment_id, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn add_doctor_unavailability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateUnavailabilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let impact = booking_service
        .add_doctor_unavailability(&user, doctor_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(impact))))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_statistics(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<StatsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let stats_service = AppointmentStatisticsService::new(&state);
    let stats = stats_service
        .statistics(&user, query.from, query.to, auth.token())
        .await?;

    Ok(Json(json!(stats)))
}

#[axum::debug_handler]
pub async fn run_reminders(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let worker = ReminderWorker::new(&state);
    let summary = worker.run_once(Utc::now(), Some(auth.token())).await?;

    Ok(Json(json!(summary)))
}
