use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::{DoctorError, TimeRange, Unavailability, WindowViolation};
use service_catalog_cell::CatalogError;
use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.patient_id.to_string() == user_id || self.doctor_id.to_string() == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Statuses that hold a slot.
    pub const ACTIVE: [AppointmentStatus; 2] = [AppointmentStatus::Pending, AppointmentStatus::Scheduled];

    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Scheduled,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Required when an admin books on a patient's behalf.
    pub patient_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub service_id: Option<Uuid>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpcomingQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

// ==============================================================================
// RESULT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentStatistics {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total: usize,
    pub by_status: BTreeMap<AppointmentStatus, usize>,
    /// Percentages of `total`, two decimals.
    pub completion_rate: f64,
    pub cancellation_rate: f64,
    pub by_doctor: BTreeMap<Uuid, usize>,
    pub busiest_weekday: Option<String>,
    pub busiest_hour: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailabilityImpact {
    pub unavailability: Unavailability,
    pub cancelled_appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRunSummary {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Selected time slot is not available")]
    SlotNotAvailable,

    #[error("Appointment time must be within the doctor's working hours")]
    OutsideWorkingHours,

    #[error("Doctor is unavailable during this time")]
    DoctorUnavailable,

    #[error("Doctor is not accepting appointments")]
    DoctorNotAvailable,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment was modified by another request")]
    ConcurrentModification,

    #[error("Service cannot be booked: {0}")]
    ServiceNotBookable(String),

    #[error("You are not authorized to modify this appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DoctorError> for AppointmentError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppointmentError::DoctorNotFound,
            DoctorError::NotAvailable => AppointmentError::DoctorNotAvailable,
            DoctorError::Unauthorized => AppointmentError::Unauthorized,
            DoctorError::OutsideBookingWindow(msg) => AppointmentError::InvalidTime(msg),
            DoctorError::ValidationError(msg) | DoctorError::InvalidWorkingHours(msg) => {
                AppointmentError::ValidationError(msg)
            }
            DoctorError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
            other => AppointmentError::ValidationError(other.to_string()),
        }
    }
}

impl From<WindowViolation> for AppointmentError {
    fn from(err: WindowViolation) -> Self {
        AppointmentError::InvalidTime(err.to_string())
    }
}

impl From<CatalogError> for AppointmentError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
            other => AppointmentError::ServiceNotBookable(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound | AppointmentError::DoctorNotFound => {
                AppError::NotFound(err.to_string())
            }
            AppointmentError::SlotNotAvailable | AppointmentError::ConcurrentModification => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
            AppointmentError::OutsideWorkingHours
            | AppointmentError::DoctorUnavailable
            | AppointmentError::DoctorNotAvailable
            | AppointmentError::InvalidTime(_)
            | AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::ServiceNotBookable(_) => AppError::BadRequest(err.to_string()),
        }
    }
}
