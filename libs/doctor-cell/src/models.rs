use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// DOCTOR PROFILE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub specialty: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    /// Identity-provider user id of the doctor's account.
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub specialty: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDoctorAvailabilityRequest {
    pub is_available: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorSearchQuery {
    pub query: Option<String>,
    pub specialty: Option<String>,
    pub available_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ==============================================================================
// WORKING HOURS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn weekday(self) -> Weekday {
        match self {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        };
        write!(f, "{}", name)
    }
}

/// One weekday of a doctor's recurring schedule. Times are clinic wall
/// clock, which is UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub lunch_start: Option<NaiveTime>,
    pub lunch_end: Option<NaiveTime>,
}

/// Incoming `HH:MM` strings, validated before they become [`WorkingHours`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHoursEntry {
    pub day_of_week: DayOfWeek,
    pub start: String,
    pub end: String,
    pub lunch_start: Option<String>,
    pub lunch_end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWorkingHoursRequest {
    pub days: Vec<WorkingHoursEntry>,
}

// ==============================================================================
// UNAVAILABILITY
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unavailability {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUnavailabilityRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: Option<String>,
}

// ==============================================================================
// SLOTS AND SCHEDULE
// ==============================================================================

/// The slice of an appointment row the calendar needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedInterval {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub slots: Vec<AvailableSlot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotCheckQuery {
    pub start_time: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnavailabilityRangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub working_hours: Option<WorkingHours>,
    pub appointments: Vec<BookedInterval>,
    pub unavailabilities: Vec<Unavailability>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor is not accepting appointments")]
    NotAvailable,

    #[error("Doctor with email {0} already exists")]
    EmailAlreadyExists(String),

    #[error("Invalid working hours: {0}")]
    InvalidWorkingHours(String),

    #[error("{0}")]
    OutsideBookingWindow(String),

    #[error("Unavailability not found")]
    UnavailabilityNotFound,

    #[error("Not allowed to manage this doctor's calendar")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound | DoctorError::UnavailabilityNotFound => {
                AppError::NotFound(err.to_string())
            }
            DoctorError::EmailAlreadyExists(_) => AppError::Conflict(err.to_string()),
            DoctorError::Unauthorized => AppError::Forbidden(err.to_string()),
            DoctorError::NotAvailable
            | DoctorError::InvalidWorkingHours(_)
            | DoctorError::OutsideBookingWindow(_) => AppError::BadRequest(err.to_string()),
            DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
