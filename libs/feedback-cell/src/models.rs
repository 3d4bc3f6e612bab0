use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use appointment_cell::AppointmentError;
use shared_models::error::AppError;

pub const RATING_MIN: i64 = 1;
pub const RATING_MAX: i64 = 5;

// ==============================================================================
// REVIEWS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    /// Outcomes a moderator may record. Pending is only ever the initial state.
    pub fn parse_verdict(code: &str) -> Option<Self> {
        match code {
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub rating: i64,
    pub comment: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub status: ReviewStatus,
    pub moderation_note: Option<String>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub moderated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the public sees of an approved review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedReview {
    pub id: Uuid,
    pub doctor_id: Uuid,
    /// Absent for anonymous reviews.
    pub patient_id: Option<Uuid>,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Review> for PublishedReview {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            doctor_id: review.doctor_id,
            patient_id: (!review.is_anonymous).then_some(review.patient_id),
            rating: review.rating,
            comment: review.comment,
            created_at: review.created_at,
        }
    }
}

// ==============================================================================
// GENERAL FEEDBACK
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    General,
    Service,
    Doctor,
    Appointment,
    Website,
}

impl FeedbackType {
    pub const ALL: [FeedbackType; 5] = [
        FeedbackType::General,
        FeedbackType::Service,
        FeedbackType::Doctor,
        FeedbackType::Appointment,
        FeedbackType::Website,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackType::General => "general",
            FeedbackType::Service => "service",
            FeedbackType::Doctor => "doctor",
            FeedbackType::Appointment => "appointment",
            FeedbackType::Website => "website",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == code)
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Pending,
    Resolved,
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedbackStatus::Pending => "pending",
            FeedbackStatus::Resolved => "resolved",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub subject: String,
    pub content: String,
    pub status: FeedbackStatus,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// REQUESTS AND REPORTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReviewRequest {
    pub appointment_id: Uuid,
    pub rating: i64,
    pub comment: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerateReviewRequest {
    pub status: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFeedbackRequest {
    #[serde(rename = "type")]
    pub feedback_type: String,
    pub subject: String,
    pub content: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorReviewQuery {
    pub rating: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub total_reviews: usize,
    pub average_rating: f64,
    pub rating_distribution: BTreeMap<i64, usize>,
    pub recent_feedback: Vec<Feedback>,
    pub feedback_by_type: BTreeMap<String, usize>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("Review not found")]
    ReviewNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("You can only review your own appointments")]
    NotYourAppointment,

    #[error("Only completed appointments can be reviewed")]
    AppointmentNotCompleted,

    #[error("This appointment has already been reviewed")]
    AlreadyReviewed,

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),

    #[error("Invalid feedback type '{0}'. Allowed types: general, service, doctor, appointment, website")]
    InvalidFeedbackType(String),

    #[error("Invalid review status '{0}'. Allowed statuses: approved, rejected")]
    InvalidReviewStatus(String),

    #[error("Review was moderated concurrently, please retry")]
    ConcurrentModification,

    #[error("You do not have permission to access these reviews")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for FeedbackError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => FeedbackError::AppointmentNotFound,
            AppointmentError::Unauthorized => FeedbackError::NotYourAppointment,
            other => FeedbackError::DatabaseError(other.to_string()),
        }
    }
}

impl From<FeedbackError> for AppError {
    fn from(err: FeedbackError) -> Self {
        match err {
            FeedbackError::ReviewNotFound | FeedbackError::AppointmentNotFound => {
                AppError::NotFound(err.to_string())
            }
            FeedbackError::AlreadyReviewed | FeedbackError::ConcurrentModification => {
                AppError::Conflict(err.to_string())
            }
            FeedbackError::NotYourAppointment | FeedbackError::Unauthorized => {
                AppError::Forbidden(err.to_string())
            }
            FeedbackError::ValidationError(msg) => AppError::ValidationError(msg),
            FeedbackError::DatabaseError(msg) => AppError::Database(msg),
            _ => AppError::BadRequest(err.to_string()),
        }
    }
}
