use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Consultation,
    Prescription,
    LabResult,
    Imaging,
    Vaccination,
    Allergy,
    Surgery,
    ChronicCondition,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Consultation => "consultation",
            RecordType::Prescription => "prescription",
            RecordType::LabResult => "lab_result",
            RecordType::Imaging => "imaging",
            RecordType::Vaccination => "vaccination",
            RecordType::Allergy => "allergy",
            RecordType::Surgery => "surgery",
            RecordType::ChronicCondition => "chronic_condition",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub record_type: RecordType,
    pub title: String,
    pub description: Option<String>,
    pub record_date: NaiveDate,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalNote {
    pub id: Uuid,
    pub record_id: Uuid,
    pub doctor_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub medications: Vec<Medication>,
    pub instructions: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Prescription {
    /// Still being taken on `today`.
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.end_date >= today
    }
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub record_type: RecordType,
    pub title: String,
    pub description: Option<String>,
    /// Defaults to today.
    pub record_date: Option<NaiveDate>,
    pub metadata: Option<Value>,
    /// Required when an admin writes on a doctor's behalf.
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNoteRequest {
    pub content: String,
    pub metadata: Option<Value>,
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub medications: Vec<Medication>,
    pub instructions: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordSearchQuery {
    #[serde(rename = "type")]
    pub record_type: Option<RecordType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub doctor_id: Option<Uuid>,
}

// ==============================================================================
// AGGREGATES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalSummary {
    pub allergies: Vec<MedicalRecord>,
    pub chronic_conditions: Vec<MedicalRecord>,
    pub current_medications: Vec<Prescription>,
    pub recent_consultations: Vec<MedicalRecord>,
    pub vaccinations: Vec<MedicalRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalHistory {
    pub patient_id: Uuid,
    pub records: Vec<MedicalRecord>,
    pub prescriptions: Vec<Prescription>,
    pub summary: MedicalSummary,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MedicalRecordError {
    #[error("Medical record not found")]
    RecordNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("You do not have permission to access these medical records")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<MedicalRecordError> for AppError {
    fn from(err: MedicalRecordError) -> Self {
        match err {
            MedicalRecordError::RecordNotFound | MedicalRecordError::PatientNotFound => {
                AppError::NotFound(err.to_string())
            }
            MedicalRecordError::Unauthorized => AppError::Forbidden(err.to_string()),
            MedicalRecordError::ValidationError(msg) => AppError::ValidationError(msg),
            MedicalRecordError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
