use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalService {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub category: String,
    pub price: f64,
    pub duration_minutes: i64,
    pub is_active: bool,
    /// Empty means every doctor offers the service.
    #[serde(default)]
    pub doctor_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicalService {
    pub fn is_offered_by(&self, doctor_id: Uuid) -> bool {
        self.doctor_ids.is_empty() || self.doctor_ids.contains(&doctor_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: f64,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceSearchQuery {
    pub query: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub max_duration: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStatistics {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub average_price: f64,
    pub by_category: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Service not found")]
    NotFound,

    #[error("A service named '{0}' already exists")]
    NameAlreadyExists(String),

    #[error("Service is not active")]
    Inactive,

    #[error("Service is not offered by this doctor")]
    NotOfferedByDoctor,

    #[error("Administrator role required to manage services")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound => AppError::NotFound(err.to_string()),
            CatalogError::NameAlreadyExists(_) => AppError::Conflict(err.to_string()),
            CatalogError::Inactive | CatalogError::NotOfferedByDoctor => {
                AppError::BadRequest(err.to_string())
            }
            CatalogError::Unauthorized => AppError::Forbidden(err.to_string()),
            CatalogError::ValidationError(msg) => AppError::ValidationError(msg),
            CatalogError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
