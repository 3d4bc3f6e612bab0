use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub iat: Option<u64>,
}

pub const ROLE_PATIENT: &str = "patient";
pub const ROLE_DOCTOR: &str = "doctor";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    pub fn is_doctor(&self) -> bool {
        self.has_role(ROLE_DOCTOR)
    }

    pub fn is_patient(&self) -> bool {
        self.has_role(ROLE_PATIENT)
    }

    /// Doctors and admins may read any patient's clinical data.
    pub fn is_staff(&self) -> bool {
        self.is_admin() || self.is_doctor()
    }

    pub fn is_user(&self, id: impl std::fmt::Display) -> bool {
        self.id == id.to_string()
    }
}
