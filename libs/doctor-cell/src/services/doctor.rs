use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{db_timestamp, Query, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    CreateDoctorRequest, Doctor, DoctorError, DoctorSearchQuery, UpdateDoctorRequest,
};

const DEFAULT_SEARCH_LIMIT: i64 = 20;
const MAX_SEARCH_LIMIT: i64 = 100;

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Admin only. Email addresses are unique across doctors.
    pub async fn create_doctor(
        &self,
        user: &User,
        request: CreateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        if !user.is_admin() {
            return Err(DoctorError::Unauthorized);
        }

        let email = request.email.trim().to_lowercase();
        if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
            return Err(DoctorError::ValidationError("First and last name are required".to_string()));
        }
        if !email.contains('@') {
            return Err(DoctorError::ValidationError(format!("Invalid email address: {}", email)));
        }
        if request.specialty.trim().is_empty() {
            return Err(DoctorError::ValidationError("Specialty is required".to_string()));
        }

        debug!("Creating doctor profile for {}", email);

        let path = Query::table("doctors").eq("email", &email).build();
        let existing: Vec<Value> = self
            .supabase
            .select(&path, Some(auth_token))
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(DoctorError::EmailAlreadyExists(email));
        }

        let now = db_timestamp(Utc::now());
        let body = json!({
            "id": request.id,
            "first_name": request.first_name.trim(),
            "last_name": request.last_name.trim(),
            "email": email,
            "specialty": request.specialty.trim(),
            "phone": request.phone,
            "bio": request.bio,
            "is_available": true,
            "created_at": now,
            "updated_at": now
        });

        let doctor: Doctor = self
            .supabase
            .insert("doctors", body, Some(auth_token))
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        info!("Doctor {} created", doctor.id);
        Ok(doctor)
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: Option<&str>) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor {}", doctor_id);

        let path = Query::table("doctors").eq("id", doctor_id).build();
        self.supabase
            .select_one::<Doctor>(&path, auth_token)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?
            .ok_or(DoctorError::NotFound)
    }

    /// Looks the doctor up and fails unless they accept appointments.
    pub async fn get_bookable_doctor(&self, doctor_id: Uuid, auth_token: Option<&str>) -> Result<Doctor, DoctorError> {
        let doctor = self.get_doctor(doctor_id, auth_token).await?;
        if !doctor.is_available {
            return Err(DoctorError::NotAvailable);
        }
        Ok(doctor)
    }

    /// Admins, or the doctor editing their own profile.
    pub async fn update_doctor(
        &self,
        user: &User,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        ensure_can_manage(user, doctor_id)?;

        let mut update = Map::new();
        if let Some(first_name) = request.first_name {
            update.insert("first_name".to_string(), json!(first_name.trim()));
        }
        if let Some(last_name) = request.last_name {
            update.insert("last_name".to_string(), json!(last_name.trim()));
        }
        if let Some(specialty) = request.specialty {
            if specialty.trim().is_empty() {
                return Err(DoctorError::ValidationError("Specialty cannot be empty".to_string()));
            }
            update.insert("specialty".to_string(), json!(specialty.trim()));
        }
        if let Some(phone) = request.phone {
            update.insert("phone".to_string(), json!(phone));
        }
        if let Some(bio) = request.bio {
            update.insert("bio".to_string(), json!(bio));
        }

        if update.is_empty() {
            return self.get_doctor(doctor_id, Some(auth_token)).await;
        }

        self.patch(doctor_id, update, auth_token).await
    }

    /// Toggles whether the doctor accepts new appointments.
    pub async fn set_availability(
        &self,
        user: &User,
        doctor_id: Uuid,
        is_available: bool,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        ensure_can_manage(user, doctor_id)?;

        let mut update = Map::new();
        update.insert("is_available".to_string(), json!(is_available));
        let doctor = self.patch(doctor_id, update, auth_token).await?;

        info!("Doctor {} availability set to {}", doctor_id, is_available);
        Ok(doctor)
    }

    async fn patch(&self, doctor_id: Uuid, mut update: Map<String, Value>, auth_token: &str) -> Result<Doctor, DoctorError> {
        update.insert("updated_at".to_string(), json!(db_timestamp(Utc::now())));

        let path = Query::table("doctors").eq("id", doctor_id).build();
        let rows: Vec<Doctor> = self
            .supabase
            .update(&path, Value::Object(update), Some(auth_token))
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(DoctorError::NotFound)
    }

    /// Name or specialty substring search, ordered by name.
    pub async fn search_doctors(
        &self,
        filters: &DoctorSearchQuery,
        auth_token: Option<&str>,
    ) -> Result<Vec<Doctor>, DoctorError> {
        let limit = filters.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
        let offset = filters.offset.unwrap_or(0).max(0);

        let mut query = Query::table("doctors");

        if let Some(text) = filters.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            query = query.any_ilike(&["first_name", "last_name", "specialty"], text);
        }
        if let Some(specialty) = filters.specialty.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.ilike("specialty", specialty);
        }
        if filters.available_only.unwrap_or(false) {
            query = query.eq("is_available", true);
        }

        let path = query
            .order("last_name.asc,first_name.asc")
            .limit(limit)
            .offset(offset)
            .build();

        debug!("Searching doctors: {}", path);

        self.supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    pub async fn find_available_by_specialty(
        &self,
        specialty: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<Doctor>, DoctorError> {
        if specialty.trim().is_empty() {
            warn!("Empty specialty in doctor lookup");
            return Ok(Vec::new());
        }

        let path = Query::table("doctors")
            .ilike("specialty", specialty.trim())
            .eq("is_available", true)
            .order("last_name.asc")
            .build();

        self.supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }
}

/// Admins manage every doctor; a doctor manages only their own row.
pub fn ensure_can_manage(user: &User, doctor_id: Uuid) -> Result<(), DoctorError> {
    if user.is_admin() || (user.is_doctor() && user.is_user(doctor_id)) {
        Ok(())
    } else {
        Err(DoctorError::Unauthorized)
    }
}
