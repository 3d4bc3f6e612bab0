use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{db_timestamp, Query, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    CreatePatientRequest, Patient, PatientError, PatientSearchQuery, UpdatePatientRequest,
};

const DEFAULT_SEARCH_LIMIT: i64 = 50;

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_patient(
        &self,
        user: &User,
        request: CreatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let patient_id = resolve_new_patient_id(user, request.id)?;
        let email = request.email.trim().to_lowercase();

        if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
            return Err(PatientError::ValidationError("First and last name are required".to_string()));
        }
        if !email.contains('@') {
            return Err(PatientError::ValidationError(format!("Invalid email address: {}", email)));
        }
        if request.phone_number.trim().is_empty() {
            return Err(PatientError::ValidationError("Phone number is required".to_string()));
        }
        if request.date_of_birth > Utc::now().date_naive() {
            return Err(PatientError::InvalidDateOfBirth);
        }

        debug!("Creating patient profile for {}", email);

        let path = Query::table("patients").eq("email", &email).build();
        let existing: Vec<Value> = self
            .supabase
            .select(&path, Some(auth_token))
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(PatientError::EmailAlreadyExists { email });
        }

        let now = db_timestamp(Utc::now());
        let patient_data = json!({
            "id": patient_id,
            "first_name": request.first_name.trim(),
            "last_name": request.last_name.trim(),
            "email": email,
            "phone_number": request.phone_number.trim(),
            "date_of_birth": request.date_of_birth.format("%Y-%m-%d").to_string(),
            "address": request.address,
            "created_at": now,
            "updated_at": now
        });

        let patient: Patient = self
            .supabase
            .insert("patients", patient_data, Some(auth_token))
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        info!("Patient {} created", patient.id);
        Ok(patient)
    }

    /// Staff read anyone; patients only themselves.
    pub async fn get_patient(
        &self,
        user: &User,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        ensure_can_read(user, patient_id)?;
        self.fetch(patient_id, auth_token).await
    }

    /// Lookup without an access check, for other cells that already did one.
    pub async fn fetch(&self, patient_id: Uuid, auth_token: &str) -> Result<Patient, PatientError> {
        debug!("Fetching patient profile: {}", patient_id);

        let path = Query::table("patients").eq("id", patient_id).build();
        self.supabase
            .select_one::<Patient>(&path, Some(auth_token))
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?
            .ok_or(PatientError::NotFound)
    }

    /// Patients update only themselves; admins update anyone.
    pub async fn update_patient(
        &self,
        user: &User,
        patient_id: Uuid,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        if !(user.is_admin() || (user.is_patient() && user.is_user(patient_id))) {
            return Err(PatientError::Unauthorized);
        }

        let mut update_data = Map::new();
        if let Some(first_name) = request.first_name {
            update_data.insert("first_name".to_string(), json!(first_name.trim()));
        }
        if let Some(last_name) = request.last_name {
            update_data.insert("last_name".to_string(), json!(last_name.trim()));
        }
        if let Some(phone_number) = request.phone_number {
            update_data.insert("phone_number".to_string(), json!(phone_number.trim()));
        }
        if let Some(date_of_birth) = request.date_of_birth {
            if date_of_birth > Utc::now().date_naive() {
                return Err(PatientError::InvalidDateOfBirth);
            }
            update_data.insert(
                "date_of_birth".to_string(),
                json!(date_of_birth.format("%Y-%m-%d").to_string()),
            );
        }
        if let Some(address) = request.address {
            update_data.insert("address".to_string(), json!(address));
        }

        if update_data.is_empty() {
            return self.fetch(patient_id, auth_token).await;
        }
        update_data.insert("updated_at".to_string(), json!(db_timestamp(Utc::now())));

        let path = Query::table("patients").eq("id", patient_id).build();
        let rows: Vec<Patient> = self
            .supabase
            .update(&path, Value::Object(update_data), Some(auth_token))
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(PatientError::NotFound)
    }

    pub async fn search_patients(
        &self,
        user: &User,
        query: PatientSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Patient>, PatientError> {
        if !user.is_staff() {
            return Err(PatientError::Unauthorized);
        }
        debug!("Searching patients with query: {:?}", query);

        let mut search = Query::table("patients");
        if let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            search = search.any_ilike(&["first_name", "last_name"], name);
        }
        if let Some(email) = query.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            search = search.ilike("email", email);
        }

        let path = search
            .order("last_name.asc,first_name.asc")
            .limit(query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, 200))
            .offset(query.offset.unwrap_or(0).max(0))
            .build();

        self.supabase
            .select(&path, Some(auth_token))
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))
    }
}

pub fn ensure_can_read(user: &User, patient_id: Uuid) -> Result<(), PatientError> {
    if user.is_staff() || (user.is_patient() && user.is_user(patient_id)) {
        Ok(())
    } else {
        Err(PatientError::Unauthorized)
    }
}

fn resolve_new_patient_id(user: &User, requested: Option<Uuid>) -> Result<Uuid, PatientError> {
    if user.is_admin() {
        return Ok(requested.unwrap_or_else(Uuid::new_v4));
    }
    if !user.is_patient() {
        return Err(PatientError::Unauthorized);
    }

    let own = Uuid::parse_str(&user.id).map_err(|_| {
        PatientError::ValidationError("Caller id is not a valid patient id".to_string())
    })?;
    match requested {
        Some(id) if id != own => Err(PatientError::Unauthorized),
        _ => Ok(own),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::test_utils::TestUser;

    #[test]
    fn patients_register_only_themselves() {
        let id = Uuid::new_v4();
        let patient = TestUser::with_id(&id.to_string(), "ada@clinic.test", "patient").to_user();

        assert_eq!(resolve_new_patient_id(&patient, None), Ok(id));
        assert_eq!(resolve_new_patient_id(&patient, Some(id)), Ok(id));
        assert_eq!(
            resolve_new_patient_id(&patient, Some(Uuid::new_v4())),
            Err(PatientError::Unauthorized)
        );
    }

    #[test]
    fn doctors_cannot_register_patients() {
        let doctor = TestUser::doctor("grace@clinic.test").to_user();
        assert_eq!(resolve_new_patient_id(&doctor, None), Err(PatientError::Unauthorized));
    }

    #[test]
    fn read_access_follows_roles() {
        let id = Uuid::new_v4();
        let own = TestUser::with_id(&id.to_string(), "ada@clinic.test", "patient").to_user();
        let other = TestUser::patient("bob@clinic.test").to_user();
        let doctor = TestUser::doctor("grace@clinic.test").to_user();

        assert!(ensure_can_read(&own, id).is_ok());
        assert!(ensure_can_read(&doctor, id).is_ok());
        assert_eq!(ensure_can_read(&other, id), Err(PatientError::Unauthorized));
    }
}
