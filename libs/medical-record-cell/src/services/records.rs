use chrono::{NaiveDate, Utc};
use futures::try_join;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use patient_cell::{PatientError, PatientService};
use shared_config::AppConfig;
use shared_database::{db_timestamp, Query, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    AddNoteRequest, CreatePrescriptionRequest, CreateRecordRequest, MedicalHistory, MedicalNote,
    MedicalRecord, MedicalRecordError, MedicalSummary, Prescription, RecordSearchQuery, RecordType,
};

const RECENT_CONSULTATIONS: usize = 5;

pub struct MedicalRecordService {
    supabase: SupabaseClient,
    patients: PatientService,
}

impl MedicalRecordService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            patients: PatientService::new(config),
        }
    }

    // ==========================================================================
    // RECORDS
    // ==========================================================================

    pub async fn create_record(
        &self,
        user: &User,
        patient_id: Uuid,
        request: CreateRecordRequest,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        let doctor_id = resolve_author(user, request.doctor_id)?;
        let title = request.title.trim();
        if title.is_empty() {
            return Err(MedicalRecordError::ValidationError("Title is required".to_string()));
        }
        self.ensure_patient(patient_id, auth_token).await?;

        let body = json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "record_type": request.record_type,
            "title": title,
            "description": request.description,
            "record_date": request.record_date.unwrap_or_else(|| Utc::now().date_naive()),
            "metadata": request.metadata.unwrap_or_else(|| json!({})),
            "created_at": db_timestamp(Utc::now()),
        });

        let record: MedicalRecord = self
            .supabase
            .insert("medical_records", body, Some(auth_token))
            .await
            .map_err(|e| {
                error!("Failed to create medical record for patient {}: {}", patient_id, e);
                MedicalRecordError::DatabaseError(e.to_string())
            })?;

        info!(
            record_id = %record.id,
            patient_id = %patient_id,
            record_type = %record.record_type,
            "Medical record created"
        );
        Ok(record)
    }

    pub async fn get_record(
        &self,
        user: &User,
        record_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        let record = self.fetch_record(record_id, auth_token).await?;
        ensure_can_read(user, record.patient_id)?;
        Ok(record)
    }

    pub async fn search_records(
        &self,
        user: &User,
        patient_id: Uuid,
        search: &RecordSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<MedicalRecord>, MedicalRecordError> {
        ensure_can_read(user, patient_id)?;
        if let (Some(from), Some(to)) = (search.from, search.to) {
            if from > to {
                return Err(MedicalRecordError::ValidationError(
                    "'from' must not be after 'to'".to_string(),
                ));
            }
        }

        let mut query = Query::table("medical_records").eq("patient_id", patient_id);
        if let Some(record_type) = search.record_type {
            query = query.eq("record_type", record_type);
        }
        if let Some(from) = search.from {
            query = query.gte("record_date", from);
        }
        if let Some(to) = search.to {
            query = query.lte("record_date", to);
        }
        if let Some(doctor_id) = search.doctor_id {
            query = query.eq("doctor_id", doctor_id);
        }

        let path = query.order("record_date.desc").build();
        debug!("Searching medical records: {}", path);
        self.select(&path, auth_token).await
    }

    // ==========================================================================
    // NOTES
    // ==========================================================================

    pub async fn add_note(
        &self,
        user: &User,
        record_id: Uuid,
        request: AddNoteRequest,
        auth_token: &str,
    ) -> Result<MedicalNote, MedicalRecordError> {
        let doctor_id = resolve_author(user, request.doctor_id)?;
        if request.content.trim().is_empty() {
            return Err(MedicalRecordError::ValidationError("Note content is required".to_string()));
        }
        let record = self.fetch_record(record_id, auth_token).await?;

        let body = json!({
            "record_id": record.id,
            "doctor_id": doctor_id,
            "content": request.content.trim(),
            "metadata": request.metadata.unwrap_or_else(|| json!({})),
            "created_at": db_timestamp(Utc::now()),
        });

        let note: MedicalNote = self
            .supabase
            .insert("medical_notes", body, Some(auth_token))
            .await
            .map_err(|e| MedicalRecordError::DatabaseError(e.to_string()))?;

        info!(
            note_id = %note.id,
            record_id = %record.id,
            patient_id = %record.patient_id,
            "Medical note added"
        );
        Ok(note)
    }

    pub async fn list_notes(
        &self,
        user: &User,
        record_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<MedicalNote>, MedicalRecordError> {
        let record = self.fetch_record(record_id, auth_token).await?;
        ensure_can_read(user, record.patient_id)?;

        let path = Query::table("medical_notes")
            .eq("record_id", record_id)
            .order("created_at.asc")
            .build();
        self.select(&path, auth_token).await
    }

    // ==========================================================================
    // PRESCRIPTIONS
    // ==========================================================================

    pub async fn create_prescription(
        &self,
        user: &User,
        patient_id: Uuid,
        request: CreatePrescriptionRequest,
        auth_token: &str,
    ) -> Result<Prescription, MedicalRecordError> {
        let doctor_id = resolve_author(user, request.doctor_id)?;
        validate_prescription(&request)?;
        self.ensure_patient(patient_id, auth_token).await?;

        let body = json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "medications": request.medications,
            "instructions": request.instructions,
            "start_date": request.start_date,
            "end_date": request.end_date,
            "created_at": db_timestamp(Utc::now()),
        });

        let prescription: Prescription = self
            .supabase
            .insert("prescriptions", body, Some(auth_token))
            .await
            .map_err(|e| {
                error!("Failed to create prescription for patient {}: {}", patient_id, e);
                MedicalRecordError::DatabaseError(e.to_string())
            })?;

        info!(
            prescription_id = %prescription.id,
            patient_id = %patient_id,
            "Prescription created"
        );
        Ok(prescription)
    }

    pub async fn list_prescriptions(
        &self,
        user: &User,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Prescription>, MedicalRecordError> {
        ensure_can_read(user, patient_id)?;
        self.prescriptions_for(patient_id, auth_token).await
    }

    // ==========================================================================
    // HISTORY
    // ==========================================================================

    pub async fn medical_history(
        &self,
        user: &User,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalHistory, MedicalRecordError> {
        ensure_can_read(user, patient_id)?;

        let (records, prescriptions) = try_join!(
            self.records_for(patient_id, auth_token),
            self.prescriptions_for(patient_id, auth_token)
        )?;
        let summary = summarize(&records, &prescriptions, Utc::now().date_naive());

        Ok(MedicalHistory {
            patient_id,
            records,
            prescriptions,
            summary,
        })
    }

    pub async fn medical_summary(
        &self,
        user: &User,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalSummary, MedicalRecordError> {
        ensure_can_read(user, patient_id)?;

        let (records, prescriptions) = try_join!(
            self.records_for(patient_id, auth_token),
            self.prescriptions_for(patient_id, auth_token)
        )?;
        Ok(summarize(&records, &prescriptions, Utc::now().date_naive()))
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn fetch_record(&self, record_id: Uuid, auth_token: &str) -> Result<MedicalRecord, MedicalRecordError> {
        let path = Query::table("medical_records").eq("id", record_id).build();
        self.supabase
            .select_one::<MedicalRecord>(&path, Some(auth_token))
            .await
            .map_err(|e| MedicalRecordError::DatabaseError(e.to_string()))?
            .ok_or(MedicalRecordError::RecordNotFound)
    }

    async fn records_for(&self, patient_id: Uuid, auth_token: &str) -> Result<Vec<MedicalRecord>, MedicalRecordError> {
        let path = Query::table("medical_records")
            .eq("patient_id", patient_id)
            .order("record_date.desc")
            .build();
        self.select(&path, auth_token).await
    }

    async fn prescriptions_for(&self, patient_id: Uuid, auth_token: &str) -> Result<Vec<Prescription>, MedicalRecordError> {
        let path = Query::table("prescriptions")
            .eq("patient_id", patient_id)
            .order("start_date.desc")
            .build();
        self.select(&path, auth_token).await
    }

    async fn select<T>(&self, path: &str, auth_token: &str) -> Result<Vec<T>, MedicalRecordError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.supabase
            .select(path, Some(auth_token))
            .await
            .map_err(|e| MedicalRecordError::DatabaseError(e.to_string()))
    }

    async fn ensure_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<(), MedicalRecordError> {
        match self.patients.fetch(patient_id, auth_token).await {
            Ok(_) => Ok(()),
            Err(PatientError::NotFound) => Err(MedicalRecordError::PatientNotFound),
            Err(e) => Err(MedicalRecordError::DatabaseError(e.to_string())),
        }
    }
}

/// Admins and doctors see every patient; patients only themselves.
pub fn ensure_can_read(user: &User, patient_id: Uuid) -> Result<(), MedicalRecordError> {
    if user.is_staff() || (user.is_patient() && user.is_user(patient_id)) {
        Ok(())
    } else {
        Err(MedicalRecordError::Unauthorized)
    }
}

/// The doctor who signs a write: the caller, or the doctor an admin names.
pub fn resolve_author(user: &User, requested: Option<Uuid>) -> Result<Uuid, MedicalRecordError> {
    if user.is_doctor() {
        let own = Uuid::parse_str(&user.id).map_err(|_| MedicalRecordError::Unauthorized)?;
        return match requested {
            Some(id) if id != own => Err(MedicalRecordError::Unauthorized),
            _ => Ok(own),
        };
    }
    if user.is_admin() {
        return requested.ok_or_else(|| {
            MedicalRecordError::ValidationError("doctor_id is required".to_string())
        });
    }
    Err(MedicalRecordError::Unauthorized)
}

pub fn validate_prescription(request: &CreatePrescriptionRequest) -> Result<(), MedicalRecordError> {
    if request.medications.is_empty() {
        return Err(MedicalRecordError::ValidationError(
            "At least one medication is required".to_string(),
        ));
    }
    if request.medications.iter().any(|m| m.name.trim().is_empty()) {
        return Err(MedicalRecordError::ValidationError(
            "Every medication needs a name".to_string(),
        ));
    }
    if request.start_date > request.end_date {
        return Err(MedicalRecordError::ValidationError(
            "start_date must not be after end_date".to_string(),
        ));
    }
    Ok(())
}

fn of_type(records: &[MedicalRecord], record_type: RecordType) -> Vec<MedicalRecord> {
    records
        .iter()
        .filter(|r| r.record_type == record_type)
        .cloned()
        .collect()
}

pub fn summarize(records: &[MedicalRecord], prescriptions: &[Prescription], today: NaiveDate) -> MedicalSummary {
    let mut consultations = of_type(records, RecordType::Consultation);
    consultations.sort_by(|a, b| b.record_date.cmp(&a.record_date));
    consultations.truncate(RECENT_CONSULTATIONS);

    MedicalSummary {
        allergies: of_type(records, RecordType::Allergy),
        chronic_conditions: of_type(records, RecordType::ChronicCondition),
        current_medications: prescriptions
            .iter()
            .filter(|p| p.is_current(today))
            .cloned()
            .collect(),
        recent_consultations: consultations,
        vaccinations: of_type(records, RecordType::Vaccination),
    }
}
