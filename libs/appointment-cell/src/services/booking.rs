use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::{
    BookingWindow, CalendarService, CreateUnavailabilityRequest, DoctorService, SlotCheck, TimeRange,
};
use patient_cell::{PatientError, PatientService};
use service_catalog_cell::services::catalog::check_bookable;
use service_catalog_cell::CatalogService;
use shared_config::{AppConfig, SchedulingConfig};
use shared_database::{db_timestamp, Query, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest, UnavailabilityImpact,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notifier::{AppointmentNotifier, LogNotifier};

const DEFAULT_UPCOMING_LIMIT: i64 = 20;

pub const UNAVAILABLE_CANCELLATION_REASON: &str = "Doctor unavailable during this time";

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    calendar: CalendarService,
    doctors: DoctorService,
    catalog: CatalogService,
    patients: PatientService,
    lifecycle: AppointmentLifecycleService,
    notifier: Arc<dyn AppointmentNotifier>,
    scheduling: SchedulingConfig,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: &AppConfig, notifier: Arc<dyn AppointmentNotifier>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            calendar: CalendarService::new(config),
            doctors: DoctorService::new(config),
            catalog: CatalogService::new(config),
            patients: PatientService::new(config),
            lifecycle: AppointmentLifecycleService::new(),
            notifier,
            scheduling: config.scheduling.clone(),
        }
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    /// Book a new appointment in `pending` status.
    #[instrument(skip(self, user, auth_token), fields(user_id = %user.id))]
    pub async fn create_appointment(
        &self,
        user: &User,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = self.resolve_patient(user, request.patient_id, auth_token).await?;

        let service = match request.service_id {
            Some(service_id) => Some(self.catalog.get_service(service_id, Some(auth_token)).await?),
            None => None,
        };
        let duration_minutes = service
            .as_ref()
            .map(|s| s.duration_minutes)
            .unwrap_or(self.scheduling.slot_duration_minutes);
        self.calendar.validate_duration(duration_minutes)?;

        let now = Utc::now();
        BookingWindow::from_config(&self.scheduling).check(request.start_time, now)?;

        self.doctors
            .get_bookable_doctor(request.doctor_id, Some(auth_token))
            .await?;

        if let Some(service) = &service {
            check_bookable(service, request.doctor_id)?;
        }

        let range = span(request.start_time, duration_minutes)?;
        self.ensure_slot_free(request.doctor_id, &range, None, auth_token).await?;

        let body = json!({
            "patient_id": patient_id,
            "doctor_id": request.doctor_id,
            "service_id": request.service_id,
            "start_time": db_timestamp(range.start),
            "end_time": db_timestamp(range.end),
            "duration_minutes": duration_minutes,
            "status": AppointmentStatus::Pending,
            "reason": request.reason,
            "created_at": db_timestamp(now),
            "updated_at": db_timestamp(now),
        });

        let appointment: Appointment = self
            .supabase
            .insert("appointments", body, Some(auth_token))
            .await
            .map_err(map_write_error)?;

        info!(
            "Booked appointment {} for patient {} with doctor {} at {}",
            appointment.id, patient_id, appointment.doctor_id, appointment.start_time
        );
        self.notify_booked(&appointment).await;

        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch(appointment_id, Some(auth_token)).await?;
        ensure_participant(user, &appointment)?;
        Ok(appointment)
    }

    // ==========================================================================
    // LIFECYCLE
    // ==========================================================================

    pub async fn confirm_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.fetch(appointment_id, Some(auth_token)).await?;
        ensure_treating_doctor(user, &current)?;
        self.lifecycle
            .validate_status_transition(current.status, AppointmentStatus::Scheduled)?;

        let appointment = self
            .transition(&current, AppointmentStatus::Scheduled, Map::new(), auth_token)
            .await?;

        if let Err(e) = self.notifier.confirmed(&appointment).await {
            warn!("Confirmation notice for {} failed: {}", appointment.id, e);
        }
        Ok(appointment)
    }

    pub async fn cancel_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.fetch(appointment_id, Some(auth_token)).await?;
        ensure_participant(user, &current)?;
        self.lifecycle
            .validate_status_transition(current.status, AppointmentStatus::Cancelled)?;

        let mut extra = Map::new();
        extra.insert("cancellation_reason".to_string(), json!(reason));
        let appointment = self
            .transition(&current, AppointmentStatus::Cancelled, extra, auth_token)
            .await?;

        if let Err(e) = self.notifier.cancelled(&appointment, reason.as_deref()).await {
            warn!("Cancellation notice for {} failed: {}", appointment.id, e);
        }
        Ok(appointment)
    }

    /// Moves an active appointment, keeping its duration and status.
    #[instrument(skip(self, user, auth_token), fields(user_id = %user.id))]
    pub async fn reschedule_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        new_start: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.fetch(appointment_id, Some(auth_token)).await?;
        ensure_participant(user, &current)?;
        self.lifecycle.validate_reschedule(current.status)?;

        BookingWindow::from_config(&self.scheduling).check(new_start, Utc::now())?;
        self.doctors
            .get_bookable_doctor(current.doctor_id, Some(auth_token))
            .await?;

        let range = span(new_start, current.duration_minutes)?;
        self.ensure_slot_free(current.doctor_id, &range, Some(current.id), auth_token)
            .await?;

        let mut extra = Map::new();
        extra.insert("start_time".to_string(), json!(db_timestamp(range.start)));
        extra.insert("end_time".to_string(), json!(db_timestamp(range.end)));
        extra.insert("reminder_sent_at".to_string(), Value::Null);
        let appointment = self
            .transition(&current, current.status, extra, auth_token)
            .await?;

        info!(
            "Rescheduled appointment {} from {} to {}",
            appointment.id, current.start_time, appointment.start_time
        );
        if let Err(e) = self.notifier.rescheduled(&appointment, current.start_time).await {
            warn!("Reschedule notice for {} failed: {}", appointment.id, e);
        }
        Ok(appointment)
    }

    pub async fn complete_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        notes: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.fetch(appointment_id, Some(auth_token)).await?;
        ensure_treating_doctor(user, &current)?;
        self.lifecycle
            .validate_status_transition(current.status, AppointmentStatus::Completed)?;

        let mut extra = Map::new();
        if let Some(notes) = notes {
            extra.insert("notes".to_string(), json!(notes));
        }
        self.transition(&current, AppointmentStatus::Completed, extra, auth_token)
            .await
    }

    pub async fn mark_no_show(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.fetch(appointment_id, Some(auth_token)).await?;
        ensure_treating_doctor(user, &current)?;
        self.lifecycle
            .validate_no_show(current.status, current.start_time, Utc::now())?;

        self.transition(&current, AppointmentStatus::NoShow, Map::new(), auth_token)
            .await
    }

    // ==========================================================================
    // DOCTOR UNAVAILABILITY
    // ==========================================================================

    /// Blocks `[start, end)` on the doctor's calendar and cancels every active
    /// appointment inside it. The window is withdrawn again when the
    /// cancellation fails, so a retry starts clean.
    #[instrument(skip(self, user, request, auth_token), fields(user_id = %user.id))]
    pub async fn add_doctor_unavailability(
        &self,
        user: &User,
        doctor_id: Uuid,
        request: CreateUnavailabilityRequest,
        auth_token: &str,
    ) -> Result<UnavailabilityImpact, AppointmentError> {
        let unavailability = self
            .calendar
            .create_unavailability(user, doctor_id, &request, auth_token)
            .await?;

        let path = Query::table("appointments")
            .eq("doctor_id", doctor_id)
            .in_list("status", &AppointmentStatus::ACTIVE)
            .lt("start_time", db_timestamp(unavailability.end_time))
            .gt("end_time", db_timestamp(unavailability.start_time))
            .build();
        let update = json!({
            "status": AppointmentStatus::Cancelled,
            "cancellation_reason": UNAVAILABLE_CANCELLATION_REASON,
            "updated_at": db_timestamp(Utc::now()),
        });

        let cancelled: Vec<Appointment> = match self
            .supabase
            .update(&path, update, Some(auth_token))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    "Cancelling appointments under unavailability {} failed: {}",
                    unavailability.id, e
                );
                if let Err(undo) = self
                    .calendar
                    .discard_unavailability(unavailability.id, auth_token)
                    .await
                {
                    error!("Could not withdraw unavailability {}: {}", unavailability.id, undo);
                }
                return Err(AppointmentError::DatabaseError(e.to_string()));
            }
        };

        for appointment in &cancelled {
            if let Err(e) = self
                .notifier
                .cancelled(appointment, Some(UNAVAILABLE_CANCELLATION_REASON))
                .await
            {
                warn!("Cancellation notice for {} failed: {}", appointment.id, e);
            }
        }

        info!(
            "Unavailability {} for doctor {} cancelled {} appointments",
            unavailability.id,
            doctor_id,
            cancelled.len()
        );
        Ok(UnavailabilityImpact {
            unavailability,
            cancelled_appointments: cancelled,
        })
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn upcoming_for_patient(
        &self,
        patient_id: Uuid,
        limit: Option<i64>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.upcoming("patient_id", patient_id, limit, auth_token).await
    }

    pub async fn upcoming_for_doctor(
        &self,
        doctor_id: Uuid,
        limit: Option<i64>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.upcoming("doctor_id", doctor_id, limit, auth_token).await
    }

    async fn upcoming(
        &self,
        column: &str,
        id: Uuid,
        limit: Option<i64>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = Query::table("appointments")
            .eq(column, id)
            .in_list("status", &AppointmentStatus::ACTIVE)
            .gt("start_time", db_timestamp(Utc::now()))
            .order("start_time.asc")
            .limit(limit.unwrap_or(DEFAULT_UPCOMING_LIMIT).clamp(1, 100))
            .build();

        self.select(&path, Some(auth_token)).await
    }

    /// Scheduled appointments starting in `(now, now + lead]` with no reminder yet.
    pub async fn appointments_needing_reminders(
        &self,
        now: DateTime<Utc>,
        lead_hours: i64,
        auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = Query::table("appointments")
            .eq("status", AppointmentStatus::Scheduled)
            .gt("start_time", db_timestamp(now))
            .lte("start_time", db_timestamp(now + Duration::hours(lead_hours)))
            .is_null("reminder_sent_at")
            .order("start_time.asc")
            .build();

        self.select(&path, auth_token).await
    }

    /// Returns `false` when another sweep already marked it.
    pub async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        sent_at: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<bool, AppointmentError> {
        let path = Query::table("appointments")
            .eq("id", appointment_id)
            .is_null("reminder_sent_at")
            .build();

        let rows: Vec<Appointment> = self
            .supabase
            .update(
                &path,
                json!({ "reminder_sent_at": db_timestamp(sent_at) }),
                auth_token,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(!rows.is_empty())
    }

    pub fn notifier(&self) -> &Arc<dyn AppointmentNotifier> {
        &self.notifier
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn fetch(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment {}", appointment_id);
        let path = Query::table("appointments").eq("id", appointment_id).build();

        self.supabase
            .select_one::<Appointment>(&path, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
            .ok_or(AppointmentError::NotFound)
    }

    async fn select(&self, path: &str, auth_token: Option<&str>) -> Result<Vec<Appointment>, AppointmentError> {
        self.supabase
            .select(path, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Patients book for themselves; admins name the patient.
    async fn resolve_patient(
        &self,
        user: &User,
        requested: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Uuid, AppointmentError> {
        if user.is_patient() {
            let own_id = Uuid::parse_str(&user.id).map_err(|_| AppointmentError::Unauthorized)?;
            return match requested {
                Some(id) if id != own_id => Err(AppointmentError::Unauthorized),
                _ => Ok(own_id),
            };
        }

        if !user.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }

        let patient_id = requested.ok_or_else(|| {
            AppointmentError::ValidationError("patient_id is required".to_string())
        })?;
        self.patients
            .fetch(patient_id, auth_token)
            .await
            .map_err(|e| match e {
                PatientError::NotFound => {
                    AppointmentError::ValidationError(format!("Patient {} does not exist", patient_id))
                }
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        Ok(patient_id)
    }

    async fn ensure_slot_free(
        &self,
        doctor_id: Uuid,
        range: &TimeRange,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        match self
            .calendar
            .check_slot(doctor_id, range, exclude, Some(auth_token))
            .await?
        {
            SlotCheck::Available => Ok(()),
            SlotCheck::OutsideWorkingHours => Err(AppointmentError::OutsideWorkingHours),
            SlotCheck::AppointmentConflict => {
                warn!("Slot {} - {} already taken for doctor {}", range.start, range.end, doctor_id);
                Err(AppointmentError::SlotNotAvailable)
            }
            SlotCheck::DoctorUnavailable => Err(AppointmentError::DoctorUnavailable),
        }
    }

    /// PATCH guarded on the status we read, so a concurrent change touches no row.
    async fn transition(
        &self,
        current: &Appointment,
        to: AppointmentStatus,
        mut update: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        update.insert("status".to_string(), json!(to));
        update.insert("updated_at".to_string(), json!(db_timestamp(Utc::now())));

        let path = Query::table("appointments")
            .eq("id", current.id)
            .eq("status", current.status)
            .build();

        let rows: Vec<Appointment> = self
            .supabase
            .update(&path, Value::Object(update), Some(auth_token))
            .await
            .map_err(map_write_error)?;

        let appointment = rows
            .into_iter()
            .next()
            .ok_or(AppointmentError::ConcurrentModification)?;

        if current.status != to {
            info!("Appointment {} moved from {} to {}", current.id, current.status, to);
        }
        Ok(appointment)
    }

    async fn notify_booked(&self, appointment: &Appointment) {
        if let Err(e) = self.notifier.booked(appointment).await {
            warn!("Booking notice for {} failed: {}", appointment.id, e);
        }
    }
}

fn span(start: DateTime<Utc>, minutes: i64) -> Result<TimeRange, AppointmentError> {
    TimeRange::from_minutes(start, minutes)
        .ok_or_else(|| AppointmentError::InvalidTime("Appointment would end out of range".to_string()))
}

/// An exclusion constraint on the appointments table reports a double
/// booking as a PostgREST conflict.
fn map_write_error(err: anyhow::Error) -> AppointmentError {
    let message = err.to_string();
    if message.starts_with("Conflict:") {
        AppointmentError::SlotNotAvailable
    } else {
        AppointmentError::DatabaseError(message)
    }
}

pub fn ensure_participant(user: &User, appointment: &Appointment) -> Result<(), AppointmentError> {
    if user.is_admin() || appointment.involves(&user.id) {
        Ok(())
    } else {
        Err(AppointmentError::Unauthorized)
    }
}

pub fn ensure_treating_doctor(user: &User, appointment: &Appointment) -> Result<(), AppointmentError> {
    if user.is_admin() || (user.is_doctor() && user.is_user(appointment.doctor_id)) {
        Ok(())
    } else {
        Err(AppointmentError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::TestUser;

    fn appointment(patient_id: Uuid, doctor_id: Uuid) -> Appointment {
        let start = Utc::now() + Duration::days(2);
        Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            service_id: None,
            start_time: start,
            end_time: start + Duration::minutes(30),
            duration_minutes: 30,
            status: AppointmentStatus::Pending,
            reason: None,
            notes: None,
            cancellation_reason: None,
            reminder_sent_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn participants_and_admins_can_access() {
        let patient = TestUser::patient("ada@clinic.test");
        let doctor = TestUser::doctor("grace@clinic.test");
        let stranger = TestUser::patient("eve@clinic.test");
        let admin = TestUser::admin("admin@clinic.test");

        let appt = appointment(
            Uuid::parse_str(&patient.id).unwrap(),
            Uuid::parse_str(&doctor.id).unwrap(),
        );

        assert!(ensure_participant(&patient.to_user(), &appt).is_ok());
        assert!(ensure_participant(&doctor.to_user(), &appt).is_ok());
        assert!(ensure_participant(&admin.to_user(), &appt).is_ok());
        assert_matches!(
            ensure_participant(&stranger.to_user(), &appt),
            Err(AppointmentError::Unauthorized)
        );
    }

    #[test]
    fn only_the_treating_doctor_confirms() {
        let patient = TestUser::patient("ada@clinic.test");
        let doctor = TestUser::doctor("grace@clinic.test");
        let other_doctor = TestUser::doctor("alan@clinic.test");

        let appt = appointment(
            Uuid::parse_str(&patient.id).unwrap(),
            Uuid::parse_str(&doctor.id).unwrap(),
        );

        assert!(ensure_treating_doctor(&doctor.to_user(), &appt).is_ok());
        assert!(ensure_treating_doctor(&TestUser::admin("a@clinic.test").to_user(), &appt).is_ok());
        assert!(ensure_treating_doctor(&patient.to_user(), &appt).is_err());
        assert!(ensure_treating_doctor(&other_doctor.to_user(), &appt).is_err());
    }

    #[test]
    fn spans_past_the_calendar_are_invalid() {
        assert!(span(Utc::now(), 30).is_ok());
        assert_matches!(
            span(DateTime::<Utc>::MAX_UTC, 30),
            Err(AppointmentError::InvalidTime(_))
        );
    }

    #[test]
    fn conflicts_from_the_database_mean_slot_taken() {
        assert_eq!(
            map_write_error(anyhow::anyhow!("Conflict: exclusion constraint")),
            AppointmentError::SlotNotAvailable
        );
        assert_matches!(
            map_write_error(anyhow::anyhow!("API error (500): boom")),
            AppointmentError::DatabaseError(_)
        );
    }
}
