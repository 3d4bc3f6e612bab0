use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use regex::Regex;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::{AppConfig, SchedulingConfig};
use shared_database::{db_timestamp, Query, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    BookedInterval, CreateUnavailabilityRequest, DaySlots, DayOfWeek, DoctorError, DoctorSchedule,
    SetWorkingHoursRequest, SlotQuery, Unavailability, WorkingHours, WorkingHoursEntry,
};
use crate::services::doctor::{ensure_can_manage, DoctorService};
use crate::services::slots::{generate_slots, BookingWindow, DayHours, SlotRequest, TimeRange, WeeklyHours};

/// Statuses that hold a slot.
pub const ACTIVE_STATUSES: [&str; 2] = ["pending", "scheduled"];

const TIME_PATTERN: &str = r"^([01]?[0-9]|2[0-3]):[0-5][0-9]$";

/// Outcome of checking one candidate range against a doctor's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCheck {
    Available,
    OutsideWorkingHours,
    AppointmentConflict,
    DoctorUnavailable,
}

impl SlotCheck {
    pub fn is_available(self) -> bool {
        self == SlotCheck::Available
    }
}

pub struct CalendarService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    scheduling: SchedulingConfig,
}

impl CalendarService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            scheduling: config.scheduling.clone(),
        }
    }

    // ==========================================================================
    // WORKING HOURS
    // ==========================================================================

    pub async fn get_working_hours(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Vec<WorkingHours>, DoctorError> {
        let path = Query::table("working_hours")
            .eq("doctor_id", doctor_id)
            .build();

        let mut rows: Vec<WorkingHours> = self
            .supabase
            .select(&path, auth_token)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        rows.sort_by_key(|row| row.day_of_week.weekday().num_days_from_monday());
        Ok(rows)
    }

    /// Replaces the doctor's whole week with `request.days`.
    pub async fn set_working_hours(
        &self,
        user: &User,
        doctor_id: Uuid,
        request: SetWorkingHoursRequest,
        auth_token: &str,
    ) -> Result<Vec<WorkingHours>, DoctorError> {
        ensure_can_manage(user, doctor_id)?;
        let parsed = parse_working_hours(&request.days, &self.scheduling.working_days)?;
        self.doctors.get_doctor(doctor_id, Some(auth_token)).await?;

        let previous: Vec<Uuid> = self
            .get_working_hours(doctor_id, Some(auth_token))
            .await?
            .iter()
            .map(|row| row.id)
            .collect();

        let mut stored = if parsed.is_empty() {
            Vec::new()
        } else {
            self.insert_working_hours(doctor_id, &parsed, auth_token).await?
        };

        // The new week is in place before the old one goes.
        if let Err(e) = self.delete_working_hours(&previous, auth_token).await {
            let fresh: Vec<Uuid> = stored.iter().map(|row| row.id).collect();
            if let Err(undo) = self.delete_working_hours(&fresh, auth_token).await {
                error!("Could not roll back new working hours for doctor {}: {}", doctor_id, undo);
            }
            return Err(e);
        }

        if stored.is_empty() {
            info!("Cleared working hours for doctor {}", doctor_id);
            return Ok(stored);
        }

        stored.sort_by_key(|row| row.day_of_week.weekday().num_days_from_monday());
        info!("Stored {} working-hours rows for doctor {}", stored.len(), doctor_id);
        Ok(stored)
    }

    async fn insert_working_hours(
        &self,
        doctor_id: Uuid,
        parsed: &[(DayOfWeek, DayHours)],
        auth_token: &str,
    ) -> Result<Vec<WorkingHours>, DoctorError> {
        let rows: Vec<Value> = parsed
            .iter()
            .map(|(day, hours)| {
                json!({
                    "doctor_id": doctor_id,
                    "day_of_week": day,
                    "start_time": hours.start,
                    "end_time": hours.end,
                    "lunch_start": hours.lunch.map(|l| l.0),
                    "lunch_end": hours.lunch.map(|l| l.1),
                })
            })
            .collect();

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/working_hours",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    async fn delete_working_hours(&self, ids: &[Uuid], auth_token: &str) -> Result<(), DoctorError> {
        if ids.is_empty() {
            return Ok(());
        }

        let path = Query::table("working_hours").in_list("id", ids).build();
        self.supabase
            .delete(&path, Some(auth_token))
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    // ==========================================================================
    // UNAVAILABILITY
    // ==========================================================================

    /// Stores the window only. Appointments inside it are cancelled by the
    /// booking side, which owns appointment writes and notifications.
    pub async fn create_unavailability(
        &self,
        user: &User,
        doctor_id: Uuid,
        request: &CreateUnavailabilityRequest,
        auth_token: &str,
    ) -> Result<Unavailability, DoctorError> {
        ensure_can_manage(user, doctor_id)?;
        if request.start_time >= request.end_time {
            return Err(DoctorError::ValidationError(
                "Unavailability start must be before its end".to_string(),
            ));
        }
        self.doctors.get_doctor(doctor_id, Some(auth_token)).await?;

        let unavailability: Unavailability = self
            .supabase
            .insert(
                "doctor_unavailabilities",
                json!({
                    "doctor_id": doctor_id,
                    "start_time": db_timestamp(request.start_time),
                    "end_time": db_timestamp(request.end_time),
                    "reason": request.reason,
                    "created_at": db_timestamp(Utc::now()),
                }),
                Some(auth_token),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        info!(
            "Doctor {} unavailable from {} to {}",
            doctor_id, unavailability.start_time, unavailability.end_time
        );
        Ok(unavailability)
    }

    /// Drops a window that was just created, when the rest of its write failed.
    pub async fn discard_unavailability(
        &self,
        unavailability_id: Uuid,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        let path = Query::table("doctor_unavailabilities")
            .eq("id", unavailability_id)
            .build();

        self.supabase
            .delete(&path, Some(auth_token))
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    pub async fn list_unavailabilities(
        &self,
        doctor_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        auth_token: Option<&str>,
    ) -> Result<Vec<Unavailability>, DoctorError> {
        let mut query = Query::table("doctor_unavailabilities").eq("doctor_id", doctor_id);
        if let Some(to) = to {
            query = query.lt("start_time", db_timestamp(to));
        }
        if let Some(from) = from {
            query = query.gt("end_time", db_timestamp(from));
        }

        self.supabase
            .select(&query.order("start_time.asc").build(), auth_token)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    pub async fn remove_unavailability(
        &self,
        user: &User,
        doctor_id: Uuid,
        unavailability_id: Uuid,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        ensure_can_manage(user, doctor_id)?;

        let path = Query::table("doctor_unavailabilities")
            .eq("id", unavailability_id)
            .eq("doctor_id", doctor_id)
            .build();

        let existing: Option<Unavailability> = self
            .supabase
            .select_one(&path, Some(auth_token))
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        if existing.is_none() {
            return Err(DoctorError::UnavailabilityNotFound);
        }

        self.supabase
            .delete(&path, Some(auth_token))
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        info!("Removed unavailability {} for doctor {}", unavailability_id, doctor_id);
        Ok(())
    }

    // ==========================================================================
    // SLOTS
    // ==========================================================================

    async fn booked_intervals(
        &self,
        doctor_id: Uuid,
        range: &TimeRange,
        exclude: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<BookedInterval>, DoctorError> {
        let mut query = Query::table("appointments")
            .eq("doctor_id", doctor_id)
            .in_list("status", &ACTIVE_STATUSES)
            .lt("start_time", db_timestamp(range.end))
            .gt("end_time", db_timestamp(range.start));
        if let Some(id) = exclude {
            query = query.neq("id", id);
        }

        self.supabase
            .select(&query.order("start_time.asc").build(), auth_token)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    #[instrument(skip(self, auth_token))]
    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        query: SlotQuery,
        now: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<Vec<DaySlots>, DoctorError> {
        let duration_minutes = query
            .duration_minutes
            .unwrap_or(self.scheduling.slot_duration_minutes);
        self.validate_duration(duration_minutes)?;

        if query.from > query.to {
            return Err(DoctorError::ValidationError(
                "'from' must not be after 'to'".to_string(),
            ));
        }
        let span_days = (query.to - query.from).num_days() + 1;
        if span_days > self.scheduling.max_slot_query_days {
            return Err(DoctorError::ValidationError(format!(
                "Slot queries may span at most {} days",
                self.scheduling.max_slot_query_days
            )));
        }

        let window = BookingWindow::from_config(&self.scheduling);
        if query.to > window.latest(now).date_naive() {
            return Err(DoctorError::OutsideBookingWindow(format!(
                "Appointments cannot be booked more than {} days in advance",
                self.scheduling.max_advance_booking_days
            )));
        }

        self.doctors.get_bookable_doctor(doctor_id, auth_token).await?;

        let rows = self.get_working_hours(doctor_id, auth_token).await?;
        let hours = WeeklyHours::from_rows(&rows, &self.scheduling.working_days);
        if hours.is_empty() {
            debug!("Doctor {} has no working hours on clinic days", doctor_id);
            return Ok(Vec::new());
        }

        let range = TimeRange::days(query.from, query.to)
            .ok_or_else(|| DoctorError::ValidationError("Date range is out of bounds".to_string()))?;
        let busy = self.busy_ranges(doctor_id, &range, None, auth_token).await?;

        let days = generate_slots(&SlotRequest {
            from: query.from,
            to: query.to,
            duration: Duration::minutes(duration_minutes),
            hours: &hours,
            busy: &busy,
            window,
            now,
        });

        debug!(
            "Doctor {} has free slots on {} of {} requested days",
            doctor_id,
            days.len(),
            span_days
        );
        Ok(days)
    }

    /// Active appointments and unavailability windows touching `range`.
    pub async fn busy_ranges(
        &self,
        doctor_id: Uuid,
        range: &TimeRange,
        exclude_appointment: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<TimeRange>, DoctorError> {
        let appointments = self
            .booked_intervals(doctor_id, range, exclude_appointment, auth_token)
            .await?;
        let unavailabilities = self
            .list_unavailabilities(doctor_id, Some(range.start), Some(range.end), auth_token)
            .await?;

        Ok(appointments
            .iter()
            .map(|a| TimeRange::new(a.start_time, a.end_time))
            .chain(unavailabilities.iter().map(|u| TimeRange::new(u.start_time, u.end_time)))
            .collect())
    }

    /// Checks working hours, then appointments, then unavailability.
    pub async fn check_slot(
        &self,
        doctor_id: Uuid,
        range: &TimeRange,
        exclude_appointment: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<SlotCheck, DoctorError> {
        let rows = self.get_working_hours(doctor_id, auth_token).await?;
        let hours = WeeklyHours::from_rows(&rows, &self.scheduling.working_days);
        if !hours.fits(range) {
            return Ok(SlotCheck::OutsideWorkingHours);
        }

        let appointments = self
            .booked_intervals(doctor_id, range, exclude_appointment, auth_token)
            .await?;
        if !appointments.is_empty() {
            return Ok(SlotCheck::AppointmentConflict);
        }

        let unavailabilities = self
            .list_unavailabilities(doctor_id, Some(range.start), Some(range.end), auth_token)
            .await?;
        if !unavailabilities.is_empty() {
            return Ok(SlotCheck::DoctorUnavailable);
        }

        Ok(SlotCheck::Available)
    }

    /// Lookup failures and out-of-bounds durations answer `false`.
    pub async fn is_slot_available(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: Option<i64>,
        auth_token: Option<&str>,
    ) -> bool {
        let minutes = duration_minutes.unwrap_or(self.scheduling.slot_duration_minutes);
        if self.validate_duration(minutes).is_err() {
            debug!("Slot check with duration {} refused", minutes);
            return false;
        }
        let Some(range) = TimeRange::from_minutes(start, minutes) else {
            return false;
        };

        match self.check_slot(doctor_id, &range, None, auth_token).await {
            Ok(check) => check.is_available(),
            Err(e) => {
                error!("Slot check for doctor {} failed: {}", doctor_id, e);
                false
            }
        }
    }

    pub fn validate_duration(&self, minutes: i64) -> Result<(), DoctorError> {
        if minutes < self.scheduling.min_appointment_minutes
            || minutes > self.scheduling.max_appointment_minutes
        {
            return Err(DoctorError::ValidationError(format!(
                "Duration must be between {} and {} minutes",
                self.scheduling.min_appointment_minutes, self.scheduling.max_appointment_minutes
            )));
        }
        Ok(())
    }

    // ==========================================================================
    // SCHEDULE
    // ==========================================================================

    pub async fn get_doctor_schedule(
        &self,
        user: &User,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<DoctorSchedule, DoctorError> {
        ensure_can_manage(user, doctor_id)?;

        let day = TimeRange::days(date, date)
            .ok_or_else(|| DoctorError::ValidationError("Date is out of bounds".to_string()))?;
        let working_hours = self
            .get_working_hours(doctor_id, Some(auth_token))
            .await?
            .into_iter()
            .find(|row| row.day_of_week == DayOfWeek::from(date.weekday()));

        let path = Query::table("appointments")
            .eq("doctor_id", doctor_id)
            .neq("status", "cancelled")
            .gte("start_time", db_timestamp(day.start))
            .lt("start_time", db_timestamp(day.end))
            .order("start_time.asc")
            .build();
        let appointments: Vec<BookedInterval> = self
            .supabase
            .select(&path, Some(auth_token))
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let unavailabilities = self
            .list_unavailabilities(doctor_id, Some(day.start), Some(day.end), Some(auth_token))
            .await?;

        Ok(DoctorSchedule {
            doctor_id,
            date,
            working_hours,
            appointments,
            unavailabilities,
        })
    }
}

fn parse_time(raw: &str, pattern: &Regex, field: &str, day: DayOfWeek) -> Result<NaiveTime, DoctorError> {
    let raw = raw.trim();
    if !pattern.is_match(raw) {
        return Err(DoctorError::InvalidWorkingHours(format!(
            "{} on {} must be HH:MM, got '{}'",
            field, day, raw
        )));
    }
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| {
        DoctorError::InvalidWorkingHours(format!("{} on {} is not a valid time", field, day))
    })
}

/// Validates a full week of `HH:MM` entries against the clinic's working days.
pub fn parse_working_hours(
    entries: &[WorkingHoursEntry],
    working_days: &[Weekday],
) -> Result<Vec<(DayOfWeek, DayHours)>, DoctorError> {
    let pattern = Regex::new(TIME_PATTERN)
        .map_err(|e| DoctorError::InvalidWorkingHours(e.to_string()))?;
    let mut parsed: Vec<(DayOfWeek, DayHours)> = Vec::with_capacity(entries.len());

    for entry in entries {
        let day = entry.day_of_week;
        if !working_days.contains(&day.weekday()) {
            return Err(DoctorError::InvalidWorkingHours(format!(
                "{} is not a clinic working day",
                day
            )));
        }
        if parsed.iter().any(|(d, _)| *d == day) {
            return Err(DoctorError::InvalidWorkingHours(format!(
                "{} is listed more than once",
                day
            )));
        }

        let start = parse_time(&entry.start, &pattern, "start", day)?;
        let end = parse_time(&entry.end, &pattern, "end", day)?;
        if start >= end {
            return Err(DoctorError::InvalidWorkingHours(format!(
                "start must be before end on {}",
                day
            )));
        }

        let lunch = match (&entry.lunch_start, &entry.lunch_end) {
            (None, None) => None,
            (Some(ls), Some(le)) => {
                let ls = parse_time(ls, &pattern, "lunch_start", day)?;
                let le = parse_time(le, &pattern, "lunch_end", day)?;
                if ls >= le {
                    return Err(DoctorError::InvalidWorkingHours(format!(
                        "lunch_start must be before lunch_end on {}",
                        day
                    )));
                }
                if ls < start || le > end {
                    return Err(DoctorError::InvalidWorkingHours(format!(
                        "lunch break must fall within working hours on {}",
                        day
                    )));
                }
                Some((ls, le))
            }
            _ => {
                return Err(DoctorError::InvalidWorkingHours(format!(
                    "lunch_start and lunch_end must be given together on {}",
                    day
                )))
            }
        };

        parsed.push((day, DayHours { start, end, lunch }));
    }

    if parsed.is_empty() {
        warn!("Working hours update with no days");
    }

    Ok(parsed)
}
