use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Timelike, Weekday};
use tracing::debug;

use doctor_cell::DayOfWeek;
use shared_config::AppConfig;
use shared_database::{day_bounds, db_timestamp, Query, SupabaseClient};
use shared_models::auth::User;

use crate::models::{Appointment, AppointmentError, AppointmentStatistics, AppointmentStatus};

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub struct AppointmentStatisticsService {
    supabase: SupabaseClient,
}

impl AppointmentStatisticsService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Appointments starting on any day in `[from, to]`.
    pub async fn statistics(
        &self,
        user: &User,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<AppointmentStatistics, AppointmentError> {
        if !user.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }
        if from > to {
            return Err(AppointmentError::ValidationError(
                "'from' must not be after 'to'".to_string(),
            ));
        }

        let (start, end) = day_bounds(from, to).ok_or_else(|| {
            AppointmentError::ValidationError("'to' is out of range".to_string())
        })?;
        let path = Query::table("appointments")
            .gte("start_time", db_timestamp(start))
            .lt("start_time", db_timestamp(end))
            .build();

        let appointments: Vec<Appointment> = self
            .supabase
            .select(&path, Some(auth_token))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        debug!("Computing statistics over {} appointments", appointments.len());
        Ok(summarize(&appointments, from, to))
    }
}

fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Index of the highest count; ties go to the lowest index.
fn busiest(counts: &[usize]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, count) in counts.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        match best {
            Some(b) if counts[b] >= *count => {}
            _ => best = Some(index),
        }
    }
    best
}

pub fn summarize(appointments: &[Appointment], from: NaiveDate, to: NaiveDate) -> AppointmentStatistics {
    let total = appointments.len();

    let mut by_status: BTreeMap<AppointmentStatus, usize> =
        AppointmentStatus::ALL.iter().map(|s| (*s, 0)).collect();
    let mut by_doctor = BTreeMap::new();
    let mut weekdays = [0usize; 7];
    let mut hours = [0usize; 24];

    for appointment in appointments {
        *by_status.entry(appointment.status).or_insert(0) += 1;
        *by_doctor.entry(appointment.doctor_id).or_insert(0) += 1;
        weekdays[appointment.start_time.weekday().num_days_from_monday() as usize] += 1;
        hours[appointment.start_time.hour() as usize] += 1;
    }

    let count = |status: AppointmentStatus| by_status.get(&status).copied().unwrap_or(0);
    let completion_rate = rate(count(AppointmentStatus::Completed), total);
    let cancellation_rate = rate(count(AppointmentStatus::Cancelled), total);

    let busiest_weekday = busiest(&weekdays).map(|index| DayOfWeek::from(WEEK[index]).to_string());
    let busiest_hour = busiest(&hours).map(|hour| hour as u32);

    AppointmentStatistics {
        from,
        to,
        total,
        by_status,
        completion_rate,
        cancellation_rate,
        by_doctor,
        busiest_weekday,
        busiest_hour,
    }
}
