use std::env;
use std::str::FromStr;

use chrono::Weekday;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub server_port: u16,
    pub scheduling: SchedulingConfig,
    pub payments: PaymentConfig,
}

/// Booking rules shared by the calendar and appointment cells.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub slot_duration_minutes: i64,
    pub min_advance_booking_hours: i64,
    pub max_advance_booking_days: i64,
    pub working_days: Vec<Weekday>,
    pub min_appointment_minutes: i64,
    pub max_appointment_minutes: i64,
    pub reminder_lead_hours: i64,
    pub reminder_sweep_interval_seconds: u64,
    pub max_slot_query_days: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_duration_minutes: 30,
            min_advance_booking_hours: 24,
            max_advance_booking_days: 60,
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            min_appointment_minutes: 15,
            max_appointment_minutes: 120,
            reminder_lead_hours: 24,
            reminder_sweep_interval_seconds: 300,
            max_slot_query_days: 31,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub enabled_methods: Vec<String>,
    pub vat_rate: f64,
    pub currency: String,
    pub invoice_due_days: i64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            enabled_methods: vec![
                "card".to_string(),
                "bank_transfer".to_string(),
                "cash".to_string(),
            ],
            vat_rate: 0.20,
            currency: "EUR".to_string(),
            invoice_due_days: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            server_port: parse_var("SERVER_PORT", 3000),
            scheduling: SchedulingConfig::from_env(),
            payments: PaymentConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let working_days = match env::var("CLINIC_WORKING_DAYS") {
            Ok(raw) => parse_weekdays(&raw).unwrap_or_else(|| {
                warn!("CLINIC_WORKING_DAYS is invalid ({}), using Monday to Friday", raw);
                defaults.working_days.clone()
            }),
            Err(_) => defaults.working_days.clone(),
        };

        Self {
            slot_duration_minutes: parse_var("SLOT_DURATION_MINUTES", defaults.slot_duration_minutes),
            min_advance_booking_hours: parse_var("MIN_ADVANCE_BOOKING_HOURS", defaults.min_advance_booking_hours),
            max_advance_booking_days: parse_var("MAX_ADVANCE_BOOKING_DAYS", defaults.max_advance_booking_days),
            working_days,
            min_appointment_minutes: parse_var("MIN_APPOINTMENT_MINUTES", defaults.min_appointment_minutes),
            max_appointment_minutes: parse_var("MAX_APPOINTMENT_MINUTES", defaults.max_appointment_minutes),
            reminder_lead_hours: parse_var("REMINDER_LEAD_HOURS", defaults.reminder_lead_hours),
            reminder_sweep_interval_seconds: parse_var(
                "REMINDER_SWEEP_INTERVAL_SECONDS",
                defaults.reminder_sweep_interval_seconds,
            ),
            max_slot_query_days: parse_var("MAX_SLOT_QUERY_DAYS", defaults.max_slot_query_days),
        }
    }

    pub fn is_working_day(&self, day: Weekday) -> bool {
        self.working_days.contains(&day)
    }
}

impl PaymentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let enabled_methods = env::var("PAYMENT_METHODS_ENABLED")
            .map(|raw| {
                raw.split(',')
                    .map(|m| m.trim().to_lowercase())
                    .filter(|m| !m.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or(defaults.enabled_methods);

        Self {
            enabled_methods,
            vat_rate: parse_var("VAT_RATE", defaults.vat_rate),
            currency: env::var("PAYMENT_CURRENCY").unwrap_or(defaults.currency),
            invoice_due_days: parse_var("INVOICE_DUE_DAYS", defaults.invoice_due_days),
        }
    }

    pub fn is_method_enabled(&self, method: &str) -> bool {
        self.enabled_methods.iter().any(|m| m == method)
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value ({}), using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Parses a comma separated list such as `monday,tuesday` or `mon,tue`.
pub fn parse_weekdays(raw: &str) -> Option<Vec<Weekday>> {
    let mut days = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let day = Weekday::from_str(part).ok()?;
        if !days.contains(&day) {
            days.push(day);
        }
    }

    if days.is_empty() {
        None
    } else {
        Some(days)
    }
}
