use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use shared_config::AppConfig;

use crate::models::{AppointmentError, ReminderRunSummary};
use crate::services::booking::AppointmentBookingService;

/// Periodic sweep that sends reminders for upcoming scheduled appointments.
pub struct ReminderWorker {
    booking: Arc<AppointmentBookingService>,
    lead_hours: i64,
    sweep_interval: Duration,
}

impl ReminderWorker {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_service(Arc::new(AppointmentBookingService::new(config)), config)
    }

    pub fn with_service(booking: Arc<AppointmentBookingService>, config: &AppConfig) -> Self {
        Self {
            booking,
            lead_hours: config.scheduling.reminder_lead_hours,
            sweep_interval: Duration::from_secs(config.scheduling.reminder_sweep_interval_seconds.max(1)),
        }
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Reminder worker started (lead {}h, every {:?})",
            self.lead_hours, self.sweep_interval
        );

        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once(Utc::now(), None).await {
                        Ok(summary) if summary.due > 0 => info!(
                            "Reminder sweep: {} due, {} sent, {} failed",
                            summary.due, summary.sent, summary.failed
                        ),
                        Ok(_) => debug!("Reminder sweep: nothing due"),
                        Err(e) => error!("Reminder sweep failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reminder worker stopped");
    }

    /// One sweep. Only reminders the notifier accepted are marked sent.
    pub async fn run_once(
        &self,
        now: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<ReminderRunSummary, AppointmentError> {
        let due = self
            .booking
            .appointments_needing_reminders(now, self.lead_hours, auth_token)
            .await?;

        let mut summary = ReminderRunSummary {
            due: due.len(),
            ..ReminderRunSummary::default()
        };

        for appointment in &due {
            if let Err(e) = self.booking.notifier().reminder(appointment).await {
                warn!("Reminder for appointment {} failed: {}", appointment.id, e);
                summary.failed += 1;
                continue;
            }

            match self
                .booking
                .mark_reminder_sent(appointment.id, now, auth_token)
                .await
            {
                Ok(true) => summary.sent += 1,
                Ok(false) => debug!("Reminder for {} already recorded", appointment.id),
                Err(e) => {
                    error!("Could not record reminder for {}: {}", appointment.id, e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}
