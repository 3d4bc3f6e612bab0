use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::models::Appointment;

/// Outbound notifications for appointment events.
///
/// Delivery failures are reported to the caller, which logs them without
/// failing the operation that triggered the notification.
#[async_trait]
pub trait AppointmentNotifier: Send + Sync {
    async fn booked(&self, appointment: &Appointment) -> anyhow::Result<()>;

    async fn confirmed(&self, appointment: &Appointment) -> anyhow::Result<()>;

    async fn cancelled(&self, appointment: &Appointment, reason: Option<&str>) -> anyhow::Result<()>;

    async fn rescheduled(
        &self,
        appointment: &Appointment,
        previous_start: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn reminder(&self, appointment: &Appointment) -> anyhow::Result<()>;
}

/// Emits every notification as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl AppointmentNotifier for LogNotifier {
    async fn booked(&self, appointment: &Appointment) -> anyhow::Result<()> {
        info!(
            appointment_id = %appointment.id,
            patient_id = %appointment.patient_id,
            doctor_id = %appointment.doctor_id,
            start_time = %appointment.start_time,
            "Appointment booked"
        );
        Ok(())
    }

    async fn confirmed(&self, appointment: &Appointment) -> anyhow::Result<()> {
        info!(
            appointment_id = %appointment.id,
            patient_id = %appointment.patient_id,
            start_time = %appointment.start_time,
            "Appointment confirmed"
        );
        Ok(())
    }

    async fn cancelled(&self, appointment: &Appointment, reason: Option<&str>) -> anyhow::Result<()> {
        info!(
            appointment_id = %appointment.id,
            patient_id = %appointment.patient_id,
            doctor_id = %appointment.doctor_id,
            reason = reason.unwrap_or("none"),
            "Appointment cancelled"
        );
        Ok(())
    }

    async fn rescheduled(
        &self,
        appointment: &Appointment,
        previous_start: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        info!(
            appointment_id = %appointment.id,
            patient_id = %appointment.patient_id,
            previous_start = %previous_start,
            start_time = %appointment.start_time,
            "Appointment rescheduled"
        );
        Ok(())
    }

    async fn reminder(&self, appointment: &Appointment) -> anyhow::Result<()> {
        info!(
            appointment_id = %appointment.id,
            patient_id = %appointment.patient_id,
            start_time = %appointment.start_time,
            "Appointment reminder"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::Duration;
    use uuid::Uuid;

    #[test]
    fn log_notifier_never_fails() {
        let start = Utc::now() + Duration::days(1);
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            service_id: None,
            start_time: start,
            end_time: start + Duration::minutes(30),
            duration_minutes: 30,
            status: AppointmentStatus::Scheduled,
            reason: None,
            notes: None,
            cancellation_reason: None,
            reminder_sent_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let notifier = LogNotifier;

        tokio_test::block_on(async {
            assert!(notifier.booked(&appointment).await.is_ok());
            assert!(notifier.cancelled(&appointment, Some("sick")).await.is_ok());
            assert!(notifier.rescheduled(&appointment, start - Duration::hours(1)).await.is_ok());
            assert!(notifier.reminder(&appointment).await.is_ok());
        });
    }
}
