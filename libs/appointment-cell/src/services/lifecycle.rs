use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Scheduled,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    /// Rescheduling keeps the status, so it is only open to active appointments.
    pub fn validate_reschedule(&self, current_status: AppointmentStatus) -> Result<(), AppointmentError> {
        if current_status.is_active() {
            Ok(())
        } else {
            Err(AppointmentError::ValidationError(format!(
                "A {} appointment cannot be rescheduled",
                current_status
            )))
        }
    }

    /// A no-show can only be recorded once the appointment has started.
    pub fn validate_no_show(
        &self,
        current_status: AppointmentStatus,
        start_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        self.validate_status_transition(current_status, AppointmentStatus::NoShow)?;
        if now < start_time {
            return Err(AppointmentError::InvalidTime(
                "Cannot mark a no-show before the appointment starts".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    #[test]
    fn pending_can_be_confirmed_or_cancelled() {
        let lifecycle = AppointmentLifecycleService::new();

        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Scheduled)
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Cancelled)
            .is_ok());
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Completed),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn terminal_states_are_final() {
        let lifecycle = AppointmentLifecycleService::new();

        for terminal in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert!(lifecycle.get_valid_transitions(terminal).is_empty());
            for next in AppointmentStatus::ALL {
                assert!(lifecycle.validate_status_transition(terminal, next).is_err());
            }
            assert!(lifecycle.validate_reschedule(terminal).is_err());
        }
    }

    #[test]
    fn no_show_waits_for_start_time() {
        let lifecycle = AppointmentLifecycleService::new();
        let start = Utc::now();

        assert_matches!(
            lifecycle.validate_no_show(AppointmentStatus::Scheduled, start, start - Duration::minutes(5)),
            Err(AppointmentError::InvalidTime(_))
        );
        assert!(lifecycle
            .validate_no_show(AppointmentStatus::Scheduled, start, start + Duration::minutes(5))
            .is_ok());
        assert_matches!(
            lifecycle.validate_no_show(AppointmentStatus::Pending, start, start + Duration::minutes(5)),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }
}
