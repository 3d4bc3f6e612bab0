pub mod booking;
pub mod lifecycle;
pub mod notifier;
pub mod reminder;
pub mod statistics;

pub use booking::{AppointmentBookingService, UNAVAILABLE_CANCELLATION_REASON};
pub use lifecycle::AppointmentLifecycleService;
pub use notifier::{AppointmentNotifier, LogNotifier};
pub use reminder::ReminderWorker;
pub use statistics::AppointmentStatisticsService;
