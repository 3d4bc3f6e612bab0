pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::{appointment_routes, doctor_unavailability_routes};
pub use services::{
    AppointmentBookingService, AppointmentLifecycleService, AppointmentNotifier,
    AppointmentStatisticsService, LogNotifier, ReminderWorker,
};
