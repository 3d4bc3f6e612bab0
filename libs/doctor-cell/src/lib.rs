pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::doctor_routes;
pub use services::slots::{BookingWindow, TimeRange, WindowViolation};
pub use services::{CalendarService, DoctorService, SlotCheck};
