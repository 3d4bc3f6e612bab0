pub mod calendar;
pub mod doctor;
pub mod slots;

pub use calendar::{CalendarService, SlotCheck};
pub use doctor::DoctorService;
