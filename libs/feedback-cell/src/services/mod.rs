pub mod feedback;
pub mod rating;

pub use feedback::FeedbackService;
