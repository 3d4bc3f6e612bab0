pub mod invoice;
pub mod payments;

pub use payments::PaymentService;
