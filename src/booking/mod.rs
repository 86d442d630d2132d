//! Appointment booking core: slot availability, the booking rules, the
//! appointment lifecycle, review eligibility and the reminder sweep. Storage
//! is reached only through [`store::BookingStore`].

pub mod documents;
pub mod error;
pub mod lifecycle;
pub mod patient;
pub mod reminders;
pub mod review;
pub mod role;
pub mod slots;
pub mod store;
pub mod validator;

#[cfg(test)]
pub mod memory;

pub use error::BookingError;
pub use lifecycle::{AppointmentRecord, AppointmentStatus};
pub use role::Role;
pub use store::BookingStore;
