use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use super::error::BookingError;
use super::lifecycle::{AppointmentRecord, AppointmentStatus, VisitOutcome};
use super::reminders::ReminderPayload;
use super::review::{NewReview, ReviewRecord};
use super::validator::ValidatedBooking;

/// The storage the booking core needs. Implementations must enforce the two
/// uniqueness rules themselves (one scheduled appointment per doctor slot,
/// one review per doctor/patient/appointment triple) and report violations
/// as `SlotTaken` / `DuplicateReview`; the core's own checks only narrow the
/// race window.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Times of the doctor's scheduled appointments on `date`.
    async fn scheduled_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<NaiveTime>, BookingError>;

    /// Whether a scheduled appointment other than `exclude` holds the slot.
    async fn slot_taken(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        exclude: Option<Uuid>,
    ) -> Result<bool, BookingError>;

    /// Doctor exists and is active.
    async fn doctor_accepts_bookings(&self, doctor_id: Uuid) -> Result<bool, BookingError>;

    /// An unknown doctor or patient is `NotFound`, never a raw storage error.
    async fn insert_appointment(
        &self,
        booking: &ValidatedBooking,
    ) -> Result<AppointmentRecord, BookingError>;

    /// Moves a scheduled appointment to another slot. `None` when the row is
    /// gone or no longer scheduled.
    async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        booking: &ValidatedBooking,
    ) -> Result<Option<AppointmentRecord>, BookingError>;

    async fn find_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<AppointmentRecord>, BookingError>;

    /// Compare-and-set on status. `None` when the row is not in `from`.
    async fn transition(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        outcome: Option<&VisitOutcome>,
    ) -> Result<Option<AppointmentRecord>, BookingError>;

    /// `appointment_id = None` matches only reviews without an appointment.
    async fn review_exists(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        appointment_id: Option<Uuid>,
    ) -> Result<bool, BookingError>;

    async fn insert_review(&self, review: &NewReview) -> Result<ReviewRecord, BookingError>;

    /// Scheduled appointments on `date` that have not been reminded yet.
    async fn reminders_due(&self, date: NaiveDate) -> Result<Vec<ReminderPayload>, BookingError>;

    async fn mark_reminded(&self, appointment_id: Uuid) -> Result<(), BookingError>;
}
