use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::error::BookingError;
use super::lifecycle::AppointmentRecord;
use super::role::Role;
use super::slots::{is_slot_boundary, is_within_hours, is_working_day};
use super::store::BookingStore;

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub notes: String,
}

/// A booking that passed every rule. Only `validate_new_appointment` builds
/// one, so holding it means the rules ran.
#[derive(Debug, Clone)]
pub struct ValidatedBooking {
    doctor_id: Uuid,
    patient_id: Uuid,
    date: NaiveDate,
    time: NaiveTime,
    notes: String,
}

impl ValidatedBooking {
    pub fn doctor_id(&self) -> Uuid {
        self.doctor_id
    }
    pub fn patient_id(&self) -> Uuid {
        self.patient_id
    }
    pub fn date(&self) -> NaiveDate {
        self.date
    }
    pub fn time(&self) -> NaiveTime {
        self.time
    }
    pub fn notes(&self) -> &str {
        &self.notes
    }
}

/// Calendar rules that do not need storage, in the order they are reported.
pub fn check_calendar(
    date: NaiveDate,
    time: NaiveTime,
    today: NaiveDate,
) -> Result<(), BookingError> {
    if date < today {
        return Err(BookingError::PastDate);
    }
    if !is_within_hours(time) {
        return Err(BookingError::OutsideHours);
    }
    if !is_working_day(date) {
        return Err(BookingError::ClosedOnWeekend);
    }
    if !is_slot_boundary(time) {
        return Err(BookingError::NotOnSlotBoundary);
    }
    Ok(())
}

/// The single set of booking rules, shared by patient booking and staff
/// rescheduling. Fails fast: slot taken, past date, outside hours, weekend,
/// off the half-hour grid.
///
/// `exclude` is the appointment being moved, which must not conflict with
/// itself.
pub async fn validate_new_appointment<S>(
    store: &S,
    request: BookingRequest,
    today: NaiveDate,
    exclude: Option<Uuid>,
) -> Result<ValidatedBooking, BookingError>
where
    S: BookingStore + ?Sized,
{
    if store
        .slot_taken(request.doctor_id, request.date, request.time, exclude)
        .await?
    {
        return Err(BookingError::SlotTaken);
    }
    check_calendar(request.date, request.time, today)?;

    Ok(ValidatedBooking {
        doctor_id: request.doctor_id,
        patient_id: request.patient_id,
        date: request.date,
        time: request.time,
        notes: request.notes.trim().to_string(),
    })
}

/// Patient booking: the doctor must be bookable, the rules must pass, and
/// the store has the last word on the slot.
pub async fn book<S>(
    store: &S,
    request: BookingRequest,
    today: NaiveDate,
) -> Result<AppointmentRecord, BookingError>
where
    S: BookingStore + ?Sized,
{
    if !store.doctor_accepts_bookings(request.doctor_id).await? {
        return Err(BookingError::NotFound("doctor"));
    }
    let booking = validate_new_appointment(store, request, today, None).await?;
    debug!(
        doctor_id = %booking.doctor_id,
        date = %booking.date,
        time = %booking.time,
        "booking validated"
    );
    store.insert_appointment(&booking).await
}

/// Staff moves a scheduled appointment to another slot under the same rules.
pub async fn reschedule<S>(
    store: &S,
    appointment_id: Uuid,
    date: NaiveDate,
    time: NaiveTime,
    actor: &Role,
    today: NaiveDate,
) -> Result<AppointmentRecord, BookingError>
where
    S: BookingStore + ?Sized,
{
    if !actor.is_staff() {
        return Err(BookingError::PermissionDenied(
            "only clinic staff can reschedule appointments",
        ));
    }
    let current = store
        .find_appointment(appointment_id)
        .await?
        .ok_or(BookingError::NotFound("appointment"))?;
    if current.status.is_terminal() {
        return Err(BookingError::InvalidTransition {
            from: current.status,
            to: current.status,
        });
    }

    let request = BookingRequest {
        doctor_id: current.doctor_id,
        patient_id: current.patient_id,
        date,
        time,
        notes: current.notes.clone(),
    };
    let booking = validate_new_appointment(store, request, today, Some(appointment_id)).await?;

    store
        .reschedule_appointment(appointment_id, &booking)
        .await?
        .ok_or(BookingError::InvalidTransition {
            from: current.status,
            to: current.status,
        })
}
