//! In-process `BookingStore` for tests. Enforces the same uniqueness rules
//! as the database indexes and rejects appointments for unknown patients
//! like the foreign key does.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use super::error::BookingError;
use super::lifecycle::{AppointmentRecord, AppointmentStatus, VisitOutcome};
use super::reminders::ReminderPayload;
use super::review::{NewReview, ReviewRecord};
use super::store::BookingStore;
use super::validator::ValidatedBooking;

#[derive(Default)]
struct State {
    doctors: HashMap<Uuid, bool>,
    patients: HashSet<Uuid>,
    appointments: Vec<AppointmentRecord>,
    reviews: Vec<ReviewRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_doctor(&self, active: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().doctors.insert(id, active);
        id
    }

    pub fn add_patient(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().patients.insert(id);
        id
    }

    /// Inserts directly, bypassing validation and uniqueness.
    pub fn seed_appointment(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        status: AppointmentStatus,
    ) -> Uuid {
        let record = record(doctor_id, patient_id, date, time, status, String::new());
        let id = record.appointment_id;
        self.state.lock().unwrap().appointments.push(record);
        id
    }

    pub fn appointment_count(&self) -> usize {
        self.state.lock().unwrap().appointments.len()
    }
}

fn record(
    doctor_id: Uuid,
    patient_id: Uuid,
    date: NaiveDate,
    time: NaiveTime,
    status: AppointmentStatus,
    notes: String,
) -> AppointmentRecord {
    let now = Utc::now();
    AppointmentRecord {
        appointment_id: Uuid::new_v4(),
        doctor_id,
        patient_id,
        date,
        time,
        status,
        notes,
        diagnosis: String::new(),
        prescription: String::new(),
        reminder_sent_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn holds_slot(
    a: &AppointmentRecord,
    doctor_id: Uuid,
    date: NaiveDate,
    time: NaiveTime,
    exclude: Option<Uuid>,
) -> bool {
    a.status == AppointmentStatus::Scheduled
        && a.doctor_id == doctor_id
        && a.date == date
        && a.time == time
        && Some(a.appointment_id) != exclude
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn scheduled_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<NaiveTime>, BookingError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .appointments
            .iter()
            .filter(|a| a.doctor_id == doctor_id && a.date == date)
            .filter(|a| a.status == AppointmentStatus::Scheduled)
            .map(|a| a.time)
            .collect())
    }

    async fn slot_taken(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        exclude: Option<Uuid>,
    ) -> Result<bool, BookingError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .appointments
            .iter()
            .any(|a| holds_slot(a, doctor_id, date, time, exclude)))
    }

    async fn doctor_accepts_bookings(&self, doctor_id: Uuid) -> Result<bool, BookingError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .doctors
            .get(&doctor_id)
            .copied()
            .unwrap_or(false))
    }

    async fn insert_appointment(
        &self,
        booking: &ValidatedBooking,
    ) -> Result<AppointmentRecord, BookingError> {
        let mut state = self.state.lock().unwrap();
        if state
            .appointments
            .iter()
            .any(|a| holds_slot(a, booking.doctor_id(), booking.date(), booking.time(), None))
        {
            return Err(BookingError::SlotTaken);
        }
        if !state.patients.contains(&booking.patient_id()) {
            return Err(BookingError::NotFound("patient"));
        }
        let created = record(
            booking.doctor_id(),
            booking.patient_id(),
            booking.date(),
            booking.time(),
            AppointmentStatus::Scheduled,
            booking.notes().to_string(),
        );
        state.appointments.push(created.clone());
        Ok(created)
    }

    async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        booking: &ValidatedBooking,
    ) -> Result<Option<AppointmentRecord>, BookingError> {
        let mut state = self.state.lock().unwrap();
        if state.appointments.iter().any(|a| {
            holds_slot(a, booking.doctor_id(), booking.date(), booking.time(), Some(appointment_id))
        }) {
            return Err(BookingError::SlotTaken);
        }
        let Some(a) = state.appointments.iter_mut().find(|a| {
            a.appointment_id == appointment_id && a.status == AppointmentStatus::Scheduled
        }) else {
            return Ok(None);
        };
        a.date = booking.date();
        a.time = booking.time();
        a.reminder_sent_at = None;
        a.updated_at = Utc::now();
        Ok(Some(a.clone()))
    }

    async fn find_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<AppointmentRecord>, BookingError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .appointments
            .iter()
            .find(|a| a.appointment_id == appointment_id)
            .cloned())
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        outcome: Option<&VisitOutcome>,
    ) -> Result<Option<AppointmentRecord>, BookingError> {
        let mut state = self.state.lock().unwrap();
        let Some(a) = state
            .appointments
            .iter_mut()
            .find(|a| a.appointment_id == appointment_id && a.status == from)
        else {
            return Ok(None);
        };
        a.status = to;
        if let Some(outcome) = outcome {
            a.diagnosis = outcome.diagnosis.clone();
            a.prescription = outcome.prescription.clone();
        }
        a.updated_at = Utc::now();
        Ok(Some(a.clone()))
    }

    async fn review_exists(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        appointment_id: Option<Uuid>,
    ) -> Result<bool, BookingError> {
        let state = self.state.lock().unwrap();
        Ok(state.reviews.iter().any(|r| {
            r.doctor_id == doctor_id
                && r.patient_id == patient_id
                && r.appointment_id == appointment_id
        }))
    }

    async fn insert_review(&self, review: &NewReview) -> Result<ReviewRecord, BookingError> {
        let mut state = self.state.lock().unwrap();
        if state.reviews.iter().any(|r| {
            r.doctor_id == review.doctor_id
                && r.patient_id == review.patient_id
                && r.appointment_id == review.appointment_id
        }) {
            return Err(BookingError::DuplicateReview);
        }
        let now = Utc::now();
        let created = ReviewRecord {
            review_id: Uuid::new_v4(),
            doctor_id: review.doctor_id,
            patient_id: review.patient_id,
            appointment_id: review.appointment_id,
            rating: review.rating,
            comment: review.comment.clone(),
            created_at: now,
            updated_at: now,
        };
        state.reviews.push(created.clone());
        Ok(created)
    }

    async fn reminders_due(&self, date: NaiveDate) -> Result<Vec<ReminderPayload>, BookingError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .appointments
            .iter()
            .filter(|a| a.date == date && a.status == AppointmentStatus::Scheduled)
            .filter(|a| a.reminder_sent_at.is_none())
            .map(|a| ReminderPayload {
                appointment_id: a.appointment_id,
                recipient_email: format!("{}@patients.test", a.patient_id.simple()),
                patient_name: "Test Patient".into(),
                doctor_name: "Test Doctor".into(),
                date: a.date,
                time: a.time,
            })
            .collect())
    }

    async fn mark_reminded(&self, appointment_id: Uuid) -> Result<(), BookingError> {
        let mut state = self.state.lock().unwrap();
        if let Some(a) = state
            .appointments
            .iter_mut()
            .find(|a| a.appointment_id == appointment_id)
        {
            a.reminder_sent_at = Some(Utc::now());
        }
        Ok(())
    }
}
