use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use uuid::Uuid;

use crate::booking::{
    AppointmentRecord, AppointmentStatus, BookingError, BookingStore,
    lifecycle::VisitOutcome,
    reminders::ReminderPayload,
    review::{NewReview, ReviewRecord},
    validator::ValidatedBooking,
};

use super::{is_foreign_key_violation, is_unique_violation};

/// `BookingStore` over Postgres. Uniqueness is enforced by the partial
/// indexes `appointment_scheduled_slot_key`, `review_visit_key` and
/// `review_unlinked_key`.
#[derive(Clone)]
pub struct PgBookingStore {
    db: PgPool,
}

impl PgBookingStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Unique index hit means the slot was taken. A dangling reference means the
/// doctor or patient row is gone.
fn slot_conflict(e: sqlx::Error) -> BookingError {
    if is_unique_violation(&e) {
        BookingError::SlotTaken
    } else if is_foreign_key_violation(&e) {
        BookingError::NotFound(missing_party(&e))
    } else {
        BookingError::from(e)
    }
}

fn missing_party(e: &sqlx::Error) -> &'static str {
    match e {
        sqlx::Error::Database(db) if db.constraint() == Some("appointment_doctor_id_fkey") => {
            "doctor"
        }
        _ => "patient",
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn scheduled_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<NaiveTime>, BookingError> {
        let times: Vec<NaiveTime> = sqlx::query_scalar(
            r#"
            SELECT appt_time
            FROM appointment
            WHERE doctor_id = $1
              AND appt_date = $2
              AND status = $3
            ORDER BY appt_time ASC
            "#,
        )
        .bind(doctor_id)
        .bind(date)
        .bind(AppointmentStatus::Scheduled)
        .fetch_all(&self.db)
        .await?;

        Ok(times)
    }

    async fn slot_taken(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        exclude: Option<Uuid>,
    ) -> Result<bool, BookingError> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
              SELECT 1
              FROM appointment
              WHERE doctor_id = $1
                AND appt_date = $2
                AND appt_time = $3
                AND status = $4
                AND ($5::uuid IS NULL OR appointment_id <> $5)
            )
            "#,
        )
        .bind(doctor_id)
        .bind(date)
        .bind(time)
        .bind(AppointmentStatus::Scheduled)
        .bind(exclude)
        .fetch_one(&self.db)
        .await?;

        Ok(taken)
    }

    async fn doctor_accepts_bookings(&self, doctor_id: Uuid) -> Result<bool, BookingError> {
        let active: Option<bool> =
            sqlx::query_scalar(r#"SELECT is_active FROM doctor WHERE doctor_id = $1"#)
                .bind(doctor_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(active.unwrap_or(false))
    }

    async fn insert_appointment(
        &self,
        booking: &ValidatedBooking,
    ) -> Result<AppointmentRecord, BookingError> {
        let mut tx = self.db.begin().await?;

        // Re-check inside the transaction; the unique index still decides races.
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
              SELECT 1 FROM appointment
              WHERE doctor_id = $1 AND appt_date = $2 AND appt_time = $3 AND status = $4
            )
            "#,
        )
        .bind(booking.doctor_id())
        .bind(booking.date())
        .bind(booking.time())
        .bind(AppointmentStatus::Scheduled)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(BookingError::SlotTaken);
        }

        let row: AppointmentRecord = sqlx::query_as::<_, AppointmentRecord>(
            r#"
            INSERT INTO appointment (doctor_id, patient_id, appt_date, appt_time, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING appointment_id, doctor_id, patient_id, appt_date, appt_time, status,
                      notes, diagnosis, prescription, reminder_sent_at, created_at, updated_at
            "#,
        )
        .bind(booking.doctor_id())
        .bind(booking.patient_id())
        .bind(booking.date())
        .bind(booking.time())
        .bind(AppointmentStatus::Scheduled)
        .bind(booking.notes())
        .fetch_one(&mut *tx)
        .await
        .map_err(slot_conflict)?;

        tx.commit().await.map_err(slot_conflict)?;
        Ok(row)
    }

    async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        booking: &ValidatedBooking,
    ) -> Result<Option<AppointmentRecord>, BookingError> {
        // A moved appointment gets a fresh reminder.
        let row = sqlx::query_as::<_, AppointmentRecord>(
            r#"
            UPDATE appointment
            SET appt_date = $2,
                appt_time = $3,
                reminder_sent_at = NULL,
                updated_at = now()
            WHERE appointment_id = $1
              AND status = $4
            RETURNING appointment_id, doctor_id, patient_id, appt_date, appt_time, status,
                      notes, diagnosis, prescription, reminder_sent_at, created_at, updated_at
            "#,
        )
        .bind(appointment_id)
        .bind(booking.date())
        .bind(booking.time())
        .bind(AppointmentStatus::Scheduled)
        .fetch_optional(&self.db)
        .await
        .map_err(slot_conflict)?;

        Ok(row)
    }

    async fn find_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<AppointmentRecord>, BookingError> {
        let row = sqlx::query_as::<_, AppointmentRecord>(
            r#"
            SELECT appointment_id, doctor_id, patient_id, appt_date, appt_time, status,
                   notes, diagnosis, prescription, reminder_sent_at, created_at, updated_at
            FROM appointment
            WHERE appointment_id = $1
            "#,
        )
        .bind(appointment_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        outcome: Option<&VisitOutcome>,
    ) -> Result<Option<AppointmentRecord>, BookingError> {
        let row = sqlx::query_as::<_, AppointmentRecord>(
            r#"
            UPDATE appointment
            SET status = $3,
                diagnosis = COALESCE($4, diagnosis),
                prescription = COALESCE($5, prescription),
                updated_at = now()
            WHERE appointment_id = $1
              AND status = $2
            RETURNING appointment_id, doctor_id, patient_id, appt_date, appt_time, status,
                      notes, diagnosis, prescription, reminder_sent_at, created_at, updated_at
            "#,
        )
        .bind(appointment_id)
        .bind(from)
        .bind(to)
        .bind(outcome.map(|o| o.diagnosis.as_str()))
        .bind(outcome.map(|o| o.prescription.as_str()))
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    async fn review_exists(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        appointment_id: Option<Uuid>,
    ) -> Result<bool, BookingError> {
        // IS NOT DISTINCT FROM matches NULL against NULL
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
              SELECT 1
              FROM review
              WHERE doctor_id = $1
                AND patient_id = $2
                AND appointment_id IS NOT DISTINCT FROM $3
            )
            "#,
        )
        .bind(doctor_id)
        .bind(patient_id)
        .bind(appointment_id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    async fn insert_review(&self, review: &NewReview) -> Result<ReviewRecord, BookingError> {
        sqlx::query_as::<_, ReviewRecord>(
            r#"
            INSERT INTO review (doctor_id, patient_id, appointment_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING review_id, doctor_id, patient_id, appointment_id, rating, comment,
                      created_at, updated_at
            "#,
        )
        .bind(review.doctor_id)
        .bind(review.patient_id)
        .bind(review.appointment_id)
        .bind(review.rating)
        .bind(&review.comment)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BookingError::DuplicateReview
            } else {
                BookingError::from(e)
            }
        })
    }

    async fn reminders_due(&self, date: NaiveDate) -> Result<Vec<ReminderPayload>, BookingError> {
        let rows = sqlx::query_as::<_, ReminderPayload>(
            r#"
            SELECT
              a.appointment_id,
              pu.email AS recipient_email,
              COALESCE(NULLIF(TRIM(pu.first_name || ' ' || pu.last_name), ''), pu.username) AS patient_name,
              COALESCE(NULLIF(TRIM(du.first_name || ' ' || du.last_name), ''), du.username) AS doctor_name,
              a.appt_date,
              a.appt_time
            FROM appointment a
            JOIN patient p   ON p.patient_id = a.patient_id
            JOIN app_user pu ON pu.user_id = p.user_id
            JOIN doctor d    ON d.doctor_id = a.doctor_id
            JOIN app_user du ON du.user_id = d.user_id
            WHERE a.appt_date = $1
              AND a.status = $2
              AND a.reminder_sent_at IS NULL
            ORDER BY a.appt_time ASC
            "#,
        )
        .bind(date)
        .bind(AppointmentStatus::Scheduled)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn mark_reminded(&self, appointment_id: Uuid) -> Result<(), BookingError> {
        sqlx::query(
            r#"
            UPDATE appointment
            SET reminder_sent_at = now()
            WHERE appointment_id = $1
            "#,
        )
        .bind(appointment_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
