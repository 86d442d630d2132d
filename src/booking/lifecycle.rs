use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::error::BookingError;
use super::role::Role;
use super::store::BookingStore;

/// Stored as smallint: 0 scheduled, 1 completed, 2 canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum AppointmentStatus {
    Scheduled = 0,
    Completed = 1,
    Canceled = 2,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AppointmentStatus::Scheduled)
    }

    /// Only `Scheduled -> Completed` and `Scheduled -> Canceled` exist.
    pub fn can_move_to(self, to: AppointmentStatus) -> bool {
        self == AppointmentStatus::Scheduled && to.is_terminal()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Canceled => write!(f, "canceled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentRecord {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    #[sqlx(rename = "appt_date")]
    pub date: NaiveDate,
    #[sqlx(rename = "appt_time")]
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub notes: String,
    pub diagnosis: String,
    pub prescription: String,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentRecord {
    pub const DURATION_MINUTES: i64 = 30;

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(Self::DURATION_MINUTES)
    }

    pub fn is_past_due(&self, now: NaiveDateTime) -> bool {
        self.starts_at() < now
    }
}

/// What the doctor writes down when closing a visit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitOutcome {
    pub diagnosis: String,
    pub prescription: String,
}

pub fn check_cancel(appointment: &AppointmentRecord, actor: &Role) -> Result<(), BookingError> {
    if !actor.acts_for_patient(appointment.patient_id) {
        return Err(BookingError::PermissionDenied(
            "only the patient or clinic staff can cancel this appointment",
        ));
    }
    check_transition(appointment.status, AppointmentStatus::Canceled)
}

pub fn check_complete(appointment: &AppointmentRecord, actor: &Role) -> Result<(), BookingError> {
    if !actor.is_staff() {
        return Err(BookingError::PermissionDenied(
            "only clinic staff can complete an appointment",
        ));
    }
    check_transition(appointment.status, AppointmentStatus::Completed)
}

fn check_transition(from: AppointmentStatus, to: AppointmentStatus) -> Result<(), BookingError> {
    if from.can_move_to(to) {
        Ok(())
    } else {
        Err(BookingError::InvalidTransition { from, to })
    }
}

pub async fn cancel<S>(
    store: &S,
    appointment_id: Uuid,
    actor: &Role,
) -> Result<AppointmentRecord, BookingError>
where
    S: BookingStore + ?Sized,
{
    transition(store, appointment_id, actor, AppointmentStatus::Canceled, None).await
}

pub async fn complete<S>(
    store: &S,
    appointment_id: Uuid,
    actor: &Role,
    outcome: VisitOutcome,
) -> Result<AppointmentRecord, BookingError>
where
    S: BookingStore + ?Sized,
{
    let outcome = VisitOutcome {
        diagnosis: outcome.diagnosis.trim().to_string(),
        prescription: outcome.prescription.trim().to_string(),
    };
    transition(store, appointment_id, actor, AppointmentStatus::Completed, Some(&outcome)).await
}

async fn transition<S>(
    store: &S,
    appointment_id: Uuid,
    actor: &Role,
    to: AppointmentStatus,
    outcome: Option<&VisitOutcome>,
) -> Result<AppointmentRecord, BookingError>
where
    S: BookingStore + ?Sized,
{
    let current = store
        .find_appointment(appointment_id)
        .await?
        .ok_or(BookingError::NotFound("appointment"))?;

    match to {
        AppointmentStatus::Canceled => check_cancel(&current, actor)?,
        AppointmentStatus::Completed => check_complete(&current, actor)?,
        AppointmentStatus::Scheduled => {
            return Err(BookingError::InvalidTransition { from: current.status, to });
        }
    }

    // The store only flips rows still in `from`, so a concurrent transition
    // that got there first surfaces as InvalidTransition, not a double write.
    let updated = store
        .transition(appointment_id, current.status, to, outcome)
        .await?;

    match updated {
        Some(record) => {
            info!(%appointment_id, from = %current.status, %to, "appointment status changed");
            Ok(record)
        }
        None => {
            let now = store
                .find_appointment(appointment_id)
                .await?
                .map(|a| a.status)
                .unwrap_or(to);
            Err(BookingError::InvalidTransition { from: now, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    use super::*;
    use crate::booking::memory::MemoryStore;

    fn seeded(status: AppointmentStatus) -> (MemoryStore, Uuid, Uuid) {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let patient = store.add_patient();
        let id = store.seed_appointment(
            doctor,
            patient,
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            status,
        );
        (store, id, patient)
    }

    #[test]
    fn only_scheduled_moves_and_only_to_terminal_states() {
        use AppointmentStatus::*;
        assert!(Scheduled.can_move_to(Completed));
        assert!(Scheduled.can_move_to(Canceled));
        assert!(!Scheduled.can_move_to(Scheduled));
        for from in [Completed, Canceled] {
            for to in [Scheduled, Completed, Canceled] {
                assert!(!from.can_move_to(to), "{from} -> {to}");
            }
        }
    }

    #[tokio::test]
    async fn owner_cancels_once_then_retry_is_rejected() {
        let (store, id, patient) = seeded(AppointmentStatus::Scheduled);
        let owner = Role::Patient { patient_id: patient };

        let canceled = cancel(&store, id, &owner).await.unwrap();
        assert_eq!(canceled.status, AppointmentStatus::Canceled);

        let retry = cancel(&store, id, &owner).await;
        assert_matches!(
            retry,
            Err(BookingError::InvalidTransition {
                from: AppointmentStatus::Canceled,
                to: AppointmentStatus::Canceled
            })
        );
    }

    #[tokio::test]
    async fn completed_appointment_cannot_be_canceled() {
        let (store, id, _) = seeded(AppointmentStatus::Completed);
        let result = cancel(&store, id, &Role::Staff).await;
        assert_matches!(result, Err(BookingError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn strangers_cannot_cancel() {
        let (store, id, _) = seeded(AppointmentStatus::Scheduled);
        let stranger = Role::Patient { patient_id: Uuid::new_v4() };

        assert_matches!(
            cancel(&store, id, &stranger).await,
            Err(BookingError::PermissionDenied(_))
        );
        assert_matches!(
            cancel(&store, id, &Role::Member).await,
            Err(BookingError::PermissionDenied(_))
        );
        let still = store.find_appointment(id).await.unwrap().unwrap();
        assert_eq!(still.status, AppointmentStatus::Scheduled);
    }

    #[tokio::test]
    async fn staff_completes_with_outcome() {
        let (store, id, _) = seeded(AppointmentStatus::Scheduled);
        let outcome = VisitOutcome {
            diagnosis: "  seasonal allergy ".into(),
            prescription: "antihistamine".into(),
        };

        let done = complete(&store, id, &Role::Staff, outcome).await.unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert_eq!(done.diagnosis, "seasonal allergy");
        assert_eq!(done.prescription, "antihistamine");

        assert_matches!(
            complete(&store, id, &Role::Staff, VisitOutcome::default()).await,
            Err(BookingError::InvalidTransition { from: AppointmentStatus::Completed, .. })
        );
    }

    #[tokio::test]
    async fn patients_cannot_complete() {
        let (store, id, patient) = seeded(AppointmentStatus::Scheduled);
        let owner = Role::Patient { patient_id: patient };
        assert_matches!(
            complete(&store, id, &owner, VisitOutcome::default()).await,
            Err(BookingError::PermissionDenied(_))
        );
    }

    #[tokio::test]
    async fn unknown_appointment_is_not_found() {
        let store = MemoryStore::new();
        assert_matches!(
            cancel(&store, Uuid::new_v4(), &Role::Staff).await,
            Err(BookingError::NotFound("appointment"))
        );
    }

    #[test]
    fn thirty_minute_visit_window() {
        let record = AppointmentRecord {
            appointment_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            time: NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
            status: AppointmentStatus::Scheduled,
            notes: String::new(),
            diagnosis: String::new(),
            prescription: String::new(),
            reminder_sent_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(record.ends_at().time(), NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        assert!(record.is_past_due(record.starts_at() + Duration::minutes(1)));
        assert!(!record.is_past_due(record.starts_at()));
    }
}
