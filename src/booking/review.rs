use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::BookingError;
use super::role::Role;
use super::store::BookingStore;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub rating: i16,
    #[serde(default)]
    pub comment: String,
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub rating: i16,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReviewRecord {
    pub review_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `★★★☆☆` for a rating of 3.
pub fn rating_stars(rating: i16) -> String {
    let filled = rating.clamp(0, MAX_RATING) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(MAX_RATING as usize - filled))
}

pub fn validate_rating(rating: i16) -> Result<(), BookingError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(BookingError::InvalidRating)
    }
}

/// A linked appointment must exist and be this patient's visit to this
/// doctor.
async fn check_linked_visit<S>(
    store: &S,
    patient_id: Uuid,
    doctor_id: Uuid,
    appointment_id: Option<Uuid>,
) -> Result<(), BookingError>
where
    S: BookingStore + ?Sized,
{
    let Some(appointment_id) = appointment_id else {
        return Ok(());
    };
    let appointment = store
        .find_appointment(appointment_id)
        .await?
        .ok_or(BookingError::NotFound("appointment"))?;
    if appointment.patient_id != patient_id || appointment.doctor_id != doctor_id {
        return Err(BookingError::PermissionDenied(
            "the appointment does not belong to you and this doctor",
        ));
    }
    Ok(())
}

/// False when `submit_review` would refuse the same triple: the linked
/// appointment is not this patient's visit to this doctor, or a review
/// already exists. A missing appointment is its own bucket: one free-floating
/// review per doctor/patient pair.
///
/// Appointment status is not consulted.
pub async fn can_review<S>(
    store: &S,
    patient_id: Uuid,
    doctor_id: Uuid,
    appointment_id: Option<Uuid>,
) -> Result<bool, BookingError>
where
    S: BookingStore + ?Sized,
{
    match check_linked_visit(store, patient_id, doctor_id, appointment_id).await {
        Ok(()) => {}
        Err(BookingError::NotFound(_) | BookingError::PermissionDenied(_)) => return Ok(false),
        Err(e) => return Err(e),
    }
    Ok(!store
        .review_exists(doctor_id, patient_id, appointment_id)
        .await?)
}

pub async fn submit_review<S>(
    store: &S,
    actor: &Role,
    doctor_id: Uuid,
    request: ReviewRequest,
) -> Result<ReviewRecord, BookingError>
where
    S: BookingStore + ?Sized,
{
    let patient_id = actor.patient_id().ok_or(BookingError::PermissionDenied(
        "only patients can leave reviews",
    ))?;
    validate_rating(request.rating)?;
    check_linked_visit(store, patient_id, doctor_id, request.appointment_id).await?;

    if store
        .review_exists(doctor_id, patient_id, request.appointment_id)
        .await?
    {
        return Err(BookingError::DuplicateReview);
    }

    store
        .insert_review(&NewReview {
            doctor_id,
            patient_id,
            appointment_id: request.appointment_id,
            rating: request.rating,
            comment: request.comment.trim().to_string(),
        })
        .await
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::booking::lifecycle::AppointmentStatus;
    use crate::booking::memory::MemoryStore;

    fn req(rating: i16, appointment_id: Option<Uuid>) -> ReviewRequest {
        ReviewRequest {
            rating,
            comment: "attentive and thorough".into(),
            appointment_id,
        }
    }

    fn visit(store: &MemoryStore, doctor: Uuid, patient: Uuid, hour: u32) -> Uuid {
        store.seed_appointment(
            doctor,
            patient,
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            AppointmentStatus::Completed,
        )
    }

    #[test]
    fn stars() {
        assert_eq!(rating_stars(3), "★★★☆☆");
        assert_eq!(rating_stars(5), "★★★★★");
        assert_eq!(rating_stars(1), "★☆☆☆☆");
    }

    #[test]
    fn rating_bounds() {
        assert_eq!(validate_rating(0), Err(BookingError::InvalidRating));
        assert_eq!(validate_rating(6), Err(BookingError::InvalidRating));
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
    }

    #[tokio::test]
    async fn eligibility_flips_after_review() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let patient = store.add_patient();
        let appt = visit(&store, doctor, patient, 9);
        let actor = Role::Patient { patient_id: patient };

        assert!(can_review(&store, patient, doctor, Some(appt)).await.unwrap());
        submit_review(&store, &actor, doctor, req(5, Some(appt))).await.unwrap();
        assert!(!can_review(&store, patient, doctor, Some(appt)).await.unwrap());

        // a different visit, or no visit at all, is still open
        let second = visit(&store, doctor, patient, 10);
        assert!(can_review(&store, patient, doctor, Some(second)).await.unwrap());
        assert!(can_review(&store, patient, doctor, None).await.unwrap());
    }

    #[tokio::test]
    async fn one_free_floating_review_per_pair() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let patient = store.add_patient();
        let actor = Role::Patient { patient_id: patient };

        submit_review(&store, &actor, doctor, req(4, None)).await.unwrap();
        assert!(!can_review(&store, patient, doctor, None).await.unwrap());
        assert_matches!(
            submit_review(&store, &actor, doctor, req(2, None)).await,
            Err(BookingError::DuplicateReview)
        );
    }

    #[tokio::test]
    async fn store_rejects_duplicate_triple() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let patient = store.add_patient();
        let review = NewReview {
            doctor_id: doctor,
            patient_id: patient,
            appointment_id: None,
            rating: 3,
            comment: String::new(),
        };
        store.insert_review(&review).await.unwrap();
        assert_matches!(store.insert_review(&review).await, Err(BookingError::DuplicateReview));
    }

    #[tokio::test]
    async fn foreign_appointment_is_refused() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let other_doctor = store.add_doctor(true);
        let patient = store.add_patient();
        let appt = visit(&store, other_doctor, patient, 9);
        let actor = Role::Patient { patient_id: patient };

        assert_matches!(
            submit_review(&store, &actor, doctor, req(5, Some(appt))).await,
            Err(BookingError::PermissionDenied(_))
        );
    }

    #[tokio::test]
    async fn eligibility_agrees_with_submission_for_other_visits() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let me = store.add_patient();
        let someone_else = store.add_patient();
        let theirs = visit(&store, doctor, someone_else, 9);
        let actor = Role::Patient { patient_id: me };

        assert!(!can_review(&store, me, doctor, Some(theirs)).await.unwrap());
        assert_matches!(
            submit_review(&store, &actor, doctor, req(5, Some(theirs))).await,
            Err(BookingError::PermissionDenied(_))
        );

        // an appointment id that does not exist is not reviewable either
        assert!(!can_review(&store, me, doctor, Some(Uuid::new_v4())).await.unwrap());
    }

    #[tokio::test]
    async fn only_patients_with_valid_ratings() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let patient = store.add_patient();

        assert_matches!(
            submit_review(&store, &Role::Staff, doctor, req(5, None)).await,
            Err(BookingError::PermissionDenied(_))
        );
        let actor = Role::Patient { patient_id: patient };
        assert_matches!(
            submit_review(&store, &actor, doctor, req(9, None)).await,
            Err(BookingError::InvalidRating)
        );
    }
}
