use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike, Weekday};
use uuid::Uuid;

use super::error::BookingError;
use super::store::BookingStore;

/// First bookable hour (inclusive).
pub const OPENING_HOUR: u32 = 9;
/// Closing hour (exclusive).
pub const CLOSING_HOUR: u32 = 18;
pub const SLOT_MINUTES: u32 = 30;

/// The 18 half-hour slots between opening and closing, ascending.
pub fn canonical_slots() -> Vec<NaiveTime> {
    (OPENING_HOUR..CLOSING_HOUR)
        .flat_map(|h| [0, SLOT_MINUTES].into_iter().map(move |m| (h, m)))
        .filter_map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
        .collect()
}

pub fn is_within_hours(time: NaiveTime) -> bool {
    (OPENING_HOUR..CLOSING_HOUR).contains(&time.hour())
}

pub fn is_slot_boundary(time: NaiveTime) -> bool {
    time.minute() % SLOT_MINUTES == 0 && time.second() == 0 && time.nanosecond() == 0
}

/// Monday to Friday. Both the validator and the available-dates listing go
/// through this.
pub fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Canonical slots minus the booked set. Pure; duplicates or off-grid
/// entries in `booked` are harmless.
pub fn free_slots<I>(booked: I) -> Vec<NaiveTime>
where
    I: IntoIterator<Item = NaiveTime>,
{
    let booked: BTreeSet<NaiveTime> = booked.into_iter().collect();
    canonical_slots()
        .into_iter()
        .filter(|slot| !booked.contains(slot))
        .collect()
}

/// Free slots of `doctor_id` on `date`. Only scheduled appointments block a
/// slot; no restriction is placed on the date itself.
pub async fn available_slots<S>(
    store: &S,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<NaiveTime>, BookingError>
where
    S: BookingStore + ?Sized,
{
    let booked = store.scheduled_times(doctor_id, date).await?;
    Ok(free_slots(booked))
}

/// Working days in `[from, from + days)` with at least one free slot.
pub async fn available_dates<S>(
    store: &S,
    doctor_id: Uuid,
    from: NaiveDate,
    days: i64,
) -> Result<Vec<NaiveDate>, BookingError>
where
    S: BookingStore + ?Sized,
{
    let mut dates = Vec::new();
    for offset in 0..days {
        let date = from + Duration::days(offset);
        if !is_working_day(date) {
            continue;
        }
        if !available_slots(store, doctor_id, date).await?.is_empty() {
            dates.push(date);
        }
    }
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::lifecycle::AppointmentStatus;
    use crate::booking::memory::MemoryStore;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn canonical_day_has_eighteen_ascending_slots() {
        let slots = canonical_slots();
        assert_eq!(slots.len(), 18);
        assert_eq!(slots.first(), Some(&t(9, 0)));
        assert_eq!(slots.last(), Some(&t(17, 30)));
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn free_slots_ignores_duplicates_and_off_grid_times() {
        let free = free_slots([t(10, 0), t(10, 0), t(7, 0), t(10, 15)]);
        assert_eq!(free.len(), 17);
        assert!(!free.contains(&t(10, 0)));
    }

    #[test]
    fn hours_and_boundaries() {
        assert!(is_within_hours(t(9, 0)));
        assert!(is_within_hours(t(17, 59)));
        assert!(!is_within_hours(t(8, 59)));
        assert!(!is_within_hours(t(18, 0)));

        assert!(is_slot_boundary(t(9, 30)));
        assert!(!is_slot_boundary(t(9, 15)));
        assert!(!is_slot_boundary(NaiveTime::from_hms_opt(9, 0, 1).unwrap()));
    }

    #[test]
    fn weekends_are_not_working_days() {
        // 2024-06-08 is a Saturday
        assert!(!is_working_day(d(2024, 6, 8)));
        assert!(!is_working_day(d(2024, 6, 9)));
        assert!(is_working_day(d(2024, 6, 10)));
    }

    #[tokio::test]
    async fn booked_slot_is_excluded() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let patient = store.add_patient();
        let day = d(2024, 6, 10);
        store.seed_appointment(doctor, patient, day, t(10, 0), AppointmentStatus::Scheduled);

        let slots = available_slots(&store, doctor, day).await.unwrap();

        assert_eq!(slots.len(), 17);
        assert!(!slots.contains(&t(10, 0)));
        assert_eq!(&slots[..3], &[t(9, 0), t(9, 30), t(10, 30)]);
        assert_eq!(slots.last(), Some(&t(17, 30)));
    }

    #[tokio::test]
    async fn canceled_and_completed_appointments_do_not_block() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let patient = store.add_patient();
        let day = d(2024, 6, 10);
        store.seed_appointment(doctor, patient, day, t(9, 0), AppointmentStatus::Canceled);
        store.seed_appointment(doctor, patient, day, t(9, 30), AppointmentStatus::Completed);

        let slots = available_slots(&store, doctor, day).await.unwrap();
        assert_eq!(slots, canonical_slots());
    }

    #[tokio::test]
    async fn other_doctors_and_days_do_not_block() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let other = store.add_doctor(true);
        let patient = store.add_patient();
        let monday = d(2024, 6, 10);
        let tuesday = d(2024, 6, 11);
        store.seed_appointment(other, patient, monday, t(9, 0), AppointmentStatus::Scheduled);
        store.seed_appointment(doctor, patient, tuesday, t(9, 0), AppointmentStatus::Scheduled);

        let slots = available_slots(&store, doctor, monday).await.unwrap();
        assert_eq!(slots.len(), 18);
    }

    #[tokio::test]
    async fn fully_booked_day_is_empty_and_skipped_in_dates() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let patient = store.add_patient();
        let monday = d(2024, 6, 10);
        for slot in canonical_slots() {
            store.seed_appointment(doctor, patient, monday, slot, AppointmentStatus::Scheduled);
        }

        assert!(available_slots(&store, doctor, monday).await.unwrap().is_empty());

        // Mon 10 .. Sun 16: Monday is full, the weekend is closed.
        let dates = available_dates(&store, doctor, monday, 7).await.unwrap();
        assert_eq!(
            dates,
            vec![d(2024, 6, 11), d(2024, 6, 12), d(2024, 6, 13), d(2024, 6, 14)]
        );
    }

    #[tokio::test]
    async fn repeated_calls_are_identical() {
        let store = MemoryStore::new();
        let doctor = store.add_doctor(true);
        let patient = store.add_patient();
        let day = d(2024, 6, 10);
        store.seed_appointment(doctor, patient, day, t(12, 30), AppointmentStatus::Scheduled);

        let first = available_slots(&store, doctor, day).await.unwrap();
        let second = available_slots(&store, doctor, day).await.unwrap();
        assert_eq!(first, second);
    }
}
