use chrono::NaiveDate;

use super::error::BookingError;

pub const ADULT_AGE: i64 = 18;

/// Age in whole 365-day years.
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> i64 {
    (today - birth_date).num_days().div_euclid(365)
}

pub fn ensure_adult(birth_date: NaiveDate, today: NaiveDate) -> Result<(), BookingError> {
    if age_on(birth_date, today) < ADULT_AGE {
        return Err(BookingError::Underage);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn counts_365_day_years() {
        assert_eq!(age_on(d(2000, 1, 1), d(2024, 6, 10)), 24);
        // 18 * 365 days after birth, leap days push the calendar birthday later
        let born = d(2006, 6, 10);
        assert_eq!(age_on(born, born + chrono::Duration::days(18 * 365)), 18);
        assert_eq!(age_on(born, born + chrono::Duration::days(18 * 365 - 1)), 17);
    }

    #[test]
    fn minors_are_rejected() {
        let today = d(2024, 6, 10);
        assert_eq!(ensure_adult(d(2010, 1, 1), today), Err(BookingError::Underage));
        assert_eq!(ensure_adult(today, today), Err(BookingError::Underage));
        assert!(ensure_adult(d(1990, 3, 3), today).is_ok());
    }
}
