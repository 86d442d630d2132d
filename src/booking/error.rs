use thiserror::Error;

use super::lifecycle::AppointmentStatus;

/// Everything the booking core can refuse. All variants except `Storage` are
/// input errors the requester can correct.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookingError {
    #[error("the selected time is already taken, please choose another slot")]
    SlotTaken,

    #[error("appointments cannot be booked for a past date")]
    PastDate,

    #[error("appointments are held from 09:00 to 18:00")]
    OutsideHours,

    #[error("the clinic is closed on weekends")]
    ClosedOnWeekend,

    #[error("appointments start on the hour or half hour")]
    NotOnSlotBoundary,

    #[error("appointment cannot move from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("{0}")]
    PermissionDenied(&'static str),

    #[error("file is too large, the maximum size is 5MB")]
    FileTooLarge,

    #[error("unsupported file type, allowed: PDF, JPG, PNG")]
    UnsupportedFileType,

    #[error("you have already reviewed this doctor for this visit")]
    DuplicateReview,

    #[error("rating must be between 1 and 5")]
    InvalidRating,

    #[error("patient must be at least 18 years old")]
    Underage,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage error: {0}")]
    Storage(String),
}

impl BookingError {
    /// Stable machine-readable code returned in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::SlotTaken => "SLOT_TAKEN",
            BookingError::PastDate => "PAST_DATE",
            BookingError::OutsideHours => "OUTSIDE_HOURS",
            BookingError::ClosedOnWeekend => "CLOSED_ON_WEEKEND",
            BookingError::NotOnSlotBoundary => "NOT_ON_SLOT_BOUNDARY",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::PermissionDenied(_) => "PERMISSION_DENIED",
            BookingError::FileTooLarge => "FILE_TOO_LARGE",
            BookingError::UnsupportedFileType => "UNSUPPORTED_FILE_TYPE",
            BookingError::DuplicateReview => "DUPLICATE_REVIEW",
            BookingError::InvalidRating => "INVALID_RATING",
            BookingError::Underage => "UNDERAGE",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::Storage(_) => "STORAGE",
        }
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(e: sqlx::Error) -> Self {
        BookingError::Storage(e.to_string())
    }
}
