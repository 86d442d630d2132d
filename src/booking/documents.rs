use std::path::Path;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::BookingError;

pub const MAX_DOCUMENT_BYTES: u64 = 5 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];
pub const PHOTO_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const DEFAULT_DOCTOR_PHOTO: &str = "doctors/default.jpg";

/// Whose portrait a photo upload replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoOwner {
    Doctor,
    Patient,
}

impl PhotoOwner {
    fn folder_and_prefix(self) -> (&'static str, &'static str) {
        match self {
            PhotoOwner::Doctor => ("doctors", "doctor"),
            PhotoOwner::Patient => ("patients", "patient"),
        }
    }
}

/// Lower-cased extension after the last dot, if any.
pub fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn validate_upload(file_name: &str, size: u64, allowed: &[&str]) -> Result<String, BookingError> {
    if size > MAX_DOCUMENT_BYTES {
        return Err(BookingError::FileTooLarge);
    }
    match extension(file_name) {
        Some(ext) if allowed.contains(&ext.as_str()) => Ok(ext),
        _ => Err(BookingError::UnsupportedFileType),
    }
}

/// Size is checked before type. Returns the normalised extension.
pub fn validate_document(file_name: &str, size: u64) -> Result<String, BookingError> {
    validate_upload(file_name, size, &ALLOWED_EXTENSIONS)
}

/// Same size limit as documents, images only.
pub fn validate_photo(file_name: &str, size: u64) -> Result<String, BookingError> {
    validate_upload(file_name, size, &PHOTO_EXTENSIONS)
}

/// `doc_<patient>_<YYYYMMDDHHMMSS>.<ext>`, relative to the upload root.
pub fn storage_name(patient_id: Uuid, ext: &str, now: DateTime<Utc>) -> String {
    format!(
        "medical_documents/doc_{}_{}.{}",
        patient_id.simple(),
        now.format("%Y%m%d%H%M%S"),
        ext
    )
}

/// `doctors/doctor_<user>_<YYYYMMDDHHMMSS>.<ext>` or the `patients/` twin.
pub fn photo_name(owner: PhotoOwner, user_id: Uuid, ext: &str, now: DateTime<Utc>) -> String {
    let (folder, prefix) = owner.folder_and_prefix();
    format!(
        "{folder}/{prefix}_{}_{}.{ext}",
        user_id.simple(),
        now.format("%Y%m%d%H%M%S")
    )
}

/// Uploaded photos are removed when replaced; the shared placeholder is not.
pub fn is_uploaded_photo(path: &str) -> bool {
    !path.is_empty() && path != DEFAULT_DOCTOR_PHOTO
}

/// `512 B`, `1.5 KB`, `2.0 MB`.
pub fn human_size(size: u64) -> String {
    if size < 1024 {
        format!("{size} B")
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else {
        format!("{:.1} MB", size as f64 / (1024.0 * 1024.0))
    }
}

pub fn file_type(file_name: &str) -> String {
    extension(file_name).unwrap_or_default().to_ascii_uppercase()
}
