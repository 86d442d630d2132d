use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::booking::Role;
use crate::db::PgBookingStore;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
    pub upload_dir: PathBuf,
    pub clinic_name: String,
}

impl AppState {
    pub fn store(&self) -> PgBookingStore {
        PgBookingStore::new(self.db.clone())
    }
}

/// The clinic's calendar day. Booking rules compare against this, never UTC.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

impl<T> ApiOk<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordChangedData {
    pub ok: bool,
    pub sessions_revoked: u64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub address: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
    pub clinic: ClinicProfile,
}

#[derive(Debug, Serialize)]
pub struct MeResponseData {
    pub user: UserProfile,
    pub clinic: ClinicProfile,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct ClinicProfile {
    pub clinic_name: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_active: bool,
}

impl UserRow {
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name, &self.username)
    }
}

#[derive(Debug, FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SpecialtyRow {
    pub specialty_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub icon: String,
    pub doctor_count: i64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoctorSummary {
    pub doctor_id: Uuid,
    pub full_name: String,
    pub specialty_id: Uuid,
    pub specialty_name: String,
    pub photo_path: String,
    pub experience: i16,
    pub is_active: bool,
    pub average_rating: f64,
    pub review_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoctorDetailRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub summary: DoctorSummary,
    pub bio: String,
    pub education: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReviewWithAuthorRow {
    pub review_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub patient_name: String,
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientRow {
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub address: String,
    pub medical_history: String,
    pub photo_path: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub document_id: Uuid,
    pub file_path: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
}

/* -------------------------
   Helpers
--------------------------*/

/// "First Last", falling back to the username when both are blank.
pub fn full_name(first: &str, last: &str, username: &str) -> String {
    let joined = format!("{} {}", first.trim(), last.trim());
    let joined = joined.trim();
    if joined.is_empty() {
        username.to_string()
    } else {
        joined.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_falls_back_to_username() {
        assert_eq!(full_name("Anna", "Petrova", "anna"), "Anna Petrova");
        assert_eq!(full_name("Anna", "", "anna"), "Anna");
        assert_eq!(full_name(" ", "", "anna"), "anna");
    }
}
