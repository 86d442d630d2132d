// src/routes/admin_routes.rs

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    routing::{delete, patch, post, put},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{check_credentials, hash_password},
    booking::documents::{PhotoOwner, is_uploaded_photo},
    db::{is_foreign_key_violation, is_unique_violation},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, DoctorDetailRow, OkData, SpecialtyRow},
    routes::{
        doctor_routes::load_doctor,
        document_routes::{
            UploadQuery, remove_document, save_photo, settle_photo_swap, upload_body_limit,
        },
        specialty_routes::SPECIALTY_SELECT,
    },
};

pub const MAX_EXPERIENCE_YEARS: i16 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/specialties", post(create_specialty))
        .route("/admin/specialties/{specialty_id}", delete(delete_specialty))
        .route("/admin/doctors", post(create_doctor))
        .route(
            "/admin/doctors/{doctor_id}",
            patch(update_doctor).delete(delete_doctor),
        )
        .route(
            "/admin/doctors/{doctor_id}/photo",
            put(upload_doctor_photo).layer(upload_body_limit()),
        )
        .route("/admin/patients/{patient_id}", delete(delete_patient))
}

/* ============================================================
   Validation helpers
   ============================================================ */

/// Lower-case ASCII words joined by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn check_experience(years: i16) -> Result<(), ApiError> {
    if (0..=MAX_EXPERIENCE_YEARS).contains(&years) {
        Ok(())
    } else {
        Err(ApiError::validation(format!(
            "experience must be between 0 and {MAX_EXPERIENCE_YEARS} years"
        )))
    }
}

fn conflict_on_unique(what: &'static str) -> impl Fn(sqlx::Error) -> ApiError {
    move |e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("ALREADY_EXISTS", format!("{what} already exists"))
        } else {
            ApiError::db(e)
        }
    }
}

/* ============================================================
   Specialties
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateSpecialtyRequest {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

pub async fn create_specialty(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateSpecialtyRequest>,
) -> Result<Json<ApiOk<SpecialtyRow>>, ApiError> {
    auth.require_staff()?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    let slug = slugify(req.slug.as_deref().unwrap_or(name));
    if slug.is_empty() {
        return Err(ApiError::validation("slug must contain letters or digits"));
    }

    let specialty_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO specialty (name, slug, description, icon)
        VALUES ($1, $2, $3, $4)
        RETURNING specialty_id
        "#,
    )
    .bind(name)
    .bind(&slug)
    .bind(req.description.trim())
    .bind(req.icon.trim())
    .fetch_one(&state.db)
    .await
    .map_err(conflict_on_unique("specialty"))?;

    let row = sqlx::query_as::<_, SpecialtyRow>(&format!(
        "{SPECIALTY_SELECT} WHERE s.specialty_id = $1"
    ))
    .bind(specialty_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(%specialty_id, %slug, "specialty created");
    Ok(Json(ApiOk::new(row)))
}

pub async fn delete_specialty(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(specialty_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    auth.require_staff()?;

    let res = sqlx::query(r#"DELETE FROM specialty WHERE specialty_id = $1"#)
        .bind(specialty_id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                ApiError::Conflict("IN_USE", "specialty still has doctors".into())
            } else {
                ApiError::db(e)
            }
        })?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "specialty not found".into()));
    }
    Ok(Json(ApiOk::new(OkData { ok: true })))
}

/* ============================================================
   Doctors
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateDoctorRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub specialty_id: Uuid,
    pub experience: i16,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub education: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDoctorRequest {
    pub specialty_id: Option<Uuid>,
    pub experience: Option<i16>,
    pub bio: Option<String>,
    pub education: Option<String>,
    pub is_active: Option<bool>,
}

/// Creates the login and the doctor profile in one transaction.
pub async fn create_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateDoctorRequest>,
) -> Result<Json<ApiOk<DoctorDetailRow>>, ApiError> {
    auth.require_staff()?;

    let username = req.username.trim();
    check_credentials(username, &req.password).map_err(ApiError::validation)?;
    check_experience(req.experience)?;
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::validation("a valid email is required"));
    }
    let password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO app_user (username, email, first_name, last_name, password_hash)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING user_id
        "#,
    )
    .bind(username)
    .bind(&email)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(&password_hash)
    .fetch_one(&mut *tx)
    .await
    .map_err(conflict_on_unique("account"))?;

    let doctor_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO doctor (user_id, specialty_id, bio, education, experience)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING doctor_id
        "#,
    )
    .bind(user_id)
    .bind(req.specialty_id)
    .bind(req.bio.trim())
    .bind(req.education.trim())
    .bind(req.experience)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            ApiError::validation("unknown specialty")
        } else {
            ApiError::db(e)
        }
    })?;

    tx.commit().await.map_err(ApiError::db)?;
    tracing::info!(%doctor_id, %user_id, "doctor created");

    Ok(Json(ApiOk::new(load_doctor(&state, doctor_id).await?)))
}

pub async fn update_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<UpdateDoctorRequest>,
) -> Result<Json<ApiOk<DoctorDetailRow>>, ApiError> {
    auth.require_staff()?;
    if let Some(years) = req.experience {
        check_experience(years)?;
    }

    let res = sqlx::query(
        r#"
        UPDATE doctor
        SET specialty_id = COALESCE($2, specialty_id),
            experience   = COALESCE($3, experience),
            bio          = COALESCE($4, bio),
            education    = COALESCE($5, education),
            is_active    = COALESCE($6, is_active),
            updated_at   = now()
        WHERE doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .bind(req.specialty_id)
    .bind(req.experience)
    .bind(req.bio.as_deref().map(str::trim))
    .bind(req.education.as_deref().map(str::trim))
    .bind(req.is_active)
    .execute(&state.db)
    .await
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            ApiError::validation("unknown specialty")
        } else {
            ApiError::db(e)
        }
    })?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "doctor not found".into()));
    }
    if let Some(active) = req.is_active {
        tracing::info!(%doctor_id, active, "doctor availability changed");
    }

    Ok(Json(ApiOk::new(load_doctor(&state, doctor_id).await?)))
}

/// PUT /admin/doctors/{doctor_id}/photo?filename=portrait.jpg with the raw
/// image as the body.
pub async fn upload_doctor_photo(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<ApiOk<DoctorDetailRow>>, ApiError> {
    auth.require_staff()?;

    let user_id: Uuid = sqlx::query_scalar(r#"SELECT user_id FROM doctor WHERE doctor_id = $1"#)
        .bind(doctor_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "doctor not found".into()))?;

    let stored =
        save_photo(&state.upload_dir, PhotoOwner::Doctor, user_id, &q.filename, &body).await?;

    let updated = sqlx::query_scalar::<_, Option<String>>(
        r#"
        UPDATE doctor d
        SET photo_path = $2,
            updated_at = now()
        FROM doctor old
        WHERE d.doctor_id = $1
          AND old.doctor_id = d.doctor_id
        RETURNING old.photo_path
        "#,
    )
    .bind(doctor_id)
    .bind(&stored)
    .fetch_optional(&state.db)
    .await;
    settle_photo_swap(&state.upload_dir, &stored, updated, "doctor").await?;

    tracing::info!(%doctor_id, photo = %stored, "doctor photo updated");
    Ok(Json(ApiOk::new(load_doctor(&state, doctor_id).await?)))
}

/// Refused while any appointment references the doctor; reviews go with it.
pub async fn delete_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    auth.require_staff()?;

    let photo: String =
        sqlx::query_scalar(r#"DELETE FROM doctor WHERE doctor_id = $1 RETURNING photo_path"#)
            .bind(doctor_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ApiError::Conflict(
                        "HAS_APPOINTMENTS",
                        "doctor has appointments; deactivate instead".into(),
                    )
                } else {
                    ApiError::db(e)
                }
            })?
            .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "doctor not found".into()))?;

    if is_uploaded_photo(&photo) {
        remove_document(&state.upload_dir, &photo).await;
    }
    tracing::info!(%doctor_id, "doctor deleted");
    Ok(Json(ApiOk::new(OkData { ok: true })))
}

/* ============================================================
   Patients
   ============================================================ */

/// Refused while any appointment references the patient; reviews and
/// documents are removed with it, including the stored files and photo.
pub async fn delete_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    auth.require_staff()?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let files: Vec<String> = sqlx::query_scalar(
        r#"SELECT file_path FROM medical_document WHERE patient_id = $1"#,
    )
    .bind(patient_id)
    .fetch_all(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let photo: Option<String> =
        sqlx::query_scalar(r#"DELETE FROM patient WHERE patient_id = $1 RETURNING photo_path"#)
            .bind(patient_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ApiError::Conflict("HAS_APPOINTMENTS", "patient has appointments".into())
                } else {
                    ApiError::db(e)
                }
            })?
            .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "patient not found".into()))?;

    tx.commit().await.map_err(ApiError::db)?;

    for file in files.iter().chain(photo.iter()) {
        remove_document(&state.upload_dir, file).await;
    }
    tracing::info!(%patient_id, documents = files.len(), "patient deleted");
    Ok(Json(ApiOk::new(OkData { ok: true })))
}
