// src/routes/profile_routes.rs

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    routing::{get, put},
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    booking::{documents::PhotoOwner, patient::ensure_adult},
    db::is_unique_violation,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, PatientRow, today},
    routes::document_routes::{UploadQuery, save_photo, settle_photo_swap, upload_body_limit},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).patch(update_profile))
        .route(
            "/profile/photo",
            put(upload_profile_photo).layer(upload_body_limit()),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub medical_history: Option<String>,
}

impl ProfilePatch {
    /// Trims text fields and applies the same rules as registration.
    fn normalized(self, today: NaiveDate) -> Result<Self, ApiError> {
        let trim = |v: Option<String>| v.map(|s| s.trim().to_string());
        let patch = Self {
            first_name: trim(self.first_name),
            last_name: trim(self.last_name),
            email: trim(self.email).map(|e| e.to_lowercase()),
            phone: trim(self.phone),
            birth_date: self.birth_date,
            address: trim(self.address),
            medical_history: trim(self.medical_history),
        };

        if let Some(email) = &patch.email {
            if !email.contains('@') {
                return Err(ApiError::validation("a valid email is required"));
            }
        }
        if let Some(phone) = &patch.phone {
            if phone.is_empty() || phone.chars().count() > 20 {
                return Err(ApiError::validation("phone must be 1-20 characters"));
            }
        }
        if matches!(&patch.address, Some(a) if a.is_empty()) {
            return Err(ApiError::validation("address cannot be empty"));
        }
        if let Some(birth_date) = patch.birth_date {
            ensure_adult(birth_date, today)?;
        }
        Ok(patch)
    }
}

pub(crate) async fn load_patient(
    state: &AppState,
    patient_id: Uuid,
) -> Result<PatientRow, ApiError> {
    sqlx::query_as::<_, PatientRow>(
        r#"
        SELECT
          p.patient_id,
          p.user_id,
          COALESCE(NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''), u.username) AS full_name,
          u.email,
          p.phone,
          p.birth_date,
          p.address,
          p.medical_history,
          p.photo_path
        FROM patient p
        JOIN app_user u ON u.user_id = p.user_id
        WHERE p.patient_id = $1
        "#,
    )
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "patient not found".into()))
}

/// GET /profile
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<PatientRow>>, ApiError> {
    let patient_id = auth.require_patient()?;
    Ok(Json(ApiOk::new(load_patient(&state, patient_id).await?)))
}

/// PATCH /profile
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<ApiOk<PatientRow>>, ApiError> {
    let patient_id = auth.require_patient()?;
    let patch = patch.normalized(today())?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(
        r#"
        UPDATE app_user
        SET first_name = COALESCE($2, first_name),
            last_name  = COALESCE($3, last_name),
            email      = COALESCE($4, email)
        WHERE user_id = $1
        "#,
    )
    .bind(auth.user_id)
    .bind(patch.first_name.as_deref())
    .bind(patch.last_name.as_deref())
    .bind(patch.email.as_deref())
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("ACCOUNT_EXISTS", "email is already registered".into())
        } else {
            ApiError::db(e)
        }
    })?;

    sqlx::query(
        r#"
        UPDATE patient
        SET phone           = COALESCE($2, phone),
            birth_date      = COALESCE($3, birth_date),
            address         = COALESCE($4, address),
            medical_history = COALESCE($5, medical_history),
            updated_at      = now()
        WHERE patient_id = $1
        "#,
    )
    .bind(patient_id)
    .bind(patch.phone.as_deref())
    .bind(patch.birth_date)
    .bind(patch.address.as_deref())
    .bind(patch.medical_history.as_deref())
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(load_patient(&state, patient_id).await?)))
}

/// PUT /profile/photo?filename=me.jpg with the raw image as the body.
pub async fn upload_profile_photo(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<ApiOk<PatientRow>>, ApiError> {
    let patient_id = auth.require_patient()?;
    let stored = save_photo(
        &state.upload_dir,
        PhotoOwner::Patient,
        auth.user_id,
        &q.filename,
        &body,
    )
    .await?;

    // `old` is read from the statement snapshot, so it still holds the
    // previous path
    let updated = sqlx::query_scalar::<_, Option<String>>(
        r#"
        UPDATE patient p
        SET photo_path = $2,
            updated_at = now()
        FROM patient old
        WHERE p.patient_id = $1
          AND old.patient_id = p.patient_id
        RETURNING old.photo_path
        "#,
    )
    .bind(patient_id)
    .bind(&stored)
    .fetch_optional(&state.db)
    .await;
    settle_photo_swap(&state.upload_dir, &stored, updated, "patient").await?;

    tracing::info!(%patient_id, photo = %stored, "patient photo updated");
    Ok(Json(ApiOk::new(load_patient(&state, patient_id).await?)))
}
