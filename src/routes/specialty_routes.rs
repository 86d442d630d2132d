// src/routes/specialty_routes.rs

use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::ApiError,
    models::{ApiOk, AppState, SpecialtyRow},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/specialties", get(list_specialties))
}

pub(crate) const SPECIALTY_SELECT: &str = r#"
    SELECT
      s.specialty_id,
      s.name,
      s.slug,
      s.description,
      s.icon,
      (SELECT COUNT(*)
         FROM doctor d
        WHERE d.specialty_id = s.specialty_id
          AND d.is_active) AS doctor_count,
      (SELECT ROUND(AVG(r.rating)::numeric, 1)::float8
         FROM review r
         JOIN doctor d ON d.doctor_id = r.doctor_id
        WHERE d.specialty_id = s.specialty_id
          AND d.is_active) AS average_rating
    FROM specialty s
"#;

/// GET /specialties
pub async fn list_specialties(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<Vec<SpecialtyRow>>>, ApiError> {
    let rows = sqlx::query_as::<_, SpecialtyRow>(&format!("{SPECIALTY_SELECT} ORDER BY s.name ASC"))
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}
