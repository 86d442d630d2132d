// src/routes/doctor_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    booking::{
        review::{self, ReviewRecord, ReviewRequest, rating_stars},
        slots::{self, available_dates, available_slots},
    },
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, DoctorDetailRow, DoctorSummary, ReviewWithAuthorRow, today},
};

/// How far ahead the booking calendar looks.
pub const BOOKING_HORIZON_DAYS: i64 = 14;
const MAX_HORIZON_DAYS: i64 = 60;
const LATEST_REVIEWS: i64 = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(list_doctors))
        .route("/doctors/{doctor_id}", get(get_doctor))
        .route("/doctors/{doctor_id}/available-dates", get(get_available_dates))
        .route("/doctors/{doctor_id}/available-times/{date}", get(get_available_times))
        .route("/doctors/{doctor_id}/reviews", get(list_reviews).post(create_review))
        .route("/doctors/{doctor_id}/reviews/eligibility", get(review_eligibility))
}

/* ============================================================
   SQL
   ============================================================ */

pub(crate) const DOCTOR_SELECT: &str = r#"
    SELECT
      d.doctor_id,
      COALESCE(NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''), u.username) AS full_name,
      d.specialty_id,
      s.name AS specialty_name,
      d.photo_path,
      d.experience,
      d.is_active,
      COALESCE(rs.average_rating, 0)::float8 AS average_rating,
      COALESCE(rs.review_count, 0) AS review_count,
      d.bio,
      d.education
    FROM doctor d
    JOIN app_user u ON u.user_id = d.user_id
    JOIN specialty s ON s.specialty_id = d.specialty_id
    LEFT JOIN (
      SELECT doctor_id,
             ROUND(AVG(rating)::numeric, 1) AS average_rating,
             COUNT(*) AS review_count
      FROM review
      GROUP BY doctor_id
    ) rs ON rs.doctor_id = d.doctor_id
"#;

pub(crate) async fn load_doctor(
    state: &AppState,
    doctor_id: Uuid,
) -> Result<DoctorDetailRow, ApiError> {
    sqlx::query_as::<_, DoctorDetailRow>(&format!("{DOCTOR_SELECT} WHERE d.doctor_id = $1"))
        .bind(doctor_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "doctor not found".into()))
}

/// Inactive doctors are hidden from the public catalogue.
async fn load_visible_doctor(
    state: &AppState,
    doctor_id: Uuid,
) -> Result<DoctorDetailRow, ApiError> {
    let doctor = load_doctor(state, doctor_id).await?;
    if !doctor.summary.is_active {
        return Err(ApiError::NotFound("NOT_FOUND", "doctor not found".into()));
    }
    Ok(doctor)
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoctorSort {
    #[default]
    Rating,
    Experience,
    Name,
}

impl DoctorSort {
    fn order_by(self) -> &'static str {
        match self {
            DoctorSort::Rating => "average_rating DESC, review_count DESC, full_name ASC",
            DoctorSort::Experience => "d.experience DESC, full_name ASC",
            DoctorSort::Name => "full_name ASC",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    /// Specialty slug.
    pub specialty: Option<String>,
    #[serde(default)]
    pub sort: DoctorSort,
}

#[derive(Debug, Deserialize)]
pub struct HorizonQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EligibilityQuery {
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReviewDto {
    pub review_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub patient_name: String,
    pub rating: i16,
    pub stars: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl From<ReviewWithAuthorRow> for ReviewDto {
    fn from(r: ReviewWithAuthorRow) -> Self {
        Self {
            stars: rating_stars(r.rating),
            review_id: r.review_id,
            appointment_id: r.appointment_id,
            patient_name: r.patient_name,
            rating: r.rating,
            comment: r.comment,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorDetailDto {
    #[serde(flatten)]
    pub doctor: DoctorDetailRow,
    pub latest_reviews: Vec<ReviewDto>,
    pub available_dates: Vec<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct AvailableTimesDto {
    pub date: NaiveDate,
    pub times: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EligibilityDto {
    pub can_review: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedReviewDto {
    #[serde(flatten)]
    pub review: ReviewRecord,
    pub stars: String,
}

fn format_times(times: &[NaiveTime]) -> Vec<String> {
    times.iter().map(|t| t.format("%H:%M").to_string()).collect()
}

async fn fetch_reviews(
    state: &AppState,
    doctor_id: Uuid,
    limit: Option<i64>,
) -> Result<Vec<ReviewDto>, ApiError> {
    let rows = sqlx::query_as::<_, ReviewWithAuthorRow>(
        r#"
        SELECT
          r.review_id,
          r.appointment_id,
          COALESCE(NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''), u.username) AS patient_name,
          r.rating,
          r.comment,
          r.created_at
        FROM review r
        JOIN patient p ON p.patient_id = r.patient_id
        JOIN app_user u ON u.user_id = p.user_id
        WHERE r.doctor_id = $1
        ORDER BY r.created_at DESC
        LIMIT $2
        "#,
    )
    .bind(doctor_id)
    .bind(limit)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(rows.into_iter().map(ReviewDto::from).collect())
}

/* ============================================================
   GET /doctors
   ============================================================ */

pub async fn list_doctors(
    State(state): State<AppState>,
    Query(q): Query<DoctorListQuery>,
) -> Result<Json<ApiOk<Vec<DoctorSummary>>>, ApiError> {
    let specialty = q
        .specialty
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let sql = format!(
        "{DOCTOR_SELECT} WHERE d.is_active AND ($1::text IS NULL OR s.slug = $1) ORDER BY {}",
        q.sort.order_by()
    );
    let rows = sqlx::query_as::<_, DoctorDetailRow>(&sql)
        .bind(specialty)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows.into_iter().map(|r| r.summary).collect())))
}

/* ============================================================
   GET /doctors/{doctor_id}
   ============================================================ */

pub async fn get_doctor(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<DoctorDetailDto>>, ApiError> {
    let doctor = load_visible_doctor(&state, doctor_id).await?;
    let latest_reviews = fetch_reviews(&state, doctor_id, Some(LATEST_REVIEWS)).await?;
    let dates = available_dates(&state.store(), doctor_id, today(), BOOKING_HORIZON_DAYS).await?;

    Ok(Json(ApiOk::new(DoctorDetailDto {
        doctor,
        latest_reviews,
        available_dates: dates,
    })))
}

/* ============================================================
   GET /doctors/{doctor_id}/available-dates
   ============================================================ */

pub async fn get_available_dates(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
    Query(q): Query<HorizonQuery>,
) -> Result<Json<ApiOk<Vec<NaiveDate>>>, ApiError> {
    let days = q.days.unwrap_or(BOOKING_HORIZON_DAYS);
    if !(1..=MAX_HORIZON_DAYS).contains(&days) {
        return Err(ApiError::validation(format!(
            "days must be between 1 and {MAX_HORIZON_DAYS}"
        )));
    }
    load_visible_doctor(&state, doctor_id).await?;

    let dates = available_dates(&state.store(), doctor_id, today(), days).await?;
    Ok(Json(ApiOk::new(dates)))
}

/* ============================================================
   GET /doctors/{doctor_id}/available-times/{date}
   ============================================================ */

pub async fn get_available_times(
    State(state): State<AppState>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<ApiOk<AvailableTimesDto>>, ApiError> {
    load_visible_doctor(&state, doctor_id).await?;

    // nothing is bookable in the past or on a weekend
    let times = if date < today() || !slots::is_working_day(date) {
        Vec::new()
    } else {
        available_slots(&state.store(), doctor_id, date).await?
    };

    Ok(Json(ApiOk::new(AvailableTimesDto {
        date,
        times: format_times(&times),
    })))
}

/* ============================================================
   Reviews
   ============================================================ */

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<ReviewDto>>>, ApiError> {
    load_visible_doctor(&state, doctor_id).await?;
    let reviews = fetch_reviews(&state, doctor_id, None).await?;
    Ok(Json(ApiOk::new(reviews)))
}

pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ApiOk<CreatedReviewDto>>, ApiError> {
    load_visible_doctor(&state, doctor_id).await?;

    let created = review::submit_review(&state.store(), &auth.role, doctor_id, req).await?;
    tracing::info!(review_id = %created.review_id, %doctor_id, "review submitted");

    Ok(Json(ApiOk::new(CreatedReviewDto {
        stars: rating_stars(created.rating),
        review: created,
    })))
}

pub async fn review_eligibility(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Query(q): Query<EligibilityQuery>,
) -> Result<Json<ApiOk<EligibilityDto>>, ApiError> {
    let patient_id = auth.require_patient()?;
    load_visible_doctor(&state, doctor_id).await?;

    let can_review =
        review::can_review(&state.store(), patient_id, doctor_id, q.appointment_id).await?;
    Ok(Json(ApiOk::new(EligibilityDto { can_review })))
}
