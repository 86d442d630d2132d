// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    booking::{
        AppointmentRecord, AppointmentStatus, Role,
        lifecycle::{self, VisitOutcome},
        validator::{self, BookingRequest},
    },
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, today},
};

const NOT_SPECIFIED: &str = "not specified";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment).patch(reschedule_appointment),
        )
        .route("/appointments/{appointment_id}/cancel", post(cancel_appointment))
        .route("/appointments/{appointment_id}/complete", post(complete_appointment))
        .route("/appointments/{appointment_id}/certificate", get(get_certificate))
}

/* ============================================================
   Rows / DTOs
   ============================================================ */

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub appointment: AppointmentRecord,
    pub doctor_name: String,
    pub specialty_name: String,
    pub patient_name: String,
    #[sqlx(skip)]
    pub ends_at: Option<NaiveDateTime>,
    #[sqlx(skip)]
    pub is_past_due: bool,
}

impl AppointmentView {
    fn with_clock(mut self, now: NaiveDateTime) -> Self {
        self.ends_at = Some(self.appointment.ends_at());
        self.is_past_due = self.appointment.is_past_due(now);
        self
    }

    /// Staff, the patient who booked, or the doctor being seen.
    fn visible_to(&self, role: &Role) -> bool {
        match role {
            Role::Doctor { doctor_id } => *doctor_id == self.appointment.doctor_id,
            other => other.acts_for_patient(self.appointment.patient_id),
        }
    }

    fn is_upcoming(&self, today: NaiveDate) -> bool {
        self.appointment.status == AppointmentStatus::Scheduled && self.appointment.date >= today
    }
}

#[derive(Debug, Serialize)]
pub struct AppointmentListDto {
    pub upcoming: Vec<AppointmentView>,
    pub past: Vec<AppointmentView>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Staff only: restrict to one day.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub notes: String,
    /// Required when staff books on a patient's behalf; ignored for patients.
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct CertificateRow {
    patient_id: Uuid,
    patient_name: String,
    birth_date: NaiveDate,
    doctor_name: String,
    specialty_name: String,
    appt_date: NaiveDate,
    appt_time: NaiveTime,
    status: AppointmentStatus,
    diagnosis: String,
    prescription: String,
}

#[derive(Debug, Serialize)]
pub struct CertificateDto {
    pub clinic_name: String,
    pub appointment_id: Uuid,
    pub patient_name: String,
    pub birth_date: NaiveDate,
    pub card_number: String,
    pub date: NaiveDate,
    pub time: String,
    pub doctor_name: String,
    pub specialty_name: String,
    pub status: AppointmentStatus,
    pub diagnosis: String,
    pub prescription: String,
    pub issued_on: NaiveDate,
}

/// Medical card number printed on certificates.
pub fn card_number(patient_id: Uuid) -> String {
    let hex = patient_id.simple().to_string().to_uppercase();
    hex[..8].to_string()
}

fn or_not_specified(text: String) -> String {
    if text.trim().is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        text
    }
}

/* ============================================================
   SQL helpers
   ============================================================ */

const VIEW_SELECT: &str = r#"
    SELECT
      a.appointment_id,
      a.doctor_id,
      a.patient_id,
      a.appt_date,
      a.appt_time,
      a.status,
      a.notes,
      a.diagnosis,
      a.prescription,
      a.reminder_sent_at,
      a.created_at,
      a.updated_at,
      COALESCE(NULLIF(TRIM(du.first_name || ' ' || du.last_name), ''), du.username) AS doctor_name,
      s.name AS specialty_name,
      COALESCE(NULLIF(TRIM(pu.first_name || ' ' || pu.last_name), ''), pu.username) AS patient_name
    FROM appointment a
    JOIN doctor d     ON d.doctor_id = a.doctor_id
    JOIN app_user du  ON du.user_id = d.user_id
    JOIN specialty s  ON s.specialty_id = d.specialty_id
    JOIN patient p    ON p.patient_id = a.patient_id
    JOIN app_user pu  ON pu.user_id = p.user_id
"#;

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

async fn load_view(state: &AppState, appointment_id: Uuid) -> Result<AppointmentView, ApiError> {
    let view = sqlx::query_as::<_, AppointmentView>(&format!(
        "{VIEW_SELECT} WHERE a.appointment_id = $1"
    ))
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))?;

    Ok(view.with_clock(now_local()))
}

async fn load_visible(
    state: &AppState,
    auth: &AuthContext,
    appointment_id: Uuid,
) -> Result<AppointmentView, ApiError> {
    let view = load_view(state, appointment_id).await?;
    ensure_visible(&view, &auth.role)?;
    Ok(view)
}

/// Appointments the caller cannot see are reported as missing, for reads and
/// state changes alike.
fn ensure_visible(view: &AppointmentView, role: &Role) -> Result<(), ApiError> {
    if view.visible_to(role) {
        Ok(())
    } else {
        Err(ApiError::NotFound("NOT_FOUND", "appointment not found".into()))
    }
}

async fn reload(state: &AppState, record: AppointmentRecord) -> Result<AppointmentView, ApiError> {
    load_view(state, record.appointment_id).await
}

/* ============================================================
   GET /appointments
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListQuery>,
) -> Result<Json<ApiOk<AppointmentListDto>>, ApiError> {
    let (filter, owner) = match auth.role {
        Role::Patient { patient_id } => ("a.patient_id = $1", Some(patient_id)),
        Role::Doctor { doctor_id } => ("a.doctor_id = $1", Some(doctor_id)),
        Role::Staff => ("$1::uuid IS NULL", None),
        Role::Member => {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "A patient profile is required".into(),
            ));
        }
    };
    let date = if auth.role.is_staff() { q.date } else { None };

    let sql = format!(
        "{VIEW_SELECT} WHERE {filter} AND ($2::date IS NULL OR a.appt_date = $2) \
         ORDER BY a.appt_date DESC, a.appt_time DESC"
    );
    let rows = sqlx::query_as::<_, AppointmentView>(&sql)
        .bind(owner)
        .bind(date)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    let now = now_local();
    let today = now.date();
    let (mut upcoming, past): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .map(|v| v.with_clock(now))
        .partition(|v| v.is_upcoming(today));
    // soonest first
    upcoming.reverse();

    Ok(Json(ApiOk::new(AppointmentListDto { upcoming, past })))
}

/* ============================================================
   POST /appointments
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentView>>, ApiError> {
    let patient_id = match auth.role {
        Role::Patient { patient_id } => patient_id,
        Role::Staff => req
            .patient_id
            .ok_or_else(|| ApiError::validation("patient_id is required"))?,
        _ => {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "Only patients and staff can book appointments".into(),
            ));
        }
    };

    let request = BookingRequest {
        doctor_id: req.doctor_id,
        patient_id,
        date: req.date,
        time: req.time,
        notes: req.notes,
    };
    let created = validator::book(&state.store(), request, today()).await?;
    tracing::info!(
        appointment_id = %created.appointment_id,
        doctor_id = %created.doctor_id,
        date = %created.date,
        time = %created.time,
        "appointment booked"
    );

    Ok(Json(ApiOk::new(reload(&state, created).await?)))
}

/* ============================================================
   GET /appointments/{appointment_id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentView>>, ApiError> {
    let view = load_visible(&state, &auth, appointment_id).await?;
    Ok(Json(ApiOk::new(view)))
}

/* ============================================================
   Lifecycle
   ============================================================ */

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentView>>, ApiError> {
    load_visible(&state, &auth, appointment_id).await?;
    let updated = lifecycle::cancel(&state.store(), appointment_id, &auth.role).await?;
    Ok(Json(ApiOk::new(reload(&state, updated).await?)))
}

pub async fn complete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    outcome: Option<Json<VisitOutcome>>,
) -> Result<Json<ApiOk<AppointmentView>>, ApiError> {
    load_visible(&state, &auth, appointment_id).await?;
    let outcome = outcome.map(|Json(o)| o).unwrap_or_default();
    let updated =
        lifecycle::complete(&state.store(), appointment_id, &auth.role, outcome).await?;
    Ok(Json(ApiOk::new(reload(&state, updated).await?)))
}

pub async fn reschedule_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<ApiOk<AppointmentView>>, ApiError> {
    let moved = validator::reschedule(
        &state.store(),
        appointment_id,
        req.date,
        req.time,
        &auth.role,
        today(),
    )
    .await?;
    Ok(Json(ApiOk::new(reload(&state, moved).await?)))
}

/* ============================================================
   GET /appointments/{appointment_id}/certificate
   ============================================================ */

pub async fn get_certificate(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<CertificateDto>>, ApiError> {
    // access check
    load_visible(&state, &auth, appointment_id).await?;

    let row = sqlx::query_as::<_, CertificateRow>(
        r#"
        SELECT
          a.patient_id,
          COALESCE(NULLIF(TRIM(pu.first_name || ' ' || pu.last_name), ''), pu.username) AS patient_name,
          p.birth_date,
          COALESCE(NULLIF(TRIM(du.first_name || ' ' || du.last_name), ''), du.username) AS doctor_name,
          s.name AS specialty_name,
          a.appt_date,
          a.appt_time,
          a.status,
          a.diagnosis,
          a.prescription
        FROM appointment a
        JOIN patient p    ON p.patient_id = a.patient_id
        JOIN app_user pu  ON pu.user_id = p.user_id
        JOIN doctor d     ON d.doctor_id = a.doctor_id
        JOIN app_user du  ON du.user_id = d.user_id
        JOIN specialty s  ON s.specialty_id = d.specialty_id
        WHERE a.appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))?;

    Ok(Json(ApiOk::new(CertificateDto {
        clinic_name: state.clinic_name.clone(),
        appointment_id,
        card_number: card_number(row.patient_id),
        patient_name: row.patient_name,
        birth_date: row.birth_date,
        date: row.appt_date,
        time: row.appt_time.format("%H:%M").to_string(),
        doctor_name: row.doctor_name,
        specialty_name: row.specialty_name,
        status: row.status,
        diagnosis: or_not_specified(row.diagnosis),
        prescription: or_not_specified(row.prescription),
        issued_on: today(),
    })))
}
