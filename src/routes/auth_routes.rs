// src/routes/auth_routes.rs

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    auth::{
        check_credentials, check_password_change, generate_access_token, hash_access_token,
        hash_password, verify_password,
    },
    booking::{Role, patient::ensure_adult},
    db::is_unique_violation,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
        .route("/password", post(change_password))
}

/* ============================================================
   Helpers
   ============================================================ */

const USER_COLUMNS: &str =
    "user_id, username, email, first_name, last_name, password_hash, is_staff, is_active";

async fn resolve_role(state: &AppState, user: &UserRow) -> Result<Role, ApiError> {
    let (doctor_id, patient_id): (Option<Uuid>, Option<Uuid>) = sqlx::query_as(
        r#"
        SELECT
          (SELECT doctor_id FROM doctor WHERE user_id = $1),
          (SELECT patient_id FROM patient WHERE user_id = $1)
        "#,
    )
    .bind(user.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Role::resolve(user.is_staff, doctor_id, patient_id))
}

async fn open_session(
    state: &AppState,
    user: UserRow,
    device_name: Option<&str>,
) -> Result<LoginResponseData, ApiError> {
    let role = resolve_role(state, &user).await?;

    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        INSERT INTO session_token
            (user_id, session_token_hash, device_name, expires_at)
        VALUES
            ($1, $2, $3, $4)
        RETURNING session_token_id, expires_at
        "#,
    )
    .bind(user.user_id)
    .bind(&token_hash)
    .bind(device_name)
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(user_id = %user.user_id, role = role.as_str(), "session opened");

    Ok(LoginResponseData {
        access_token,
        expires_at: session.expires_at,
        user: UserProfile {
            user_id: user.user_id,
            full_name: user.full_name(),
            username: user.username,
            email: user.email,
            role,
        },
        clinic: ClinicProfile {
            clinic_name: state.clinic_name.clone(),
        },
    })
}

/* ============================================================
   POST /auth/register
   ============================================================ */

/// Creates the account and its patient profile together, then logs in.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiOk<LoginResponseData>>, ApiError> {
    let username = req.username.trim();
    let email = req.email.trim().to_lowercase();

    check_credentials(username, &req.password).map_err(ApiError::validation)?;
    if !email.contains('@') {
        return Err(ApiError::validation("a valid email is required"));
    }
    let phone = req.phone.trim();
    if phone.is_empty() || phone.chars().count() > 20 {
        return Err(ApiError::validation("phone must be 1-20 characters"));
    }
    if req.address.trim().is_empty() {
        return Err(ApiError::validation("address is required"));
    }
    ensure_adult(req.birth_date, today())?;

    let password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO app_user (username, email, first_name, last_name, password_hash)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(username)
    .bind(&email)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(&password_hash)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("ACCOUNT_EXISTS", "username or email is already registered".into())
        } else {
            ApiError::db(e)
        }
    })?;

    sqlx::query(
        r#"
        INSERT INTO patient (user_id, phone, birth_date, address)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user.user_id)
    .bind(phone)
    .bind(req.birth_date)
    .bind(req.address.trim())
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;
    tracing::info!(user_id = %user.user_id, "patient registered");

    let data = open_session(&state, user, req.device_name.as_deref()).await?;
    Ok(Json(ApiOk::new(data)))
}

/* ============================================================
   POST /auth/login
   ============================================================ */

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiOk<LoginResponseData>>, ApiError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("username and password are required"));
    }

    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM app_user
        WHERE username = $1
        "#
    ))
    .bind(username)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::invalid_credentials)?;

    if !user.is_active {
        return Err(ApiError::Forbidden("FORBIDDEN", "Account is disabled".into()));
    }
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let data = open_session(&state, user, req.device_name.as_deref()).await?;
    Ok(Json(ApiOk::new(data)))
}

/* ============================================================
   GET /auth/me
   ============================================================ */

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<MeResponseData>>, ApiError> {
    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM app_user
        WHERE user_id = $1
        "#
    ))
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        SELECT session_token_id, expires_at
        FROM session_token
        WHERE session_token_id = $1
          AND revoked_at IS NULL
          AND expires_at > now()
        "#,
    )
    .bind(auth.session_token_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    Ok(Json(ApiOk::new(MeResponseData {
        user: UserProfile {
            user_id: user.user_id,
            full_name: user.full_name(),
            username: user.username,
            email: user.email,
            role: auth.role,
        },
        clinic: ClinicProfile {
            clinic_name: state.clinic_name.clone(),
        },
        session: SessionInfo {
            session_token_id: session.session_token_id,
            expires_at: session.expires_at,
        },
    })))
}

/* ============================================================
   POST /auth/logout
   ============================================================ */

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let rows = sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if rows.rows_affected() == 0 {
        return Err(ApiError::session_expired());
    }

    Ok(Json(ApiOk::new(OkData { ok: true })))
}

/* ============================================================
   POST /auth/password
   ============================================================ */

/// Replaces the password and signs out every other session of the user. The
/// session making the request stays valid.
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ApiOk<PasswordChangedData>>, ApiError> {
    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM app_user
        WHERE user_id = $1
        "#
    ))
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    if !verify_password(&req.old_password, &user.password_hash) {
        return Err(ApiError::BadRequest(
            "WRONG_PASSWORD",
            "the old password is incorrect".into(),
        ));
    }
    check_password_change(
        &user.username,
        &req.old_password,
        &req.new_password,
        &req.new_password_confirm,
    )
    .map_err(ApiError::validation)?;

    let password_hash = hash_password(&req.new_password).map_err(ApiError::Internal)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(r#"UPDATE app_user SET password_hash = $2 WHERE user_id = $1"#)
        .bind(auth.user_id)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    let revoked = sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE user_id = $1
          AND session_token_id <> $2
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.user_id)
    .bind(auth.session_token_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?
    .rows_affected();

    tx.commit().await.map_err(ApiError::db)?;
    tracing::info!(user_id = %auth.user_id, sessions_revoked = revoked, "password changed");

    Ok(Json(ApiOk::new(PasswordChangedData {
        ok: true,
        sessions_revoked: revoked,
    })))
}
