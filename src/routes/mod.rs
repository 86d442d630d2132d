use crate::models::AppState;
use axum::Router;

pub mod admin_routes;
pub mod appointment_routes;
pub mod auth_routes;
pub mod doctor_routes;
pub mod document_routes;
pub mod profile_routes;
pub mod specialty_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1", specialty_routes::router())
        .nest("/api/v1", doctor_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", profile_routes::router())
        .nest("/api/v1", document_routes::router())
        .nest("/api/v1", admin_routes::router())
        .with_state(state)
}
