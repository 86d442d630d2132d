// src/routes/document_routes.rs

use std::io;
use std::path::{Path as FsPath, PathBuf};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    routing::{delete, get},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{
    booking::documents::{
        MAX_DOCUMENT_BYTES, PhotoOwner, file_type, human_size, is_uploaded_photo, photo_name,
        storage_name, validate_document, validate_photo,
    },
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, DocumentRow, OkData},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_documents).post(upload_document))
        .route("/documents/{document_id}", delete(delete_document))
        .layer(upload_body_limit())
}

/// Leaves room above the file limit so oversized files get FILE_TOO_LARGE,
/// not a bare 413.
pub(crate) fn upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(MAX_DOCUMENT_BYTES as usize + 1024 * 1024)
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentDto {
    pub document_id: Uuid,
    pub original_name: String,
    pub file_path: String,
    pub size_bytes: i64,
    pub size: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<DocumentRow> for DocumentDto {
    fn from(row: DocumentRow) -> Self {
        Self {
            size: human_size(row.size_bytes.max(0) as u64),
            file_type: file_type(&row.original_name),
            document_id: row.document_id,
            original_name: row.original_name,
            file_path: row.file_path,
            size_bytes: row.size_bytes,
            uploaded_at: row.uploaded_at,
        }
    }
}

/* ============================================================
   File storage
   ============================================================ */

/// Writes `bytes` to `root/relative`, creating parent directories. Refuses to
/// overwrite an existing file.
pub async fn write_document(root: &FsPath, relative: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let target = root.join(relative);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(target)
}

/// Best-effort removal; a file that is already gone is fine.
pub async fn remove_document(root: &FsPath, relative: &str) {
    let target = root.join(relative);
    match tokio::fs::remove_file(&target).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %target.display(), error = %e, "could not remove stored file")
        }
    }
}

/// Keeps only the final path component of a client-supplied name.
fn clean_file_name(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Cleaned, non-empty client file name for a non-empty body.
fn upload_name(filename: &str, body: &[u8]) -> Result<String, ApiError> {
    let name = clean_file_name(filename);
    if name.is_empty() {
        return Err(ApiError::validation("filename is required"));
    }
    if body.is_empty() {
        return Err(ApiError::validation("file is empty"));
    }
    Ok(name)
}

async fn store_upload(root: &FsPath, relative: &str, body: &[u8]) -> Result<(), ApiError> {
    write_document(root, relative, body)
        .await
        .map(|_| ())
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => ApiError::Conflict(
                "UPLOAD_IN_PROGRESS",
                "another upload just finished, please retry".into(),
            ),
            _ => ApiError::Internal(format!("file storage error: {e}")),
        })
}

/// Validates an image upload and writes it under the owner's photo folder.
/// Returns the stored path relative to the upload root.
pub(crate) async fn save_photo(
    root: &FsPath,
    owner: PhotoOwner,
    user_id: Uuid,
    filename: &str,
    body: &[u8],
) -> Result<String, ApiError> {
    let name = upload_name(filename, body)?;
    let ext = validate_photo(&name, body.len() as u64)?;
    let relative = photo_name(owner, user_id, &ext, Utc::now());
    store_upload(root, &relative, body).await?;
    Ok(relative)
}

/// Finishes a photo replacement after the row update ran. `updated` carries
/// the previous path of the updated row. The replaced upload is removed on
/// success; the new file is removed when the row is missing or the update
/// failed.
pub(crate) async fn settle_photo_swap(
    root: &FsPath,
    stored: &str,
    updated: Result<Option<Option<String>>, sqlx::Error>,
    missing: &'static str,
) -> Result<(), ApiError> {
    match updated {
        Ok(Some(previous)) => {
            if let Some(previous) = previous.filter(|p| is_uploaded_photo(p) && p != stored) {
                remove_document(root, &previous).await;
            }
            Ok(())
        }
        Ok(None) => {
            remove_document(root, stored).await;
            Err(ApiError::NotFound("NOT_FOUND", format!("{missing} not found")))
        }
        Err(e) => {
            remove_document(root, stored).await;
            Err(ApiError::db(e))
        }
    }
}

/* ============================================================
   Handlers
   ============================================================ */

/// GET /documents
pub async fn list_documents(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<DocumentDto>>>, ApiError> {
    let patient_id = auth.require_patient()?;

    let rows = sqlx::query_as::<_, DocumentRow>(
        r#"
        SELECT document_id, file_path, original_name, size_bytes, uploaded_at
        FROM medical_document
        WHERE patient_id = $1
        ORDER BY uploaded_at DESC
        "#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows.into_iter().map(DocumentDto::from).collect())))
}

/// POST /documents?filename=scan.pdf with the raw file as the body.
pub async fn upload_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<ApiOk<DocumentDto>>, ApiError> {
    let patient_id = auth.require_patient()?;

    let original_name = upload_name(&q.filename, &body)?;
    let ext = validate_document(&original_name, body.len() as u64)?;

    let relative = storage_name(patient_id, &ext, Utc::now());
    store_upload(&state.upload_dir, &relative, &body).await?;

    let inserted = sqlx::query_as::<_, DocumentRow>(
        r#"
        INSERT INTO medical_document (patient_id, file_path, original_name, size_bytes)
        VALUES ($1, $2, $3, $4)
        RETURNING document_id, file_path, original_name, size_bytes, uploaded_at
        "#,
    )
    .bind(patient_id)
    .bind(&relative)
    .bind(&original_name)
    .bind(body.len() as i64)
    .fetch_one(&state.db)
    .await;

    let row = match inserted {
        Ok(row) => row,
        Err(e) => {
            remove_document(&state.upload_dir, &relative).await;
            return Err(ApiError::db(e));
        }
    };

    tracing::info!(
        document_id = %row.document_id,
        %patient_id,
        size = row.size_bytes,
        "document uploaded"
    );
    Ok(Json(ApiOk::new(DocumentDto::from(row))))
}

/// DELETE /documents/{document_id}
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let patient_id = auth.require_patient()?;

    let file_path: String = sqlx::query_scalar(
        r#"
        DELETE FROM medical_document
        WHERE document_id = $1
          AND patient_id = $2
        RETURNING file_path
        "#,
    )
    .bind(document_id)
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "document not found".into()))?;

    remove_document(&state.upload_dir, &file_path).await;
    Ok(Json(ApiOk::new(OkData { ok: true })))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn writes_under_root_and_refuses_overwrite() {
        let root = tempfile::tempdir().unwrap();
        let relative = "medical_documents/doc_x_20240610090000.pdf";

        let path = write_document(root.path(), relative, b"%PDF-1.4").await.unwrap();
        assert_eq!(path, root.path().join(relative));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.4");

        let again = write_document(root.path(), relative, b"other").await;
        assert_eq!(again.unwrap_err().kind(), io::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let relative = "medical_documents/doc.png";
        write_document(root.path(), relative, b"png").await.unwrap();

        remove_document(root.path(), relative).await;
        assert!(!root.path().join(relative).exists());
        remove_document(root.path(), relative).await;
    }

    #[tokio::test]
    async fn photos_are_stored_by_owner_and_must_be_images() {
        let root = tempfile::tempdir().unwrap();
        let user = Uuid::new_v4();

        let name = "C:\\me\\face.PNG";
        let stored = save_photo(root.path(), PhotoOwner::Patient, user, name, b"png")
            .await
            .unwrap();
        assert!(stored.starts_with(&format!("patients/patient_{}_", user.simple())));
        assert!(stored.ends_with(".png"));
        assert_eq!(tokio::fs::read(root.path().join(&stored)).await.unwrap(), b"png");

        let pdf = save_photo(root.path(), PhotoOwner::Doctor, user, "cv.pdf", b"%PDF").await;
        assert_matches!(pdf, Err(ApiError::BadRequest("UNSUPPORTED_FILE_TYPE", _)));

        let empty = save_photo(root.path(), PhotoOwner::Doctor, user, "me.jpg", b"").await;
        assert_matches!(empty, Err(ApiError::BadRequest("VALIDATION_ERROR", _)));
        assert!(!root.path().join("doctors").exists());
    }

    #[tokio::test]
    async fn photo_swap_cleans_up_the_loser() {
        let root = tempfile::tempdir().unwrap();
        let old = "doctors/doctor_x_20240101000000.jpg";
        let new = "doctors/doctor_x_20240610090000.jpg";
        write_document(root.path(), old, b"old").await.unwrap();
        write_document(root.path(), new, b"new").await.unwrap();

        settle_photo_swap(root.path(), new, Ok(Some(Some(old.into()))), "doctor")
            .await
            .unwrap();
        assert!(!root.path().join(old).exists());
        assert!(root.path().join(new).exists());

        // the shared placeholder survives a replacement
        let placeholder = "doctors/default.jpg";
        write_document(root.path(), placeholder, b"stock").await.unwrap();
        settle_photo_swap(root.path(), new, Ok(Some(Some(placeholder.into()))), "doctor")
            .await
            .unwrap();
        assert!(root.path().join(placeholder).exists());

        let gone = settle_photo_swap(root.path(), new, Ok(None), "doctor").await;
        assert_matches!(gone, Err(ApiError::NotFound("NOT_FOUND", _)));
        assert!(!root.path().join(new).exists());
    }

    #[test]
    fn client_paths_are_stripped() {
        assert_eq!(clean_file_name("../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(clean_file_name("C:\\scans\\x-ray.PNG"), "x-ray.PNG");
        assert_eq!(clean_file_name(" report.pdf "), "report.pdf");
    }

    #[test]
    fn dto_derives_display_fields() {
        let dto = DocumentDto::from(DocumentRow {
            document_id: Uuid::nil(),
            file_path: "medical_documents/doc.pdf".into(),
            original_name: "Blood test.PDF".into(),
            size_bytes: 1536,
            uploaded_at: Utc::now(),
        });
        assert_eq!(dto.size, "1.5 KB");
        assert_eq!(dto.file_type, "PDF");
    }
}
