use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use futures::TryStreamExt;
use serde_json::json;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::auth::AuthenticatedUser,
    models::{DeleteOutcome, FileListResponse, ReconcileReport, UploadReason, UserIdentity},
    utils::content_type_for,
};

pub async fn list_files(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<FileListResponse>> {
    let files = state.store.list(&user).await?;
    let usage = state.store.usage(&user).await?;

    Ok(Json(FileListResponse { files, usage }))
}

/// Streams the multipart field `file` straight into the upload store.
pub async fn upload_file(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Response> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::Validation(format!("Failed to parse multipart data: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let body = field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader = StreamReader::new(Box::pin(body));

        let result = state.store.submit(&user, &filename, reader, None).await?;
        return Ok((upload_status(result.reason), Json(result)).into_response());
    }

    Err(AppError::Validation("No file provided".to_string()))
}

pub fn upload_status(reason: UploadReason) -> StatusCode {
    match reason {
        UploadReason::Ok => StatusCode::CREATED,
        UploadReason::EmptyName => StatusCode::BAD_REQUEST,
        UploadReason::UnsupportedType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        UploadReason::SingleFileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        UploadReason::QuotaExceeded => StatusCode::FORBIDDEN,
        UploadReason::IoError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn download_file(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<Response> {
    let (file, reader) = state.store.open(&user, &name).await?.ok_or(AppError::NotFound)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&file.name))
        .header(header::CONTENT_LENGTH, file.size_bytes)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.name),
        )
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(e.into()))
}

pub async fn delete_file(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let outcome = state.store.delete(&user, &name).await?;
    deletion_response(&state, &user, outcome).await
}

pub async fn delete_file_by_id(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let outcome = state.store.delete_by_id(&user, id).await?;
    deletion_response(&state, &user, outcome).await
}

async fn deletion_response(
    state: &AppState,
    user: &UserIdentity,
    outcome: DeleteOutcome,
) -> Result<Json<serde_json::Value>> {
    match outcome {
        DeleteOutcome::Deleted { bytes_freed } => {
            let usage = state.store.usage(user).await?;
            Ok(Json(json!({
                "message": "File deleted",
                "bytes_freed": bytes_freed,
                "usage": usage
            })))
        }
        DeleteOutcome::NotFound => Err(AppError::NotFound),
        DeleteOutcome::Forbidden => Err(AppError::Forbidden),
    }
}

pub async fn reconcile_files(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<ReconcileReport>> {
    let report = state.store.reconcile(&user).await?;
    Ok(Json(report))
}
