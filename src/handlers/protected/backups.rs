use axum::{
    body::{Body, Bytes},
    extract::{Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::backup_service::{BackupService, BackupView};

#[derive(Debug, Deserialize)]
pub struct BackupQuery {
    pub user_id: Option<i64>,
}

pub async fn list(
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<BackupQuery>,
) -> ApiResult<Vec<BackupView>> {
    let user = &current.user;
    let backups = BackupService::new().await?.list(user, user.is_admin(), query.user_id).await?;
    Ok(ApiResponse::success(backups))
}

pub async fn create(Extension(current): Extension<CurrentUser>, body: Option<Json<Value>>) -> ApiResult<BackupView> {
    let body = body.map(|Json(b)| b).unwrap_or_else(|| json!({}));
    let user = &current.user;
    let backup = BackupService::new().await?.create(user, user.is_admin(), &body).await?;
    Ok(ApiResponse::created(backup))
}

pub async fn get(Extension(current): Extension<CurrentUser>, Path(id): Path<i64>) -> ApiResult<BackupView> {
    let user = &current.user;
    Ok(ApiResponse::success(BackupService::new().await?.get(user, user.is_admin(), id).await?))
}

pub async fn delete(Extension(current): Extension<CurrentUser>, Path(id): Path<i64>) -> ApiResult<()> {
    BackupService::new().await?.delete(&current.user, id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/backups/:id/restore
pub async fn restore(Extension(current): Extension<CurrentUser>, Path(id): Path<i64>) -> ApiResult<Value> {
    BackupService::new().await?.restore(&current.user, id).await?;
    Ok(ApiResponse::success(json!({ "message": "Backup restaurado exitosamente" })))
}

fn is_zip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| matches!(ct, "application/zip" | "application/x-zip-compressed"))
}

/// POST /api/backups/restore_from_file - raw archive as the request body
pub async fn restore_from_file(
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Value> {
    if body.is_empty() {
        return Err(ApiError::bad_request("No se ha proporcionado un archivo ZIP"));
    }
    if !is_zip(&headers) {
        return Err(ApiError::bad_request("Solo se aceptan archivos ZIP"));
    }
    BackupService::new()
        .await?
        .restore_from_upload(&current.user, body.to_vec())
        .await?;
    Ok(ApiResponse::success(json!({ "message": "Backup restaurado exitosamente" })))
}

/// GET /api/backups/:id/download
pub async fn download(Extension(current): Extension<CurrentUser>, Path(id): Path<i64>) -> Result<Response, ApiError> {
    let (name, bytes) = BackupService::new().await?.download(&current.user, id).await?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", name))
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal_server_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn only_zip_content_types_are_accepted() {
        let mut headers = HeaderMap::new();
        assert!(!is_zip(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
        assert!(is_zip(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_zip(&headers));
    }
}
