use axum::Json;
use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult};
use crate::services::storefront_service::{StorefrontLogin, StorefrontService};

/// POST /api/users-public/register
pub async fn register(Json(body): Json<Value>) -> ApiResult<Value> {
    StorefrontService::new().await?.register(&body).await?;
    Ok(ApiResponse::created(json!({ "message": "Usuario registrado con éxito" })))
}

/// POST /api/users-public/login - returns a storefront token
pub async fn login(Json(body): Json<Value>) -> ApiResult<StorefrontLogin> {
    Ok(ApiResponse::success(StorefrontService::new().await?.login(&body).await?))
}
