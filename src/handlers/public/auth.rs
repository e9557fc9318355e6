use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::database::models::AuditAction;
use crate::error::ApiError;
use crate::handlers::field;
use crate::middleware::audit::{client_ip, user_agent};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::audit::{AuditRecord, AuditService};
use crate::services::user_service::{LoginResponse, RegisterResponse, UserService};

/// POST /api/login - username or email plus password
pub async fn login(
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<LoginResponse> {
    let identifier = field(&body, "username").or_else(|| field(&body, "email"));
    let (user, response) = UserService::new().await?.login(identifier, field(&body, "password")).await?;

    let record = AuditRecord::new(AuditAction::Login, format!("Inicio de sesión de {}", user.username))
        .by(&user)
        .from_client(client_ip(&headers, peer.map(|c| c.0)), user_agent(&headers));
    AuditService::new().await?.log_quietly(record).await;

    Ok(ApiResponse::success(response))
}

/// POST /api/register - creates the tenant from company_name, then the account
pub async fn register(Json(body): Json<Value>) -> ApiResult<RegisterResponse> {
    let response = UserService::new().await?.register(&body).await?;
    Ok(ApiResponse::created(response))
}

/// POST /api/token/refresh
pub async fn refresh(Json(body): Json<Value>) -> ApiResult<Value> {
    let access = UserService::new().await?.refresh(field(&body, "refresh")).await?;
    Ok(ApiResponse::success(json!({ "access": access })))
}

/// POST /api/users/password-reset
pub async fn password_reset(Json(body): Json<Value>) -> ApiResult<Value> {
    UserService::new().await?.request_password_reset(field(&body, "email")).await?;
    Ok(ApiResponse::success(json!({
        "detail": "Se han enviado las instrucciones a tu correo electrónico"
    })))
}

/// POST /api/users/password-reset/confirm
pub async fn password_reset_confirm(Json(body): Json<Value>) -> Result<ApiResponse<Value>, ApiError> {
    UserService::new().await?.confirm_password_reset(&body).await?;
    Ok(ApiResponse::success(json!({ "detail": "Contraseña actualizada exitosamente" })))
}
