use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::HeaderMap, Extension, Json};
use serde_json::{json, Value};

use crate::database::models::{AuditAction, UserProfile};
use crate::handlers::field;
use crate::middleware::audit::request_record;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, TenantContext};
use crate::services::audit::AuditService;
use crate::services::user_service::UserService;

/// GET /api/users/profile
pub async fn profile(Extension(current): Extension<CurrentUser>) -> ApiResult<UserProfile> {
    Ok(ApiResponse::success(current.user.profile()))
}

/// PUT|PATCH /api/users/profile/update
pub async fn update_profile(
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<UserProfile> {
    let profile = UserService::new().await?.update_profile(&current.user, &body).await?;
    Ok(ApiResponse::success(profile))
}

/// POST /api/users/profile/picture
pub async fn profile_picture(
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<UserProfile> {
    let profile = UserService::new().await?.set_profile_picture(&current.user, &body).await?;
    Ok(ApiResponse::success(profile))
}

/// POST /api/users/profile/password
pub async fn change_password(
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    UserService::new()
        .await?
        .change_password(&current.user, field(&body, "current_password"), field(&body, "new_password"))
        .await?;
    Ok(ApiResponse::success(json!({ "message": "Contraseña actualizada correctamente" })))
}

/// POST /api/users/company/customize - accepted and echoed back
pub async fn customize_company(Json(body): Json<Value>) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "message": "Personalización de empresa recibida",
        "data": body,
    })))
}

/// POST /api/users/crear-usuario-interno - admins and store owners only
pub async fn create_internal_user(
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<UserProfile> {
    let may_create = current.user.is_admin() || current.owns_store();
    let profile = UserService::new()
        .await?
        .create_internal_user(&current.user, may_create, &body)
        .await?;
    Ok(ApiResponse::created(profile))
}

/// POST /api/users/logout - revokes the refresh token when one is sent
pub async fn logout(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> ApiResult<Value> {
    let body = body.map(|Json(v)| v).unwrap_or_default();
    UserService::new().await?.logout(&current.user, field(&body, "refresh")).await?;

    let record = request_record(
        AuditAction::Logout,
        format!("Cierre de sesión de {}", current.user.username),
        &current,
        &tenant,
        &headers,
        peer.map(|c| c.0),
    );
    AuditService::new().await?.log_quietly(record).await;

    Ok(ApiResponse::success(json!({ "message": "Sesión cerrada exitosamente" })))
}
