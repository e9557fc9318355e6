// Elevated handlers: protected tier plus the `Admin` permission class.
// Cross-tenant administration lives under /api/root/*.

use axum::{extract::Path, http::Method, Extension, Json};
use serde_json::Value;

use crate::database::models::Tenant;
use crate::error::ApiError;
use crate::handlers::field;
use crate::middleware::{require, ApiResponse, ApiResult, CurrentUser, Permission};
use crate::services::tenant_service::TenantService;
use crate::services::user_service::{ActiveUserRow, UserService};

/// GET /api/root/tenants
pub async fn tenant_list(method: Method, Extension(current): Extension<CurrentUser>) -> ApiResult<Vec<Tenant>> {
    require(&current, &method, Permission::Admin)?;
    Ok(ApiResponse::success(TenantService::new().await?.list_tenants().await?))
}

/// POST /api/root/tenants {name}
pub async fn tenant_create(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<Tenant> {
    require(&current, &method, Permission::Admin)?;
    let name = field(&body, "name").ok_or_else(|| ApiError::bad_request("El nombre del tenant es obligatorio"))?;
    let tenant = TenantService::new().await?.create_tenant(name).await?;
    tracing::info!("Tenant '{}' created by {}", tenant.name, current.user.username);
    Ok(ApiResponse::created(tenant))
}

/// GET /api/root/tenants/:id
pub async fn tenant_get(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Tenant> {
    require(&current, &method, Permission::Admin)?;
    Ok(ApiResponse::success(TenantService::new().await?.get_tenant(id).await?))
}

async fn set_active(current: &CurrentUser, method: &Method, id: i64, active: bool) -> ApiResult<Tenant> {
    require(current, method, Permission::Admin)?;
    let tenant = TenantService::new().await?.set_active(id, active).await?;
    tracing::info!(
        "Tenant '{}' {} by {}",
        tenant.name,
        if active { "activated" } else { "deactivated" },
        current.user.username
    );
    Ok(ApiResponse::success(tenant))
}

/// POST /api/root/tenants/:id/activate
pub async fn tenant_activate(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Tenant> {
    set_active(&current, &method, id, true).await
}

/// POST /api/root/tenants/:id/deactivate
pub async fn tenant_deactivate(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Tenant> {
    set_active(&current, &method, id, false).await
}

/// GET /api/admin/users - active accounts, for picking a backup target
pub async fn active_users(method: Method, Extension(current): Extension<CurrentUser>) -> ApiResult<Vec<ActiveUserRow>> {
    require(&current, &method, Permission::Admin)?;
    Ok(ApiResponse::success(UserService::new().await?.active_users().await?))
}
