use axum::{extract::Path, http::Method, Extension, Json};
use serde_json::Value;

use crate::database::models::NotificacionPedido;
use crate::error::ApiError;
use crate::handlers::field;
use crate::middleware::{require, ApiResponse, ApiResult, CurrentUser, Permission, TenantContext};
use crate::services::pedido_service::{PedidoService, PedidoView};
use crate::services::tienda_service::TiendaService;

use super::working_store;

/// Store whose orders the caller sees; `None` falls back to the caller's
/// own orders as a client.
async fn order_scope(current: &CurrentUser, tenant: &TenantContext) -> Result<Option<i64>, ApiError> {
    if let Some(id) = current.tienda_id() {
        return Ok(Some(id));
    }
    match tenant.tenant_id() {
        Some(tenant_id) => Ok(TiendaService::new().await?.first_of_tenant(tenant_id).await?.map(|t| t.id)),
        None => Ok(None),
    }
}

pub async fn list(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<PedidoView>> {
    require(&current, &method, Permission::Seller)?;
    let scope = order_scope(&current, &tenant).await?;
    Ok(ApiResponse::success(PedidoService::new().await?.list(scope, current.user.id).await?))
}

pub async fn create(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> ApiResult<PedidoView> {
    require(&current, &method, Permission::Seller)?;
    let tienda = working_store(&current, &tenant).await?;
    let pedido = PedidoService::new().await?.create(tienda.id, current.user.id, &body).await?;
    Ok(ApiResponse::created(pedido))
}

pub async fn get(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<PedidoView> {
    require(&current, &method, Permission::Seller)?;
    let scope = order_scope(&current, &tenant).await?;
    Ok(ApiResponse::success(PedidoService::new().await?.get(scope, current.user.id, id).await?))
}

pub async fn update(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<PedidoView> {
    require(&current, &method, Permission::Seller)?;
    let scope = order_scope(&current, &tenant).await?;
    let pedido = PedidoService::new().await?.update(scope, current.user.id, id, &body).await?;
    Ok(ApiResponse::success(pedido))
}

pub async fn delete(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    require(&current, &method, Permission::Seller)?;
    let scope = order_scope(&current, &tenant).await?;
    PedidoService::new().await?.delete(scope, current.user.id, id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/tiendas/pedidos/:id/actualizar_estado
pub async fn update_status(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<PedidoView> {
    require(&current, &method, Permission::Seller)?;
    let scope = order_scope(&current, &tenant).await?;
    let pedido = PedidoService::new()
        .await?
        .update_status(scope, current.user.id, id, field(&body, "estado"))
        .await?;
    Ok(ApiResponse::success(pedido))
}

/// POST /api/tiendas/pedidos/:id/agregar_codigo_seguimiento
pub async fn add_tracking_code(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<PedidoView> {
    require(&current, &method, Permission::Seller)?;
    let scope = order_scope(&current, &tenant).await?;
    let pedido = PedidoService::new()
        .await?
        .add_tracking_code(scope, current.user.id, id, field(&body, "codigo_seguimiento"))
        .await?;
    Ok(ApiResponse::success(pedido))
}

// Notifications of the caller's own orders

pub async fn notification_list(Extension(current): Extension<CurrentUser>) -> ApiResult<Vec<NotificacionPedido>> {
    Ok(ApiResponse::success(PedidoService::new().await?.notifications(current.user.id).await?))
}

pub async fn notification_get(
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<NotificacionPedido> {
    Ok(ApiResponse::success(PedidoService::new().await?.notification(current.user.id, id).await?))
}

/// POST /api/tiendas/notificaciones-pedido/:id/marcar_como_leido
pub async fn notification_mark_read(
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<NotificacionPedido> {
    let notificacion = PedidoService::new().await?.mark_notification_read(current.user.id, id).await?;
    Ok(ApiResponse::success(notificacion))
}
