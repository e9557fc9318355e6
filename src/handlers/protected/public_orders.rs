use axum::{extract::Path, Extension, Json};
use serde_json::{json, Value};

use crate::handlers::field;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, TenantContext};
use crate::services::storefront_service::{PedidoPublicoView, StorefrontService};

use super::working_store;

pub async fn list(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<PedidoPublicoView>> {
    let tienda = working_store(&current, &tenant).await?;
    Ok(ApiResponse::success(StorefrontService::new().await?.store_orders(tienda.id).await?))
}

pub async fn get(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<PedidoPublicoView> {
    let tienda = working_store(&current, &tenant).await?;
    Ok(ApiResponse::success(StorefrontService::new().await?.store_order_view(tienda.id, id).await?))
}

/// GET /api/pedidos-publicos/por_tienda
pub async fn by_store(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<PedidoPublicoView>> {
    let tienda = working_store(&current, &tenant).await?;
    Ok(ApiResponse::success(StorefrontService::new().await?.orders_by_store(tienda.id).await?))
}

/// POST /api/pedidos-publicos/:id/actualizar_estado
pub async fn update_status(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<PedidoPublicoView> {
    let tienda = working_store(&current, &tenant).await?;
    let pedido = StorefrontService::new()
        .await?
        .update_status(tienda.id, id, field(&body, "estado"))
        .await?;
    Ok(ApiResponse::success(pedido))
}

/// POST /api/pedidos-publicos/:id/agregar_codigo_seguimiento
pub async fn add_tracking_code(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    let tienda = working_store(&current, &tenant).await?;
    StorefrontService::new()
        .await?
        .add_tracking_code(tienda.id, id, field(&body, "codigo_seguimiento"))
        .await?;
    Ok(ApiResponse::success(json!({ "message": "Código de seguimiento agregado correctamente" })))
}
