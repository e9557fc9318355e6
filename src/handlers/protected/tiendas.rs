use axum::{
    extract::{Path, Query},
    http::Method,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::database::models::{Categoria, Producto, Tienda};
use crate::error::ApiError;
use crate::middleware::{require, ApiResponse, ApiResult, CurrentUser, Permission, TenantContext};
use crate::services::producto_service::{CategoriaService, ProductoService};
use crate::services::tienda_service::TiendaService;

use super::working_store;

// Stores

pub async fn tienda_list(Extension(tenant): Extension<TenantContext>) -> ApiResult<Vec<Tienda>> {
    let tenant_id = tenant.require()?;
    Ok(ApiResponse::success(TiendaService::new().await?.list(tenant_id).await?))
}

pub async fn tienda_create(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> ApiResult<Tienda> {
    let tenant_id = tenant.require()?;
    let tienda = TiendaService::new().await?.create(&current.user, tenant_id, &body).await?;
    Ok(ApiResponse::created(tienda))
}

pub async fn tienda_get(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<Tienda> {
    let tenant_id = tenant.require()?;
    Ok(ApiResponse::success(TiendaService::new().await?.get(tenant_id, id).await?))
}

pub async fn tienda_update(
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Tienda> {
    let tenant_id = tenant.require()?;
    Ok(ApiResponse::success(TiendaService::new().await?.update(tenant_id, id, &body).await?))
}

pub async fn tienda_delete(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<()> {
    let tenant_id = tenant.require()?;
    TiendaService::new().await?.delete(tenant_id, id).await?;
    Ok(ApiResponse::no_content())
}

/// GET /api/tiendas/tiendas/tienda-por-usuario
pub async fn tienda_por_usuario(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Tienda> {
    if tenant.tenant.is_none() {
        return Err(ApiError::bad_request("No se encontró el tenant"));
    }
    let tienda = current.tienda.ok_or_else(|| ApiError::not_found("No se encontró la tienda"))?;
    Ok(ApiResponse::success(tienda))
}

/// GET /api/tiendas/tiendas/config
pub async fn config_get(Extension(current): Extension<CurrentUser>) -> ApiResult<Tienda> {
    Ok(ApiResponse::success(TiendaService::new().await?.config_for(&current.user).await?))
}

/// PATCH /api/tiendas/tiendas/config
pub async fn config_patch(Extension(current): Extension<CurrentUser>, Json(body): Json<Value>) -> ApiResult<Tienda> {
    let tienda = TiendaService::new().await?.update_config(&current.user, &body).await?;
    Ok(ApiResponse::success(tienda))
}

// Store categories

pub async fn categoria_list(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<Categoria>> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    Ok(ApiResponse::success(CategoriaService::new().await?.list(tienda.id).await?))
}

pub async fn categoria_create(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> ApiResult<Categoria> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    Ok(ApiResponse::created(CategoriaService::new().await?.create(tienda.id, &body).await?))
}

pub async fn categoria_get(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<Categoria> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    Ok(ApiResponse::success(CategoriaService::new().await?.get(tienda.id, id).await?))
}

pub async fn categoria_update(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Categoria> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    Ok(ApiResponse::success(CategoriaService::new().await?.update(tienda.id, id, &body).await?))
}

pub async fn categoria_delete(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    CategoriaService::new().await?.delete(tienda.id, id).await?;
    Ok(ApiResponse::no_content())
}

// Products

#[derive(Debug, Default, Deserialize)]
pub struct ProductoQuery {
    pub show_deleted: Option<bool>,
    /// JSON filter, e.g. `{"precio": {"$lte": 100}}`
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
}

impl ProductoQuery {
    fn filter(&self) -> Result<Option<Value>, ApiError> {
        self.where_clause
            .as_deref()
            .map(|raw| serde_json::from_str(raw).map_err(|e| ApiError::invalid_json(format!("where: {}", e))))
            .transpose()
    }
}

pub async fn producto_list(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<ProductoQuery>,
) -> ApiResult<Vec<Producto>> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    let include_deleted = current.user.is_admin() && query.show_deleted.unwrap_or(false);
    let productos = ProductoService::new()
        .await?
        .list(tienda.id, include_deleted, query.filter()?)
        .await?;
    Ok(ApiResponse::success(productos))
}

/// GET /api/tiendas/productos/low-stock
pub async fn producto_low_stock(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<Producto>> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    Ok(ApiResponse::success(ProductoService::new().await?.low_stock(tienda.id).await?))
}

pub async fn producto_create(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> ApiResult<Producto> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    let producto = ProductoService::new().await?.create(tienda.id, tienda.tenant_id, &body).await?;
    Ok(ApiResponse::created(producto))
}

pub async fn producto_get(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Query(query): Query<ProductoQuery>,
) -> ApiResult<Producto> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    let include_deleted = current.user.is_admin() && query.show_deleted.unwrap_or(false);
    Ok(ApiResponse::success(ProductoService::new().await?.get(tienda.id, id, include_deleted).await?))
}

pub async fn producto_update(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Producto> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    Ok(ApiResponse::success(ProductoService::new().await?.update(tienda.id, id, &body).await?))
}

/// Soft delete
pub async fn producto_delete(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    require(&current, &method, Permission::StockManager)?;
    let tienda = working_store(&current, &tenant).await?;
    ProductoService::new().await?.delete(tienda.id, tienda.tenant_id, id).await?;
    Ok(ApiResponse::no_content())
}
