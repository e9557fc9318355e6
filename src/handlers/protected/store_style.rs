use axum::{extract::Path, http::StatusCode, Extension, Json};
use serde_json::Value;

use crate::database::models::BloqueBienvenida;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, TenantContext};
use crate::services::store_style_service::{BulkCreated, StoreStyleService, StyleView};

pub async fn list(Extension(tenant): Extension<TenantContext>) -> ApiResult<Vec<StyleView>> {
    Ok(ApiResponse::success(StoreStyleService::new().await?.list(tenant.require()?).await?))
}

/// POST /api/store-style - style for the caller's own store
pub async fn create(Extension(current): Extension<CurrentUser>, Json(body): Json<Value>) -> ApiResult<StyleView> {
    let view = StoreStyleService::new().await?.create(current.tienda.as_ref(), &body).await?;
    Ok(ApiResponse::created(view))
}

pub async fn get(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<StyleView> {
    Ok(ApiResponse::success(StoreStyleService::new().await?.get(tenant.require()?, id).await?))
}

pub async fn update(
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<StyleView> {
    let view = StoreStyleService::new().await?.update(tenant.require()?, id, &body).await?;
    Ok(ApiResponse::success(view))
}

pub async fn delete(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<()> {
    StoreStyleService::new().await?.delete(tenant.require()?, id).await?;
    Ok(ApiResponse::no_content())
}

/// GET /api/store-style/mi-estilo
pub async fn my_style(Extension(current): Extension<CurrentUser>) -> ApiResult<StyleView> {
    Ok(ApiResponse::success(StoreStyleService::new().await?.my_style(current.tienda.as_ref()).await?))
}

/// PATCH /api/store-style/mi-estilo
pub async fn update_my_style(Extension(current): Extension<CurrentUser>, Json(body): Json<Value>) -> ApiResult<StyleView> {
    let view = StoreStyleService::new()
        .await?
        .update_my_style(current.tienda.as_ref(), &body)
        .await?;
    Ok(ApiResponse::success(view))
}

// Welcome blocks of the caller's store

pub async fn bloque_list(Extension(current): Extension<CurrentUser>) -> ApiResult<Vec<BloqueBienvenida>> {
    let bloques = StoreStyleService::new().await?.list_bloques(current.tienda.as_ref()).await?;
    Ok(ApiResponse::success(bloques))
}

pub async fn bloque_create(
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<BloqueBienvenida> {
    let bloque = StoreStyleService::new()
        .await?
        .create_bloque(current.tienda.as_ref(), &body)
        .await?;
    Ok(ApiResponse::created(bloque))
}

pub async fn bloque_get(Extension(current): Extension<CurrentUser>, Path(id): Path<i64>) -> ApiResult<BloqueBienvenida> {
    let bloque = StoreStyleService::new().await?.get_bloque(current.tienda.as_ref(), id).await?;
    Ok(ApiResponse::success(bloque))
}

pub async fn bloque_update(
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<BloqueBienvenida> {
    let bloque = StoreStyleService::new()
        .await?
        .update_bloque(current.tienda.as_ref(), id, &body)
        .await?;
    Ok(ApiResponse::success(bloque))
}

pub async fn bloque_delete(Extension(current): Extension<CurrentUser>, Path(id): Path<i64>) -> ApiResult<()> {
    StoreStyleService::new().await?.delete_bloque(current.tienda.as_ref(), id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/store-style/bloques/crear-multiples - 201 when at least one
/// block was created, 400 otherwise
pub async fn bloque_create_many(
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<BulkCreated> {
    let result = StoreStyleService::new()
        .await?
        .create_many(current.tienda.as_ref(), &body)
        .await?;
    let status = if result.creados.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::CREATED
    };
    Ok(ApiResponse::with_status(result, status))
}
