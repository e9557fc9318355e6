use axum::{extract::Path, Extension, Json};
use serde_json::Value;

use crate::database::models::Category;
use crate::middleware::{ApiResponse, ApiResult, TenantContext};
use crate::services::category_service::CategoryService;

pub async fn list(Extension(tenant): Extension<TenantContext>) -> ApiResult<Vec<Category>> {
    let tenant_id = tenant.require()?;
    Ok(ApiResponse::success(CategoryService::new().await?.list(tenant_id).await?))
}

pub async fn create(Extension(tenant): Extension<TenantContext>, Json(body): Json<Value>) -> ApiResult<Category> {
    let tenant_id = tenant.require()?;
    Ok(ApiResponse::created(CategoryService::new().await?.create(tenant_id, &body).await?))
}

pub async fn get(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<Category> {
    let tenant_id = tenant.require()?;
    Ok(ApiResponse::success(CategoryService::new().await?.get(tenant_id, id).await?))
}

pub async fn update(
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Category> {
    let tenant_id = tenant.require()?;
    Ok(ApiResponse::success(CategoryService::new().await?.update(tenant_id, id, &body).await?))
}

pub async fn delete(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<()> {
    let tenant_id = tenant.require()?;
    CategoryService::new().await?.delete(tenant_id, id).await?;
    Ok(ApiResponse::no_content())
}
