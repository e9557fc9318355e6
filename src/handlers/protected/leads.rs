use axum::{
    extract::{Path, Query},
    http::Method,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::database::models::InteraccionLead;
use crate::handlers::field;
use crate::middleware::{require, require_any, ApiResponse, ApiResult, CurrentUser, Permission, TenantContext};
use crate::services::lead_service::{LeadEmail, LeadMetrics, LeadService, LeadView};

use super::working_store;

const PIPELINE: [Permission; 2] = [Permission::CrmManager, Permission::MarketingReadOnly];
const INTERACTIONS: [Permission; 2] = [Permission::CrmManager, Permission::Marketing];

#[derive(Debug, Default, Deserialize)]
pub struct LeadQuery {
    pub estado: Option<String>,
    pub orden: Option<String>,
}

pub async fn list(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<LeadQuery>,
) -> ApiResult<Vec<LeadView>> {
    require_any(&current, &method, &PIPELINE)?;
    let leads = LeadService::new()
        .await?
        .list(tenant.require()?, query.estado.as_deref(), query.orden.as_deref())
        .await?;
    Ok(ApiResponse::success(leads))
}

pub async fn create(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> ApiResult<LeadView> {
    require_any(&current, &method, &PIPELINE)?;
    let tenant_id = tenant.require()?;
    let tienda_id = working_store(&current, &tenant).await.ok().map(|t| t.id);
    let lead = LeadService::new().await?.create(tenant_id, tienda_id, &body).await?;
    Ok(ApiResponse::created(lead))
}

pub async fn get(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<LeadView> {
    require_any(&current, &method, &PIPELINE)?;
    Ok(ApiResponse::success(LeadService::new().await?.get(tenant.require()?, id).await?))
}

pub async fn update(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<LeadView> {
    require_any(&current, &method, &PIPELINE)?;
    Ok(ApiResponse::success(LeadService::new().await?.update(tenant.require()?, id, &body).await?))
}

pub async fn delete(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    require_any(&current, &method, &PIPELINE)?;
    LeadService::new().await?.delete(tenant.require()?, id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/leads/:id/actualizar_estado
pub async fn update_status(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<LeadView> {
    require_any(&current, &method, &PIPELINE)?;
    let lead = LeadService::new()
        .await?
        .update_status(tenant.require()?, id, field(&body, "estado"))
        .await?;
    Ok(ApiResponse::success(lead))
}

/// GET /api/leads/metricas
pub async fn metrics(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<LeadMetrics> {
    require_any(&current, &method, &PIPELINE)?;
    Ok(ApiResponse::success(LeadService::new().await?.metrics(tenant.require()?).await?))
}

/// GET /api/leads/leads_recientes
pub async fn recent(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<LeadView>> {
    require_any(&current, &method, &PIPELINE)?;
    Ok(ApiResponse::success(LeadService::new().await?.recent(tenant.require()?).await?))
}

/// GET /api/leads/leads_activos
pub async fn active(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<LeadView>> {
    require_any(&current, &method, &PIPELINE)?;
    Ok(ApiResponse::success(LeadService::new().await?.active(tenant.require()?).await?))
}

/// GET /api/leads/emails
pub async fn emails(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<LeadEmail>> {
    require(&current, &method, Permission::Marketing)?;
    Ok(ApiResponse::success(LeadService::new().await?.emails(tenant.require()?).await?))
}

pub async fn interactions(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<InteraccionLead>> {
    require_any(&current, &method, &INTERACTIONS)?;
    Ok(ApiResponse::success(LeadService::new().await?.interactions(tenant.require()?, id).await?))
}

pub async fn add_interaction(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<InteraccionLead> {
    require_any(&current, &method, &INTERACTIONS)?;
    let interaccion = LeadService::new().await?.add_interaction(tenant.require()?, id, &body).await?;
    Ok(ApiResponse::created(interaccion))
}
