use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query},
    http::HeaderMap,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::database::models::AuditAction;
use crate::middleware::audit::request_record;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, TenantContext};
use crate::services::audit::{AuditFilters, AuditLogView, AuditReport, AuditService};

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub user_id: Option<i64>,
}

impl From<AuditQuery> for AuditFilters {
    fn from(q: AuditQuery) -> Self {
        AuditFilters {
            action: q.action.filter(|a| !a.is_empty()),
            start_date: q.start_date.filter(|d| !d.is_empty()),
            end_date: q.end_date.filter(|d| !d.is_empty()),
            user_id: q.user_id,
        }
    }
}

/// GET /api/audit-logs - newest first, scoped to the caller's tenant
pub async fn list(
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AuditLogView>> {
    let logs = AuditService::new().await?.list(tenant.tenant_id(), &query.into()).await?;
    Ok(ApiResponse::success(logs))
}

pub async fn get(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<AuditLogView> {
    Ok(ApiResponse::success(AuditService::new().await?.get(tenant.tenant_id(), id).await?))
}

/// POST /api/audit-logs - user, tenant and client come from the request
pub async fn create(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<AuditLogView> {
    let base = request_record(AuditAction::Other, "", &current, &tenant, &headers, peer.map(|c| c.0));
    let view = AuditService::new().await?.create(&body, base).await?;
    Ok(ApiResponse::created(view))
}

pub async fn actions() -> ApiResult<BTreeMap<&'static str, &'static str>> {
    Ok(ApiResponse::success(AuditService::actions()))
}

pub async fn report(
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<AuditReport> {
    let report = AuditService::new().await?.report(tenant.tenant_id(), &query.into()).await?;
    Ok(ApiResponse::success(report))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub user_id: Option<i64>,
}

pub async fn user_activity(
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Vec<AuditLogView>> {
    let logs = AuditService::new()
        .await?
        .user_activity(tenant.tenant_id(), query.user_id)
        .await?;
    Ok(ApiResponse::success(logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_query_values_are_not_filters() {
        let filters: AuditFilters = AuditQuery {
            action: Some(String::new()),
            start_date: Some("2024-01-01".into()),
            end_date: None,
            user_id: Some(4),
        }
        .into();
        assert_eq!(filters.action, None);
        assert_eq!(filters.start_date.as_deref(), Some("2024-01-01"));
        assert_eq!(filters.user_id, Some(4));
    }
}
