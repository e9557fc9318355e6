use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use serde_json::{json, Value};

use crate::config;
use crate::database::models::AuditAction;
use crate::error::ApiError;
use crate::services::audit::{AuditRecord, AuditService};

use super::tenant_context::{CurrentUser, TenantContext};

/// First `X-Forwarded-For` hop, else the peer address
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Base audit record for the caller of a request
pub fn request_record(
    action: AuditAction,
    description: impl Into<String>,
    current: &CurrentUser,
    tenant: &TenantContext,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> AuditRecord {
    let mut record = AuditRecord::new(action, description)
        .by(&current.user)
        .from_client(client_ip(headers, peer), user_agent(headers));
    if let Some(t) = &tenant.tenant {
        record = record.in_tenant(t);
    }
    record
}

/// Records authenticated GET and POST requests as `view` / `create`
/// entries. Audit failures are logged, never returned to the client.
pub async fn request_audit_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let action = match *request.method() {
        Method::GET => AuditAction::View,
        Method::POST => AuditAction::Create,
        _ => return Ok(next.run(request).await),
    };
    if !config::config().security.enable_audit_logging {
        return Ok(next.run(request).await);
    }
    let (Some(current), Some(tenant)) = (
        request.extensions().get::<CurrentUser>().cloned(),
        request.extensions().get::<TenantContext>().cloned(),
    ) else {
        return Ok(next.run(request).await);
    };

    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0);
    let description = format!("{} request to {}", request.method(), request.uri().path());
    let mut record = request_record(action, description, &current, &tenant, request.headers(), peer);

    let request = if action == AuditAction::Create && is_json(request.headers()) {
        let (parts, body) = request.into_parts();
        let limit = config::config().api.max_request_size_bytes;
        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|_| ApiError::bad_request("El cuerpo de la solicitud es demasiado grande"))?;
        let metadata = serde_json::from_slice::<Value>(&bytes).unwrap_or_else(|_| json!({}));
        record = record.with_metadata(json!({ "data": metadata }));
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };

    match AuditService::new().await {
        Ok(service) => service.log_quietly(record).await,
        Err(e) => tracing::error!("Audit service unavailable: {}", e),
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_wins_over_peer() {
        let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.9"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.7"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
