use axum::{extract::Request, http::Method, middleware::Next, response::Response};

use crate::error::ApiError;
use crate::services::subscription_service::SubscriptionService;

use super::tenant_context::{CurrentUser, TenantContext};

const PREFIX: &str = "/api/subscriptions";

/// Paths under the subscriptions prefix reachable without an active plan:
/// public plan listings, the payment simulator, subscribing and looking up
/// the current subscription.
pub fn is_exempt(method: &Method, path: &str) -> bool {
    let Some(rest) = path.strip_prefix(PREFIX) else {
        return true;
    };
    let rest = rest.trim_end_matches('/');
    matches!(rest, "/plans/public" | "/plans/base" | "/simulate-payment" | "/subscriptions/current")
        || (rest == "/subscriptions" && method == Method::POST)
}

/// Requires an active or in-trial subscription for the caller's tenant
pub async fn subscription_guard(request: Request, next: Next) -> Result<Response, ApiError> {
    if is_exempt(request.method(), request.uri().path()) {
        return Ok(next.run(request).await);
    }

    if request.extensions().get::<CurrentUser>().is_none() {
        return Err(ApiError::unauthorized("Se requiere autenticación"));
    }
    let tenant_id = request
        .extensions()
        .get::<TenantContext>()
        .and_then(TenantContext::tenant_id)
        .ok_or_else(|| ApiError::forbidden("No se encontró un tenant asociado a tu cuenta"))?;

    let subscription = SubscriptionService::new().await?.for_tenant(tenant_id).await?;
    if !subscription.is_some_and(|s| s.grants_access()) {
        tracing::info!("Tenant {} blocked on {}: no active subscription", tenant_id, request.uri().path());
        return Err(ApiError::payment_required("Se requiere una suscripción activa"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_and_onboarding_paths_are_exempt() {
        assert!(is_exempt(&Method::GET, "/api/subscriptions/plans/public"));
        assert!(is_exempt(&Method::GET, "/api/subscriptions/plans/base"));
        assert!(is_exempt(&Method::POST, "/api/subscriptions/simulate-payment"));
        assert!(is_exempt(&Method::POST, "/api/subscriptions/subscriptions"));
        assert!(is_exempt(&Method::GET, "/api/subscriptions/subscriptions/current"));
        assert!(is_exempt(&Method::GET, "/api/leads"));
    }

    #[test]
    fn everything_else_is_guarded() {
        assert!(!is_exempt(&Method::GET, "/api/subscriptions/subscriptions"));
        assert!(!is_exempt(&Method::GET, "/api/subscriptions/plans"));
        assert!(!is_exempt(&Method::POST, "/api/subscriptions/subscriptions/3/renew"));
        assert!(!is_exempt(&Method::GET, "/api/subscriptions/subscriptions/usage"));
    }
}
