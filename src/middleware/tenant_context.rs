use axum::{extract::Request, middleware::Next, response::Response};

use crate::database::manager::DatabaseManager;
use crate::database::models::{Tenant, Tienda, User};
use crate::error::ApiError;
use crate::services::tienda_service::TiendaService;
use crate::services::user_service::UserService;

use super::auth::AuthUser;

/// The authenticated user row plus the store they own, if any
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user: User,
    pub tienda: Option<Tienda>,
}

impl CurrentUser {
    pub fn owns_store(&self) -> bool {
        self.tienda.is_some()
    }

    pub fn tienda_id(&self) -> Option<i64> {
        self.tienda.as_ref().map(|t| t.id)
    }
}

/// Tenant of the authenticated user; `None` for users not yet assigned
#[derive(Clone, Debug)]
pub struct TenantContext {
    pub tenant: Option<Tenant>,
}

impl TenantContext {
    pub fn tenant_id(&self) -> Option<i64> {
        self.tenant.as_ref().map(|t| t.id)
    }

    /// Tenant id for handlers that only make sense inside a tenant
    pub fn require(&self) -> Result<i64, ApiError> {
        self.tenant_id()
            .ok_or_else(|| ApiError::bad_request("No se encontró un tenant asociado a tu cuenta"))
    }
}

/// Loads the user named by the token, requires it to be active, then
/// resolves its tenant and store. Runs after `jwt_auth_middleware`.
pub async fn tenant_context_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before tenant resolution"))?;

    let pool = DatabaseManager::main_pool().await?;
    let user = UserService::with_pool(pool.clone())
        .find(auth_user.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| {
            tracing::warn!("Token for inactive or missing user {} ({})", auth_user.username, auth_user.user_id);
            ApiError::unauthorized("Usuario inactivo o inexistente")
        })?;

    let tenant = match user.tenant_id {
        Some(tenant_id) => {
            let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
                .bind(tenant_id)
                .fetch_optional(&pool)
                .await?;
            match tenant {
                Some(tenant) if tenant.is_active => Some(tenant),
                other => {
                    let name = other.map(|t| t.name).unwrap_or_else(|| tenant_id.to_string());
                    tracing::warn!("Tenant '{}' rejected for user {}", name, user.username);
                    return Err(ApiError::forbidden(format!(
                        "Tenant '{}' is not active or does not exist",
                        name
                    )));
                }
            }
        }
        None => None,
    };

    let tienda = TiendaService::with_pool(pool).for_user(user.id).await?;
    tracing::debug!(
        "Request context: user {} tenant {:?} store {:?}",
        user.username,
        tenant.as_ref().map(|t| t.id),
        tienda.as_ref().map(|t| t.id)
    );

    request.extensions_mut().insert(TenantContext { tenant });
    request.extensions_mut().insert(CurrentUser { user, tienda });
    Ok(next.run(request).await)
}
