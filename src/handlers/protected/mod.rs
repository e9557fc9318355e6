// Protected handlers: staff access token required. Every handler
// receives `CurrentUser` and `TenantContext` from the middleware stack
// (jwt_auth → tenant_context → request_audit) and checks its own
// permission class before touching a service.
pub mod audit;
pub mod backups;
pub mod categories;
pub mod leads;
pub mod payments;
pub mod pedidos;
pub mod public_orders;
pub mod store_style;
pub mod subscriptions;
pub mod tiendas;
pub mod users;

use crate::database::models::Tienda;
use crate::error::ApiError;
use crate::middleware::{CurrentUser, TenantContext};
use crate::services::tienda_service::TiendaService;

/// Store a staff request operates on: the caller's own store, else the
/// first store of the tenant.
pub(crate) async fn working_store(current: &CurrentUser, tenant: &TenantContext) -> Result<Tienda, ApiError> {
    if let Some(tienda) = &current.tienda {
        return Ok(tienda.clone());
    }
    let tenant_id = tenant.require()?;
    TiendaService::new()
        .await?
        .first_of_tenant(tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No se encontró la tienda"))
}
