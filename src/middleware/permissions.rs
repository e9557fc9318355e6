use axum::http::Method;

use crate::database::models::Role;
use crate::error::ApiError;

use super::tenant_context::CurrentUser;

/// Role based permission classes checked by handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Admin,
    StockManager,
    CrmManager,
    Marketing,
    Seller,
    /// Marketing staff or store owners, safe methods only
    MarketingReadOnly,
}

impl Permission {
    pub fn allows(&self, current: &CurrentUser, method: &Method) -> bool {
        let user = &current.user;
        let admin = user.is_admin();
        let owner = user.has_role(Role::Cliente) && current.owns_store();
        match self {
            Permission::Admin => admin,
            Permission::StockManager => admin || user.has_role(Role::Stock) || owner,
            Permission::CrmManager => admin || user.has_role(Role::Crm) || owner,
            Permission::Marketing => admin || user.has_role(Role::Marketing) || owner,
            Permission::Seller => admin || user.has_role(Role::Vendedor) || owner,
            Permission::MarketingReadOnly => {
                (user.has_role(Role::Marketing) || owner) && is_safe(method)
            }
        }
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Passes when any of the given permissions allows the request
pub fn require_any(current: &CurrentUser, method: &Method, permissions: &[Permission]) -> Result<(), ApiError> {
    if permissions.iter().any(|p| p.allows(current, method)) {
        return Ok(());
    }
    tracing::warn!(
        "Permission denied for {} ({}) on {} request",
        current.user.username,
        current.user.role,
        method
    );
    Err(ApiError::forbidden("Usted no tiene permiso para realizar esta acción."))
}

pub fn require(current: &CurrentUser, method: &Method, permission: Permission) -> Result<(), ApiError> {
    require_any(current, method, &[permission])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::sample_user;
    use crate::database::models::Tienda;

    fn current(role: &str, owns_store: bool) -> CurrentUser {
        let mut user = sample_user();
        user.role = role.to_string();
        let tienda = owns_store.then(|| Tienda {
            id: 1,
            tenant_id: 7,
            usuario_id: user.id,
            nombre: "Tienda de ana".into(),
            logo: None,
            descripcion: String::new(),
            tema: "default".into(),
            publicado: true,
            color_primario: "#3B82F6".into(),
            color_secundario: "#1E40AF".into(),
            color_texto: "#1F2937".into(),
            color_fondo: "#F3F4F6".into(),
            slug: "ana".into(),
        });
        CurrentUser { user, tienda }
    }

    #[test]
    fn store_owning_clients_act_as_managers() {
        let owner = current("cliente", true);
        for p in [Permission::StockManager, Permission::CrmManager, Permission::Marketing, Permission::Seller] {
            assert!(p.allows(&owner, &Method::POST), "{:?}", p);
        }
        assert!(!Permission::Admin.allows(&owner, &Method::GET));

        let client = current("cliente", false);
        assert!(!Permission::StockManager.allows(&client, &Method::GET));
    }

    #[test]
    fn roles_map_to_their_permission() {
        assert!(Permission::StockManager.allows(&current("stock", false), &Method::DELETE));
        assert!(!Permission::CrmManager.allows(&current("stock", false), &Method::GET));
        assert!(Permission::Seller.allows(&current("vendedor", false), &Method::POST));
        assert!(Permission::Admin.allows(&current("admin", false), &Method::POST));
    }

    #[test]
    fn marketing_read_only_blocks_writes() {
        let marketing = current("marketing", false);
        assert!(Permission::MarketingReadOnly.allows(&marketing, &Method::GET));
        assert!(!Permission::MarketingReadOnly.allows(&marketing, &Method::POST));
        assert!(require_any(&marketing, &Method::POST, &[Permission::CrmManager, Permission::MarketingReadOnly]).is_err());
    }
}
