// Ring 6: every new seller account gets a store before registration returns
use async_trait::async_trait;

use crate::database::models::Role;
use crate::observer::context::ObserverContext;
use crate::observer::error::{ObserverError, ObserverWarning};
use crate::observer::traits::{Observer, ObserverRing, Signal, SignalKind, SyncObserver};
use crate::services::tienda_service::TiendaService;

#[derive(Default)]
pub struct DefaultStoreForSeller;

impl Observer for DefaultStoreForSeller {
    fn name(&self) -> &'static str {
        "DefaultStoreForSeller"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::PostDatabase
    }

    fn applies_to(&self, signal: SignalKind) -> bool {
        signal == SignalKind::UserCreated
    }
}

#[async_trait]
impl SyncObserver for DefaultStoreForSeller {
    async fn execute(&self, ctx: &mut ObserverContext) -> Result<(), ObserverError> {
        let Signal::UserCreated(user) = &ctx.signal else {
            return Ok(());
        };
        if !user.has_role(Role::Vendedor) {
            return Ok(());
        }
        let Some(tenant_id) = user.tenant_id else {
            ctx.add_warning(ObserverWarning::new(
                self.name(),
                self.ring(),
                format!("Seller {} has no tenant, no store created", user.username),
            ));
            return Ok(());
        };

        let service = TiendaService::with_pool(ctx.pool.clone());
        if let Some(tienda) = service.create_default_for_seller(user, tenant_id).await? {
            tracing::info!("Created default store '{}' for seller {}", tienda.slug, user.username);
        }
        Ok(())
    }
}
