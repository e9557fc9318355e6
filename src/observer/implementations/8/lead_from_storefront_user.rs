// Ring 8: storefront sign-ups become leads of that store
use async_trait::async_trait;

use crate::observer::context::ObserverContext;
use crate::observer::error::ObserverError;
use crate::observer::traits::{AsyncObserver, Observer, ObserverRing, Signal, SignalKind};
use crate::services::lead_service::LeadService;

#[derive(Default)]
pub struct LeadFromStorefrontUser;

impl Observer for LeadFromStorefrontUser {
    fn name(&self) -> &'static str {
        "LeadFromStorefrontUser"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::Integration
    }

    fn applies_to(&self, signal: SignalKind) -> bool {
        signal == SignalKind::StorefrontUserCreated
    }
}

#[async_trait]
impl AsyncObserver for LeadFromStorefrontUser {
    async fn execute(&self, ctx: &ObserverContext) -> Result<(), ObserverError> {
        if let Signal::StorefrontUserCreated(customer) = &ctx.signal {
            let lead = LeadService::with_pool(ctx.pool.clone())
                .lead_from_storefront_user(customer)
                .await?;
            tracing::info!("Lead {} created for storefront customer {}", lead.id, customer.email);
        }
        Ok(())
    }
}
