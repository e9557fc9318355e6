// Ring 8: storefront orders are recorded as purchases on the buyer's lead
use async_trait::async_trait;

use crate::observer::context::ObserverContext;
use crate::observer::error::ObserverError;
use crate::observer::traits::{AsyncObserver, Observer, ObserverRing, Signal, SignalKind};
use crate::services::lead_service::LeadService;

#[derive(Default)]
pub struct PurchaseInteraction;

impl Observer for PurchaseInteraction {
    fn name(&self) -> &'static str {
        "PurchaseInteraction"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::Integration
    }

    fn applies_to(&self, signal: SignalKind) -> bool {
        signal == SignalKind::PublicOrderCreated
    }
}

#[async_trait]
impl AsyncObserver for PurchaseInteraction {
    async fn execute(&self, ctx: &ObserverContext) -> Result<(), ObserverError> {
        if let Signal::PublicOrderCreated(pedido) = &ctx.signal {
            let lead = LeadService::with_pool(ctx.pool.clone())
                .record_public_purchase(pedido)
                .await?;
            tracing::info!("Purchase of order {} recorded on lead {}", pedido.id, lead.id);
        }
        Ok(())
    }
}
