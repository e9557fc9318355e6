// Ring 8: register new accounts as leads of their tenant's store
use async_trait::async_trait;

use crate::observer::context::ObserverContext;
use crate::observer::error::ObserverError;
use crate::observer::traits::{AsyncObserver, Observer, ObserverRing, Signal, SignalKind};
use crate::services::lead_service::LeadService;

#[derive(Default)]
pub struct LeadFromUser;

impl Observer for LeadFromUser {
    fn name(&self) -> &'static str {
        "LeadFromUser"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::Integration
    }

    fn applies_to(&self, signal: SignalKind) -> bool {
        signal == SignalKind::UserCreated
    }
}

#[async_trait]
impl AsyncObserver for LeadFromUser {
    async fn execute(&self, ctx: &ObserverContext) -> Result<(), ObserverError> {
        let Signal::UserCreated(user) = &ctx.signal else {
            return Ok(());
        };
        match LeadService::with_pool(ctx.pool.clone()).lead_from_user(user).await? {
            Some(lead) => tracing::info!("Lead {} created for user {}", lead.id, user.username),
            None => tracing::warn!("No store in tenant of user {}, lead not created", user.username),
        }
        Ok(())
    }
}
