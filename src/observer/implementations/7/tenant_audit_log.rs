// Ring 7: new tenants get their own signed audit log file
use async_trait::async_trait;

use crate::observer::context::ObserverContext;
use crate::observer::error::ObserverError;
use crate::observer::traits::{AsyncObserver, Observer, ObserverRing, Signal, SignalKind};
use crate::services::audit::SecureAuditLog;

#[derive(Default)]
pub struct TenantAuditLog;

impl Observer for TenantAuditLog {
    fn name(&self) -> &'static str {
        "TenantAuditLog"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::Audit
    }

    fn applies_to(&self, signal: SignalKind) -> bool {
        signal == SignalKind::TenantCreated
    }
}

#[async_trait]
impl AsyncObserver for TenantAuditLog {
    async fn execute(&self, ctx: &ObserverContext) -> Result<(), ObserverError> {
        if let Signal::TenantCreated(tenant) = &ctx.signal {
            let path = SecureAuditLog::from_config().prepare_tenant_log(tenant).await?;
            tracing::info!("Audit log for tenant '{}' ready at {}", tenant.name, path.display());
        }
        Ok(())
    }
}
