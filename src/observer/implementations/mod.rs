// Observer implementations organized by rings

use std::sync::Arc;

use crate::observer::pipeline::ObserverPipeline;
use crate::observer::traits::ObserverBox;

// Ring 6: Post-Database - rows that must exist before the response
#[path = "6/default_store_for_seller.rs"]
pub mod default_store_for_seller;

// Ring 7: Audit
#[path = "7/tenant_audit_log.rs"]
pub mod tenant_audit_log;

// Ring 8: Integration - CRM side effects
#[path = "8/lead_from_user.rs"]
pub mod lead_from_user;
#[path = "8/lead_from_storefront_user.rs"]
pub mod lead_from_storefront_user;
#[path = "8/purchase_interaction.rs"]
pub mod purchase_interaction;

pub use default_store_for_seller::DefaultStoreForSeller;
pub use lead_from_storefront_user::LeadFromStorefrontUser;
pub use lead_from_user::LeadFromUser;
pub use purchase_interaction::PurchaseInteraction;
pub use tenant_audit_log::TenantAuditLog;

pub fn register_default_observers(pipeline: &mut ObserverPipeline) {
    pipeline.register_observer(ObserverBox::Sync(Box::new(DefaultStoreForSeller)));
    pipeline.register_observer(ObserverBox::Async(Arc::new(TenantAuditLog)));
    pipeline.register_observer(ObserverBox::Async(Arc::new(LeadFromUser)));
    pipeline.register_observer(ObserverBox::Async(Arc::new(LeadFromStorefrontUser)));
    pipeline.register_observer(ObserverBox::Async(Arc::new(PurchaseInteraction)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_builtin_observers() {
        let mut pipeline = ObserverPipeline::new();
        register_default_observers(&mut pipeline);
        assert_eq!(pipeline.observer_count(), 5);
    }
}
