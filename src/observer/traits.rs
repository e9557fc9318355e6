use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::database::models::{PedidoPublico, StorefrontUser, Tenant, User};
use crate::observer::context::ObserverContext;
use crate::observer::error::ObserverError;

/// Observer rings with semantic meaning - synchronous (0-6) and asynchronous (7-9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ObserverRing {
    DataPreparation = 0,    // Load related rows
    InputValidation = 1,    // Reject malformed signals
    Security = 2,           // Ownership checks
    Business = 3,           // Domain rules
    Enrichment = 4,         // Computed fields, defaults
    Database = 5,           // Writes owned by the emitting service
    PostDatabase = 6,       // Dependent rows that must exist before the response
    Audit = 7,              // Audit trail (async)
    Integration = 8,        // CRM side effects (async)
    Notification = 9,       // User notifications (async)
}

impl ObserverRing {
    pub const ALL: [ObserverRing; 10] = [
        ObserverRing::DataPreparation,
        ObserverRing::InputValidation,
        ObserverRing::Security,
        ObserverRing::Business,
        ObserverRing::Enrichment,
        ObserverRing::Database,
        ObserverRing::PostDatabase,
        ObserverRing::Audit,
        ObserverRing::Integration,
        ObserverRing::Notification,
    ];

    /// Check if ring executes synchronously (blocking)
    pub fn is_synchronous(&self) -> bool {
        (*self as u8) <= 6
    }

    /// Check if ring executes asynchronously (non-blocking)
    pub fn is_asynchronous(&self) -> bool {
        (*self as u8) >= 7
    }
}

/// Domain events emitted by services after their own writes commit
#[derive(Debug, Clone)]
pub enum Signal {
    UserCreated(User),
    StorefrontUserCreated(StorefrontUser),
    PublicOrderCreated(PedidoPublico),
    TenantCreated(Tenant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    UserCreated,
    StorefrontUserCreated,
    PublicOrderCreated,
    TenantCreated,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::UserCreated(_) => SignalKind::UserCreated,
            Signal::StorefrontUserCreated(_) => SignalKind::StorefrontUserCreated,
            Signal::PublicOrderCreated(_) => SignalKind::PublicOrderCreated,
            Signal::TenantCreated(_) => SignalKind::TenantCreated,
        }
    }
}

/// Base trait for all observers with metadata and applicability checks
pub trait Observer: Send + Sync {
    /// Observer name for logging and debugging
    fn name(&self) -> &'static str;

    /// Which ring this observer belongs to
    fn ring(&self) -> ObserverRing;

    fn applies_to(&self, signal: SignalKind) -> bool;

    /// Execution timeout (default 5 seconds)
    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Priority within ring (lower numbers execute first)
    fn priority(&self) -> u8 {
        50
    }
}

/// Rings 0-6: runs inline, may record errors the caller acts on
#[async_trait]
pub trait SyncObserver: Observer {
    async fn execute(&self, ctx: &mut ObserverContext) -> Result<(), ObserverError>;
}

/// Rings 7-9: runs on a spawned task after the response path is done
#[async_trait]
pub trait AsyncObserver: Observer {
    async fn execute(&self, ctx: &ObserverContext) -> Result<(), ObserverError>;
}

pub enum ObserverBox {
    Sync(Box<dyn SyncObserver>),
    Async(Arc<dyn AsyncObserver>),
}

impl ObserverBox {
    pub fn name(&self) -> &'static str {
        match self {
            ObserverBox::Sync(o) => o.name(),
            ObserverBox::Async(o) => o.name(),
        }
    }

    pub fn ring(&self) -> ObserverRing {
        match self {
            ObserverBox::Sync(o) => o.ring(),
            ObserverBox::Async(o) => o.ring(),
        }
    }

    pub fn applies_to(&self, signal: SignalKind) -> bool {
        match self {
            ObserverBox::Sync(o) => o.applies_to(signal),
            ObserverBox::Async(o) => o.applies_to(signal),
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            ObserverBox::Sync(o) => o.timeout(),
            ObserverBox::Async(o) => o.timeout(),
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            ObserverBox::Sync(o) => o.priority(),
            ObserverBox::Async(o) => o.priority(),
        }
    }
}
