pub mod audit;
pub mod auth;
pub mod permissions;
pub mod response;
pub mod subscription;
pub mod tenant_context;

pub use audit::request_audit_middleware;
pub use auth::{jwt_auth_middleware, storefront_auth_middleware, AuthUser};
pub use permissions::{require, require_any, Permission};
pub use response::{ApiResponse, ApiResult};
pub use subscription::subscription_guard;
pub use tenant_context::{tenant_context_middleware, CurrentUser, TenantContext};
