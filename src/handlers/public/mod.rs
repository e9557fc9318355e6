// Public handlers: no token required. Token acquisition for staff and
// storefront customers, password recovery, and the read-only storefront
// catalogue of published stores.
pub mod auth;
pub mod catalogue;
pub mod customers;
