// Handlers grouped by security tier:
// public (no token) → storefront (customer token) → protected (staff
// access token + tenant context) → elevated (protected, admin only).
pub mod elevated;
pub mod protected;
pub mod public;
pub mod storefront;

use serde_json::Value;

/// String field of a JSON body, ignoring non-string values
pub(crate) fn field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}
