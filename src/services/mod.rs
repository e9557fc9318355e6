pub mod audit;
pub mod backup_service;
pub mod category_service;
pub mod lead_service;
pub mod payment_service;
pub mod pedido_service;
pub mod producto_service;
pub mod store_style_service;
pub mod storefront_service;
pub mod subscription_service;
pub mod tenant_service;
pub mod tienda_service;
pub mod user_service;

use serde_json::Value;
use thiserror::Error;

use crate::database::manager::DatabaseError;

/// Errors shared by the entity services
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Database manager error: {0}")]
    DatabaseManager(#[from] DatabaseError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{field}: {message}")]
    FieldValidation { field: String, message: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    PaymentRequired(String),
    #[error("{0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::FieldValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ServiceError::Forbidden(msg.into())
    }
}

impl From<crate::auth::password::PasswordError> for ServiceError {
    fn from(err: crate::auth::password::PasswordError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

impl From<crate::auth::JwtError> for ServiceError {
    fn from(err: crate::auth::JwtError) -> Self {
        match err {
            crate::auth::JwtError::InvalidToken(msg) => ServiceError::Unauthorized(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<crate::observer::error::ObserverError> for ServiceError {
    fn from(err: crate::observer::error::ObserverError) -> Self {
        use crate::observer::error::ObserverError;
        match err {
            ObserverError::ValidationError(msg) => ServiceError::Validation(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

/// URL slug: lowercase ASCII, accents folded, runs of separators
/// collapsed to a single hyphen.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.trim().chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// Reads an optional string field, treating JSON null as absent
pub fn opt_str(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Reads a required, non-blank string field
pub fn required_str(body: &Value, key: &str) -> ServiceResult<String> {
    match body.get(key).and_then(Value::as_str).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ServiceError::field(key, format!("El campo '{}' es requerido", key))),
    }
}

/// Accepts an integer id given either as number or numeric string
pub fn opt_i64(body: &Value, key: &str) -> Option<i64> {
    match body.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a money amount given as number or string
pub fn opt_decimal(body: &Value, key: &str) -> ServiceResult<Option<rust_decimal::Decimal>> {
    use std::str::FromStr;
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => rust_decimal::Decimal::from_str(&n.to_string())
            .map(Some)
            .map_err(|_| ServiceError::field(key, "Un número válido es requerido.")),
        Some(Value::String(s)) => rust_decimal::Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|_| ServiceError::field(key, "Un número válido es requerido.")),
        Some(_) => Err(ServiceError::field(key, "Un número válido es requerido.")),
    }
}

/// Accepts JSON booleans and the strings "true"/"false"
pub fn opt_bool(body: &Value, key: &str) -> ServiceResult<Option<bool>> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => match s.to_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(ServiceError::field(key, "Debe ser un valor booleano válido.")),
        },
        Some(_) => Err(ServiceError::field(key, "Debe ser un valor booleano válido.")),
    }
}

/// Validates a value against a closed set of choices
pub fn check_choice(field: &str, value: &str, allowed: &[&str]) -> ServiceResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ServiceError::field(
            field,
            format!("\"{}\" no es una elección válida.", value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slugify_folds_accents_and_collapses_separators() {
        assert_eq!(slugify("Tienda de Ana"), "tienda-de-ana");
        assert_eq!(slugify("  Café   Ñandú!! "), "cafe-nandu");
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("user_name"), "user_name");
        assert_eq!(slugify("¡¡!!"), "");
    }

    #[test]
    fn bool_fields_accept_strings() {
        let body = json!({"a": "true", "b": false, "c": null, "d": 3});
        assert_eq!(opt_bool(&body, "a").unwrap(), Some(true));
        assert_eq!(opt_bool(&body, "b").unwrap(), Some(false));
        assert_eq!(opt_bool(&body, "c").unwrap(), None);
        assert!(opt_bool(&body, "d").is_err());
    }

    #[test]
    fn decimals_accept_numbers_and_strings() {
        let body = json!({"a": 10.5, "b": "3.20", "c": "x"});
        assert_eq!(opt_decimal(&body, "a").unwrap().unwrap().to_string(), "10.5");
        assert_eq!(opt_decimal(&body, "b").unwrap().unwrap().to_string(), "3.20");
        assert!(opt_decimal(&body, "c").is_err());
        assert_eq!(opt_decimal(&body, "missing").unwrap(), None);
    }

    #[test]
    fn required_fields_reject_blank() {
        let body = json!({"nombre": "  ", "email": "a@b.c"});
        assert!(matches!(
            required_str(&body, "nombre"),
            Err(ServiceError::FieldValidation { .. })
        ));
        assert_eq!(required_str(&body, "email").unwrap(), "a@b.c");
    }

    #[test]
    fn choices_are_checked() {
        assert!(check_choice("estado", "nuevo", &["nuevo", "ganado"]).is_ok());
        assert!(check_choice("estado", "x", &["nuevo"]).is_err());
    }
}
