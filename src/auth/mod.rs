pub mod password;
pub mod reset_token;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::database::models::{StorefrontUser, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
    /// Issued to public storefront customers, never accepted on staff routes
    Storefront,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub tenant_id: Option<i64>,
    pub role: String,
    pub tienda_id: Option<i64>,
    pub token_type: TokenType,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    fn build(sub: i64, username: String, tenant_id: Option<i64>, role: String, token_type: TokenType, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub,
            username,
            tenant_id,
            role,
            tienda_id: None,
            token_type,
            jti: Uuid::new_v4().simple().to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn access(user: &User) -> Self {
        let hours = config::config().security.jwt_expiry_hours as i64;
        Self::build(user.id, user.username.clone(), user.tenant_id, user.role.clone(), TokenType::Access, Duration::hours(hours))
    }

    pub fn refresh(user: &User) -> Self {
        let days = config::config().security.refresh_expiry_days as i64;
        Self::build(user.id, user.username.clone(), user.tenant_id, user.role.clone(), TokenType::Refresh, Duration::days(days))
    }

    pub fn storefront(customer: &StorefrontUser) -> Self {
        let hours = config::config().security.jwt_expiry_hours as i64;
        let mut claims = Self::build(
            customer.id,
            customer.email.clone(),
            None,
            "storefront".to_string(),
            TokenType::Storefront,
            Duration::hours(hours),
        );
        claims.tienda_id = Some(customer.tienda_id);
        claims
    }
}

#[derive(Debug)]
pub enum JwtError {
    TokenGeneration(String),
    InvalidSecret,
    InvalidToken(String),
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::TokenGeneration(msg) => write!(f, "JWT generation error: {}", msg),
            JwtError::InvalidSecret => write!(f, "Invalid JWT secret"),
            JwtError::InvalidToken(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for JwtError {}

fn secret() -> Result<&'static str, JwtError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }
    Ok(secret)
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let encoding_key = EncodingKey::from_secret(secret()?.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Decode and verify signature and expiry
pub fn decode_jwt(token: &str) -> Result<Claims, JwtError> {
    let decoding_key = DecodingKey::from_secret(secret()?.as_bytes());
    decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| JwtError::InvalidToken(format!("Token inválido o expirado: {}", e)))
}

/// Decode a token and require a specific token type
pub fn decode_jwt_of_type(token: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let claims = decode_jwt(token)?;
    if claims.token_type != expected {
        return Err(JwtError::InvalidToken("Tipo de token no válido".to_string()));
    }
    Ok(claims)
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub fn issue_token_pair(user: &User) -> Result<TokenPair, JwtError> {
    Ok(TokenPair {
        access: generate_jwt(&Claims::access(user))?,
        refresh: generate_jwt(&Claims::refresh(user))?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: 42,
            username: "ana".into(),
            email: "ana@example.com".into(),
            password: String::new(),
            first_name: "Ana".into(),
            last_name: "Pérez".into(),
            role: "vendedor".into(),
            is_staff: false,
            is_active: true,
            tenant_id: Some(7),
            preferred_language: "es".into(),
            bio: String::new(),
            birth_date: None,
            address: String::new(),
            city: String::new(),
            postal_code: String::new(),
            phone: String::new(),
            country: String::new(),
            company_name: "Ana SRL".into(),
            company_size: String::new(),
            interest: String::new(),
            profile_picture: None,
            last_login: None,
            date_joined: now,
            updated_at: now,
        }
    }

    #[test]
    fn access_tokens_round_trip() {
        let user = sample_user();
        let token = generate_jwt(&Claims::access(&user)).unwrap();
        let claims = decode_jwt_of_type(&token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.tenant_id, Some(7));
        assert_eq!(claims.role, "vendedor");
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let pair = issue_token_pair(&sample_user()).unwrap();
        assert!(decode_jwt_of_type(&pair.refresh, TokenType::Access).is_err());
        assert!(decode_jwt_of_type(&pair.refresh, TokenType::Refresh).is_ok());
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let token = generate_jwt(&Claims::access(&sample_user())).unwrap();
        let tampered = format!("{}x", token);
        assert!(matches!(decode_jwt(&tampered), Err(JwtError::InvalidToken(_))));
    }

    #[test]
    fn each_token_gets_a_unique_id() {
        let user = sample_user();
        assert_ne!(Claims::refresh(&user).jti, Claims::refresh(&user).jti);
    }
}
