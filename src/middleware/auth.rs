use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};

use crate::auth::{decode_jwt_of_type, Claims, TokenType};
use crate::error::ApiError;
use crate::services::storefront_service::StorefrontService;

/// Authenticated staff identity extracted from an access token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub tenant_id: Option<i64>,
    pub role: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            tenant_id: claims.tenant_id,
            role: claims.role,
        }
    }
}

/// Rejects requests without a valid access token and injects `AuthUser`.
/// Refresh and storefront tokens are not accepted here.
pub async fn jwt_auth_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).map_err(ApiError::unauthorized)?;
    let claims = decode_jwt_of_type(token, TokenType::Access).map_err(|e| {
        tracing::warn!("Rejected access token: {}", e);
        ApiError::unauthorized(e.to_string())
    })?;

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

/// Same as `jwt_auth_middleware` but for public store customers: injects
/// the active `StorefrontUser` the token was issued to.
pub async fn storefront_auth_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).map_err(ApiError::unauthorized)?;
    let claims = decode_jwt_of_type(token, TokenType::Storefront).map_err(|e| ApiError::unauthorized(e.to_string()))?;

    let customer = StorefrontService::new()
        .await?
        .find_active(claims.sub)
        .await
        .map_err(|_| ApiError::unauthorized("Usuario de tienda pública no encontrado"))?;
    if Some(customer.tienda_id) != claims.tienda_id {
        return Err(ApiError::unauthorized("Token inválido o expirado"));
    }

    request.extensions_mut().insert(customer);
    Ok(next.run(request).await)
}

/// Token portion of a `Bearer` Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("Las credenciales de autenticación no se proveyeron.")?;
    let value = header.to_str().map_err(|_| "Invalid Authorization header format")?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        Some(_) => Err("Empty JWT token"),
        None => Err("Authorization header must use Bearer token format"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_tokens() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Ok("abc.def"));
        assert!(bearer_token(&headers("Bearer   ")).is_err());
        assert!(bearer_token(&headers("Token abc")).is_err());
        assert!(bearer_token(&HeaderMap::new()).is_err());
    }
}
