use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::{self, reset_token, Claims, TokenType};
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::models::{Role, User, UserProfile};
use crate::observer::{self, Signal};
use crate::services::tenant_service::TenantService;
use crate::services::{check_choice, opt_str, required_str, ServiceError, ServiceResult};

pub const BAD_CREDENTIALS: &str = "No se encontró una cuenta activa con las credenciales proporcionadas";
const MIN_PASSWORD_LEN: usize = 8;
const MAX_BIO_LEN: usize = 500;

/// Roles an admin or store owner may hand out to staff accounts
const INTERNAL_ROLES: [&str; 4] = ["stock", "crm", "marketing", "vendedor"];

/// Text columns a user may edit on their own profile
const EDITABLE_TEXT_FIELDS: [&str; 12] = [
    "first_name",
    "last_name",
    "preferred_language",
    "bio",
    "address",
    "city",
    "postal_code",
    "phone",
    "country",
    "company_name",
    "company_size",
    "interest",
];

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub refresh: String,
    pub access: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: UserProfile,
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ActiveUserRow {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

pub fn validate_password(password: &str) -> ServiceResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::field(
            "password",
            format!("La contraseña debe tener al menos {} caracteres.", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

fn validate_bio(body: &Value) -> ServiceResult<()> {
    if let Some(bio) = body.get("bio").and_then(Value::as_str) {
        if bio.chars().count() > MAX_BIO_LEN {
            return Err(ServiceError::field(
                "bio",
                format!("Asegúrese de que este campo no tenga más de {} caracteres.", MAX_BIO_LEN),
            ));
        }
    }
    Ok(())
}

/// `Some(None)` clears the birth date, `None` leaves it alone
fn parse_birth_date(body: &Value) -> ServiceResult<Option<Option<NaiveDate>>> {
    match body.get("birth_date") {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) if s.is_empty() => Ok(Some(None)),
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|d| Some(Some(d)))
            .map_err(|_| ServiceError::field("birth_date", "Formato de fecha inválido. Use AAAA-MM-DD.")),
        Some(_) => Err(ServiceError::field("birth_date", "Formato de fecha inválido. Use AAAA-MM-DD.")),
    }
}

pub fn reset_link(uid: i64, token: &str) -> String {
    format!("{}/reset-password/{}/{}", config::config().frontend_url.trim_end_matches('/'), uid, token)
}

pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, id: i64) -> ServiceResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Active account or 401, used when resolving a token subject
    pub async fn find_active(&self, id: i64) -> ServiceResult<User> {
        match self.find(id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(ServiceError::Unauthorized("Usuario inactivo o no encontrado".to_string())),
        }
    }

    /// Username or email plus password
    pub async fn login(&self, identifier: Option<&str>, password: Option<&str>) -> ServiceResult<(User, LoginResponse)> {
        let bad = || ServiceError::Unauthorized(BAD_CREDENTIALS.to_string());
        let identifier = identifier.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(bad)?;
        let password = password.ok_or_else(bad)?;

        let candidates = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE (username = $1 OR LOWER(email) = LOWER($1)) AND is_active = true ORDER BY id",
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;
        let user = candidates
            .into_iter()
            .find(|u| verify_password(password, &u.password))
            .ok_or_else(|| {
                tracing::warn!("Failed login for '{}'", identifier);
                bad()
            })?;

        let user = sqlx::query_as::<_, User>("UPDATE users SET last_login = NOW() WHERE id = $1 RETURNING *")
            .bind(user.id)
            .fetch_one(&self.pool)
            .await?;
        let tokens = auth::issue_token_pair(&user)?;
        tracing::info!("User {} logged in", user.username);
        Ok((
            user.clone(),
            LoginResponse {
                refresh: tokens.refresh,
                access: tokens.access,
                user: user.profile(),
            },
        ))
    }

    /// Creates the tenant named after the company, then the account. A
    /// failing synchronous observer fails the registration.
    pub async fn register(&self, body: &Value) -> ServiceResult<RegisterResponse> {
        self.register_inner(body)
            .await
            .map_err(|e| ServiceError::Validation(format!("Error al crear el usuario: {}", e)))
    }

    async fn register_inner(&self, body: &Value) -> ServiceResult<RegisterResponse> {
        let username = required_str(body, "username")?;
        let email = required_str(body, "email")?;
        let password = required_str(body, "password")?;
        validate_password(&password)?;
        validate_bio(body)?;
        let role = opt_str(body, "role").unwrap_or_else(|| Role::Cliente.as_str().to_string());
        check_choice("role", &role, &Role::values())?;
        let company_name = opt_str(body, "company_name")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| format!("Tenant de {}", username));

        if self.username_taken(&username).await? {
            return Err(ServiceError::field("username", "Ya existe un usuario con este nombre."));
        }

        let tenant = TenantService::with_pool(self.pool.clone())
            .create_tenant(&company_name)
            .await
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password, first_name, last_name, role, tenant_id,
                               company_name, company_size, interest, phone, country)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&username)
        .bind(&email)
        .bind(hash_password(&password)?)
        .bind(opt_str(body, "first_name").unwrap_or_default())
        .bind(opt_str(body, "last_name").unwrap_or_default())
        .bind(&role)
        .bind(tenant.id)
        .bind(&company_name)
        .bind(opt_str(body, "company_size").unwrap_or_default())
        .bind(opt_str(body, "interest").unwrap_or_default())
        .bind(opt_str(body, "phone").unwrap_or_default())
        .bind(opt_str(body, "country").unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;

        let warnings = observer::dispatch(Signal::UserCreated(user.clone()), self.pool.clone())
            .await
            .into_result()?;
        for warning in warnings {
            tracing::warn!("{}: {}", warning.observer, warning.message);
        }

        tracing::info!("Bienvenido {}, tu cuenta ha sido creada en {}", user.username, tenant.name);
        let tokens = auth::issue_token_pair(&user)?;
        Ok(RegisterResponse {
            message: "Usuario registrado exitosamente",
            user: user.profile(),
            access: tokens.access,
            refresh: tokens.refresh,
        })
    }

    async fn username_taken(&self, username: &str) -> ServiceResult<bool> {
        let (taken,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    /// New access token from a refresh token that is neither revoked nor expired
    pub async fn refresh(&self, refresh: Option<&str>) -> ServiceResult<String> {
        let refresh = refresh
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("Token inválido o expirado".to_string()))?;
        let claims = auth::decode_jwt_of_type(refresh, TokenType::Refresh)?;
        if self.is_revoked(&claims.jti).await? {
            return Err(ServiceError::Unauthorized("El token ha sido revocado".to_string()));
        }
        let user = self.find_active(claims.sub).await?;
        Ok(auth::generate_jwt(&Claims::access(&user))?)
    }

    async fn is_revoked(&self, jti: &str) -> ServiceResult<bool> {
        let (revoked,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE jti = $1)")
            .bind(jti)
            .fetch_one(&self.pool)
            .await?;
        Ok(revoked)
    }

    /// Revokes the refresh token when one is given. Tokens that fail to
    /// decode are ignored; the session ends either way.
    pub async fn logout(&self, user: &User, refresh: Option<&str>) -> ServiceResult<()> {
        if let Some(refresh) = refresh.filter(|t| !t.is_empty()) {
            match auth::decode_jwt_of_type(refresh, TokenType::Refresh) {
                Ok(claims) if claims.sub == user.id => {
                    sqlx::query("INSERT INTO revoked_tokens (jti, user_id) VALUES ($1, $2) ON CONFLICT (jti) DO NOTHING")
                        .bind(&claims.jti)
                        .bind(user.id)
                        .execute(&self.pool)
                        .await?;
                }
                Ok(_) => tracing::warn!("User {} tried to revoke a token of another user", user.id),
                Err(e) => tracing::warn!("Ignoring undecodable refresh token on logout: {}", e),
            }
        }
        tracing::info!("User {} logged out", user.username);
        Ok(())
    }

    pub async fn update_profile(&self, user: &User, body: &Value) -> ServiceResult<UserProfile> {
        validate_bio(body)?;
        let birth_date = parse_birth_date(body)?;
        if let Some(language) = opt_str(body, "preferred_language") {
            if language.is_empty() || language.len() > 10 {
                return Err(ServiceError::field("preferred_language", "Idioma no válido."));
            }
        }

        let mut values: Vec<Option<String>> = EDITABLE_TEXT_FIELDS.iter().map(|f| opt_str(body, f)).collect();
        let (birth_set, birth_value) = match birth_date {
            Some(value) => (true, value),
            None => (false, None),
        };

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                preferred_language = COALESCE($4, preferred_language),
                bio = COALESCE($5, bio),
                address = COALESCE($6, address),
                city = COALESCE($7, city),
                postal_code = COALESCE($8, postal_code),
                phone = COALESCE($9, phone),
                country = COALESCE($10, country),
                company_name = COALESCE($11, company_name),
                company_size = COALESCE($12, company_size),
                interest = COALESCE($13, interest),
                birth_date = CASE WHEN $14 THEN $15 ELSE birth_date END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(values[0].take())
        .bind(values[1].take())
        .bind(values[2].take())
        .bind(values[3].take())
        .bind(values[4].take())
        .bind(values[5].take())
        .bind(values[6].take())
        .bind(values[7].take())
        .bind(values[8].take())
        .bind(values[9].take())
        .bind(values[10].take())
        .bind(values[11].take())
        .bind(birth_set)
        .bind(birth_value)
        .fetch_one(&self.pool)
        .await?;
        Ok(user.profile())
    }

    pub async fn set_profile_picture(&self, user: &User, body: &Value) -> ServiceResult<UserProfile> {
        let picture = opt_str(body, "profile_picture")
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ServiceError::validation("No se proporcionó ninguna imagen"))?;
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET profile_picture = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(user.id)
        .bind(picture)
        .fetch_one(&self.pool)
        .await?;
        Ok(user.profile())
    }

    pub async fn change_password(&self, user: &User, current: Option<&str>, new_password: Option<&str>) -> ServiceResult<()> {
        let current = current.unwrap_or_default();
        if !verify_password(current, &user.password) {
            return Err(ServiceError::validation("La contraseña actual es incorrecta"));
        }
        let new_password = new_password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ServiceError::field("new_password", "Este campo es requerido."))?;
        validate_password(new_password)?;
        self.store_password(user.id, new_password).await?;
        tracing::info!("User {} changed their password", user.username);
        Ok(())
    }

    async fn store_password(&self, user_id: i64, plain: &str) -> ServiceResult<()> {
        sqlx::query("UPDATE users SET password = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(hash_password(plain)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Staff account in the caller's tenant; callers are admins or store owners
    pub async fn create_internal_user(&self, caller: &User, may_create: bool, body: &Value) -> ServiceResult<UserProfile> {
        if !may_create {
            return Err(ServiceError::forbidden("Usuario no autorizado para crear usuarios internos."));
        }
        let username = required_str(body, "username")?;
        let email = required_str(body, "email")?;
        let password = required_str(body, "password")?;
        validate_password(&password)?;
        let role = required_str(body, "role")?;
        check_choice("role", &role, &INTERNAL_ROLES)?;

        if self.username_taken(&username).await? {
            return Err(ServiceError::field("username", "Ya existe un usuario con este nombre."));
        }
        let (email_taken,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND tenant_id IS NOT DISTINCT FROM $2)",
        )
        .bind(&email)
        .bind(caller.tenant_id)
        .fetch_one(&self.pool)
        .await?;
        if email_taken {
            return Err(ServiceError::validation("Ya existe un usuario con este correo en esta tienda."));
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password, first_name, last_name, role, tenant_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&username)
        .bind(&email)
        .bind(hash_password(&password)?)
        .bind(opt_str(body, "first_name").unwrap_or_default())
        .bind(opt_str(body, "last_name").unwrap_or_default())
        .bind(&role)
        .bind(caller.tenant_id)
        .fetch_one(&self.pool)
        .await?;

        if let Some(tenant_id) = user.tenant_id {
            sqlx::query("UPDATE subscriptions SET users_count = users_count + 1, updated_at = NOW() WHERE tenant_id = $1")
                .bind(tenant_id)
                .execute(&self.pool)
                .await?;
        }

        let warnings = observer::dispatch(Signal::UserCreated(user.clone()), self.pool.clone())
            .await
            .into_result()?;
        for warning in warnings {
            tracing::warn!("{}: {}", warning.observer, warning.message);
        }
        tracing::info!("User {} created internal account {} ({})", caller.username, user.username, role);
        Ok(user.profile())
    }

    /// Logs the reset link; delivery is left to whoever tails the logs
    pub async fn request_password_reset(&self, email: Option<&str>) -> ServiceResult<()> {
        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ServiceError::validation("El correo electrónico es requerido"))?;
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND is_active = true ORDER BY id LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("No existe una cuenta con este correo electrónico"))?;

        let token = reset_token::make_token(&user, Utc::now())
            .ok_or_else(|| ServiceError::Internal("could not sign password reset token".to_string()))?;
        tracing::info!("Password reset requested for {}: {}", user.email, reset_link(user.id, &token));
        Ok(())
    }

    pub async fn confirm_password_reset(&self, body: &Value) -> ServiceResult<()> {
        let uid = body.get("uid").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let token = opt_str(body, "token").filter(|t| !t.is_empty());
        let new_password = opt_str(body, "new_password").filter(|p| !p.is_empty());
        let (Some(uid), Some(token), Some(new_password)) = (uid, token, new_password) else {
            return Err(ServiceError::validation("Todos los campos son requeridos"));
        };

        let user = self
            .find(uid)
            .await?
            .ok_or_else(|| ServiceError::not_found("Usuario no encontrado"))?;
        if !reset_token::check_token(&user, &token, Utc::now()) {
            return Err(ServiceError::validation("Token inválido o expirado"));
        }
        validate_password(&new_password)?;
        self.store_password(user.id, &new_password).await?;
        tracing::info!("Password reset completed for user {}", user.id);
        Ok(())
    }

    pub async fn active_users(&self) -> ServiceResult<Vec<ActiveUserRow>> {
        let users = sqlx::query_as::<_, ActiveUserRow>(
            "SELECT id, email, first_name, last_name FROM users WHERE is_active = true ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("corta").is_err());
        assert!(validate_password("suficiente").is_ok());
    }

    #[test]
    fn bio_is_capped() {
        assert!(validate_bio(&json!({"bio": "a".repeat(500)})).is_ok());
        assert!(matches!(
            validate_bio(&json!({"bio": "a".repeat(501)})),
            Err(ServiceError::FieldValidation { .. })
        ));
        assert!(validate_bio(&json!({})).is_ok());
    }

    #[test]
    fn birth_date_can_be_set_or_cleared() {
        assert_eq!(parse_birth_date(&json!({})).unwrap(), None);
        assert_eq!(parse_birth_date(&json!({"birth_date": null})).unwrap(), Some(None));
        assert_eq!(
            parse_birth_date(&json!({"birth_date": "1990-05-17"})).unwrap(),
            Some(NaiveDate::from_ymd_opt(1990, 5, 17))
        );
        assert!(parse_birth_date(&json!({"birth_date": "17/05/1990"})).is_err());
    }

    #[test]
    fn reset_link_points_at_frontend() {
        let link = reset_link(42, "abc-123");
        assert!(link.ends_with("/reset-password/42/abc-123"));
        assert!(!link.contains("//reset-password"));
    }

    #[test]
    fn internal_roles_exclude_admin_and_cliente() {
        assert!(check_choice("role", "crm", &INTERNAL_ROLES).is_ok());
        assert!(check_choice("role", "admin", &INTERNAL_ROLES).is_err());
        assert!(check_choice("role", "cliente", &INTERNAL_ROLES).is_err());
    }
}
