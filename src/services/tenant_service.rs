use sqlx::PgPool;
use uuid::Uuid;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{Tenant, User};
use crate::observer::{self, Signal};

pub const INITIAL_TENANT_NAME: &str = "Tenant Principal";

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Database manager error: {0}")]
    DatabaseManager(#[from] DatabaseError),
    #[error("Tenant already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid tenant name: {0}")]
    InvalidName(String),
    #[error("Tenant not found: {0}")]
    NotFound(i64),
}

/// Result of assigning tenants to accounts that had none
#[derive(Debug, Default, serde::Serialize)]
pub struct AssignSummary {
    pub assigned: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

pub struct TenantService {
    main_pool: PgPool,
}

impl TenantService {
    pub async fn new() -> Result<Self, TenantError> {
        let main_pool = DatabaseManager::main_pool().await?;
        Ok(Self { main_pool })
    }

    pub fn with_pool(main_pool: PgPool) -> Self {
        Self { main_pool }
    }

    /// Create a tenant with a unique schema name and announce it
    pub async fn create_tenant(&self, name: &str) -> Result<Tenant, TenantError> {
        let name = name.trim();
        Self::validate_tenant_name(name)?;

        let schema_name = Self::generate_schema_name(name);
        if self.schema_exists(&schema_name).await? {
            return Err(TenantError::AlreadyExists(schema_name));
        }
        let domain = format!("{}.localhost", schema_name);

        let tenant = self.insert_tenant(name, &schema_name, &domain).await?;
        DatabaseManager::create_schema(&self.main_pool, &tenant.schema_name).await?;

        tracing::info!("Created tenant '{}' ({})", tenant.name, tenant.schema_name);
        let result = observer::dispatch(Signal::TenantCreated(tenant.clone()), self.main_pool.clone()).await;
        for warning in result.warnings {
            tracing::warn!("{}: {}", warning.observer, warning.message);
        }
        Ok(tenant)
    }

    /// Idempotently create the catch-all tenant living in `public`
    pub async fn create_initial_tenant(&self) -> Result<(Tenant, bool), TenantError> {
        if let Some(existing) = self.find_by_schema("public").await? {
            return Ok((existing, false));
        }
        let tenant = self.insert_tenant(INITIAL_TENANT_NAME, "public", "localhost").await?;
        tracing::info!("Created initial tenant '{}'", tenant.name);
        Ok((tenant, true))
    }

    /// Give every account without a tenant its own tenant
    pub async fn assign_tenants(&self) -> Result<AssignSummary, TenantError> {
        let users: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE tenant_id IS NULL ORDER BY id")
            .fetch_all(&self.main_pool)
            .await?;

        let mut summary = AssignSummary::default();
        for user in users {
            let name = if user.company_name.trim().is_empty() {
                format!("Tenant de {}", user.username)
            } else {
                user.company_name.clone()
            };

            match self.create_tenant(&name).await {
                Ok(tenant) => {
                    sqlx::query("UPDATE users SET tenant_id = $1, updated_at = NOW() WHERE id = $2")
                        .bind(tenant.id)
                        .bind(user.id)
                        .execute(&self.main_pool)
                        .await?;
                    summary.assigned.push((user.username, tenant.name));
                }
                Err(e) => {
                    tracing::warn!("Could not create tenant for {}: {}", user.username, e);
                    summary.failed.push((user.username, e.to_string()));
                }
            }
        }
        Ok(summary)
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, TenantError> {
        let tenants = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at DESC")
            .fetch_all(&self.main_pool)
            .await?;
        Ok(tenants)
    }

    pub async fn get_tenant(&self, id: i64) -> Result<Tenant, TenantError> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.main_pool)
            .await?
            .ok_or(TenantError::NotFound(id))
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<Tenant, TenantError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "UPDATE tenants SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.main_pool)
        .await?
        .ok_or(TenantError::NotFound(id))?;

        tracing::info!("Tenant '{}' is_active={}", tenant.name, active);
        Ok(tenant)
    }

    /// `{company}_{8 hex chars}`: lowercase, spaces to underscores,
    /// other punctuation dropped, capped at 63 characters.
    pub fn generate_schema_name(company: &str) -> String {
        let mut base: String = company
            .trim()
            .to_lowercase()
            .chars()
            .filter_map(|c| match c {
                ' ' => Some('_'),
                c if c.is_ascii_alphanumeric() || c == '_' => Some(c),
                _ => None,
            })
            .collect();
        if !base.starts_with(|c: char| c.is_ascii_lowercase()) {
            base.insert_str(0, "t_");
        }
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        let max_base = 63 - suffix.len() - 1;
        base.truncate(max_base);
        format!("{}_{}", base, suffix)
    }

    /// Validate tenant name follows rules
    fn validate_tenant_name(name: &str) -> Result<(), TenantError> {
        let len = name.chars().count();
        if len < 2 {
            return Err(TenantError::InvalidName("El nombre del tenant debe tener al menos 2 caracteres".to_string()));
        }
        if len > 100 {
            return Err(TenantError::InvalidName("El nombre del tenant no puede superar los 100 caracteres".to_string()));
        }
        Ok(())
    }

    async fn schema_exists(&self, schema_name: &str) -> Result<bool, TenantError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants WHERE schema_name = $1")
            .bind(schema_name)
            .fetch_one(&self.main_pool)
            .await?;
        Ok(count.0 > 0)
    }

    async fn find_by_schema(&self, schema_name: &str) -> Result<Option<Tenant>, TenantError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE schema_name = $1")
            .bind(schema_name)
            .fetch_optional(&self.main_pool)
            .await?;
        Ok(tenant)
    }

    async fn insert_tenant(&self, name: &str, schema_name: &str, domain: &str) -> Result<Tenant, TenantError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name, schema_name, domain, is_active)
            VALUES ($1, $2, $3, true)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(schema_name)
        .bind(domain)
        .fetch_one(&self.main_pool)
        .await?;
        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_are_valid_identifiers() {
        let name = TenantService::generate_schema_name("Mi Empresa S.R.L.");
        assert!(name.starts_with("mi_empresa_srl_"));
        assert_eq!(name.len(), "mi_empresa_srl_".len() + 8);
        assert!(DatabaseManager::is_valid_schema_name(&name));
    }

    #[test]
    fn schema_names_are_unique_per_call() {
        assert_ne!(
            TenantService::generate_schema_name("Acme"),
            TenantService::generate_schema_name("Acme")
        );
    }

    #[test]
    fn long_or_odd_names_still_fit() {
        let long = TenantService::generate_schema_name(&"x".repeat(200));
        assert_eq!(long.len(), 63);
        assert!(DatabaseManager::is_valid_schema_name(&long));

        let numeric = TenantService::generate_schema_name("123 Tienda");
        assert!(numeric.starts_with("t_123_tienda_"));
        assert!(DatabaseManager::is_valid_schema_name(&numeric));
    }

    #[test]
    fn names_must_have_reasonable_length() {
        assert!(TenantService::validate_tenant_name("A").is_err());
        assert!(TenantService::validate_tenant_name("Ab").is_ok());
        assert!(TenantService::validate_tenant_name(&"a".repeat(101)).is_err());
    }
}
