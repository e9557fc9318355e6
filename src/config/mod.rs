use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub filter: FilterConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub audit: AuditConfig,
    pub backup: BackupConfig,
    /// Base URL of the storefront/dashboard, used to build password-reset links
    pub frontend_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub allow_raw_sql: bool,
    pub max_limit: Option<i32>,
    pub max_nested_depth: u32,
    pub debug_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub refresh_expiry_days: u64,
    pub password_reset_timeout_secs: i64,
    pub bcrypt_cost: u32,
    pub enable_audit_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub log_dir: PathBuf,
    pub max_log_size: u64,
    pub backup_count: u32,
    pub retention_days: i64,
    pub signing_key: String,
    pub signing_salt: String,
    pub enable_db_logging: bool,
    pub enable_compression: bool,
    pub mask_sensitive_data: bool,
    pub sensitive_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub media_root: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Filter overrides
        if let Ok(v) = env::var("FILTER_ALLOW_RAW_SQL") {
            self.filter.allow_raw_sql = v.parse().unwrap_or(self.filter.allow_raw_sql);
        }
        if let Ok(v) = env::var("FILTER_MAX_LIMIT") {
            self.filter.max_limit = v.parse().ok();
        }
        if let Ok(v) = env::var("FILTER_MAX_NESTED_DEPTH") {
            self.filter.max_nested_depth = v.parse().unwrap_or(self.filter.max_nested_depth);
        }
        if let Ok(v) = env::var("FILTER_DEBUG_LOGGING") {
            self.filter.debug_logging = v.parse().unwrap_or(self.filter.debug_logging);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }
        if let Ok(v) = env::var("RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_EXPIRY_DAYS") {
            self.security.refresh_expiry_days = v.parse().unwrap_or(self.security.refresh_expiry_days);
        }
        if let Ok(v) = env::var("PASSWORD_RESET_TIMEOUT") {
            self.security.password_reset_timeout_secs =
                v.parse().unwrap_or(self.security.password_reset_timeout_secs);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_AUDIT_LOGGING") {
            self.security.enable_audit_logging = v.parse().unwrap_or(self.security.enable_audit_logging);
        }

        // Audit overrides
        if let Ok(v) = env::var("AUDIT_LOG_DIR") {
            self.audit.log_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("AUDIT_LOG_MAX_SIZE") {
            self.audit.max_log_size = v.parse().unwrap_or(self.audit.max_log_size);
        }
        if let Ok(v) = env::var("AUDIT_LOG_BACKUP_COUNT") {
            self.audit.backup_count = v.parse().unwrap_or(self.audit.backup_count);
        }
        if let Ok(v) = env::var("AUDIT_LOG_RETENTION_DAYS") {
            self.audit.retention_days = v.parse().unwrap_or(self.audit.retention_days);
        }
        if let Ok(v) = env::var("AUDIT_LOG_SIGNING_KEY") {
            self.audit.signing_key = v;
        } else if self.audit.signing_key.is_empty() {
            self.audit.signing_key = self.security.jwt_secret.clone();
        }
        if let Ok(v) = env::var("AUDIT_LOG_ENABLE_DB") {
            self.audit.enable_db_logging = v.parse().unwrap_or(self.audit.enable_db_logging);
        }
        if let Ok(v) = env::var("AUDIT_LOG_ENABLE_COMPRESSION") {
            self.audit.enable_compression = v.parse().unwrap_or(self.audit.enable_compression);
        }
        if let Ok(v) = env::var("AUDIT_LOG_MASK_SENSITIVE_DATA") {
            self.audit.mask_sensitive_data = v.parse().unwrap_or(self.audit.mask_sensitive_data);
        }

        // Backup overrides
        if let Ok(v) = env::var("BACKUP_DIR") {
            self.backup.dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("MEDIA_ROOT") {
            self.backup.media_root = PathBuf::from(v);
        }

        if let Ok(v) = env::var("FRONTEND_URL") {
            self.frontend_url = v;
        }

        self
    }

    fn default_audit() -> AuditConfig {
        AuditConfig {
            log_dir: PathBuf::from("logs/audit"),
            max_log_size: 10 * 1024 * 1024, // 10MB
            backup_count: 5,
            retention_days: 365,
            signing_key: String::new(),
            signing_salt: "audit.log.salt".to_string(),
            enable_db_logging: true,
            enable_compression: true,
            mask_sensitive_data: true,
            sensitive_fields: ["password", "token", "api_key", "secret", "authorization"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn default_backup() -> BackupConfig {
        BackupConfig {
            dir: PathBuf::from("media/backups"),
            media_root: PathBuf::from("media"),
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            filter: FilterConfig {
                allow_raw_sql: true,
                max_limit: Some(1000),
                max_nested_depth: 10,
                debug_logging: true,
            },
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                enable_query_logging: true,
                run_migrations: true,
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 50 * 1024 * 1024, // backups are uploaded as raw zip bodies
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: "development-only-insecure-secret".to_string(),
                jwt_expiry_hours: 24,
                refresh_expiry_days: 7,
                password_reset_timeout_secs: 259_200, // 3 days
                bcrypt_cost: 4,
                enable_audit_logging: true,
            },
            audit: Self::default_audit(),
            backup: Self::default_backup(),
            frontend_url: "http://localhost:5173".to_string(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            filter: FilterConfig {
                allow_raw_sql: false,
                max_limit: Some(500),
                max_nested_depth: 5,
                debug_logging: false,
            },
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                enable_query_logging: true,
                run_migrations: true,
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 50 * 1024 * 1024,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                refresh_expiry_days: 7,
                password_reset_timeout_secs: 259_200,
                bcrypt_cost: 10,
                enable_audit_logging: true,
            },
            audit: Self::default_audit(),
            backup: Self::default_backup(),
            frontend_url: "https://staging.example.com".to_string(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            filter: FilterConfig {
                allow_raw_sql: false,
                max_limit: Some(100),
                max_nested_depth: 3,
                debug_logging: false,
            },
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                enable_query_logging: false,
                run_migrations: false,
            },
            api: ApiConfig {
                enable_request_logging: false,
                max_request_size_bytes: 50 * 1024 * 1024,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                // Must come from JWT_SECRET; token issuance fails while empty
                jwt_secret: String::new(),
                jwt_expiry_hours: 1,
                refresh_expiry_days: 7,
                password_reset_timeout_secs: 259_200,
                bcrypt_cost: 12,
                enable_audit_logging: true,
            },
            audit: Self::default_audit(),
            backup: Self::default_backup(),
            frontend_url: "https://app.example.com".to_string(),
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_config_has_usable_secret() {
        let config = AppConfig::development();
        assert!(config.filter.allow_raw_sql);
        assert_eq!(config.filter.max_limit, Some(1000));
        assert!(!config.security.jwt_secret.is_empty());
        assert_eq!(config.security.password_reset_timeout_secs, 3 * 24 * 60 * 60);
    }

    #[test]
    fn production_config_requires_secret_from_env() {
        let config = AppConfig::production();
        assert!(!config.filter.allow_raw_sql);
        assert_eq!(config.filter.max_limit, Some(100));
        assert!(config.security.jwt_secret.is_empty());
        assert!(!config.database.run_migrations);
    }

    #[test]
    fn audit_defaults_mask_credentials() {
        let audit = AppConfig::default_audit();
        assert_eq!(audit.max_log_size, 10 * 1024 * 1024);
        assert_eq!(audit.backup_count, 5);
        assert_eq!(audit.retention_days, 365);
        assert_eq!(audit.signing_salt, "audit.log.salt");
        for field in ["password", "token", "api_key", "secret", "authorization"] {
            assert!(audit.sensitive_fields.iter().any(|f| f == field));
        }
    }
}
