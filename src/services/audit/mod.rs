pub mod maintenance;
pub mod secure_log;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{AuditAction, AuditLog, Tenant, User};
use crate::services::{ServiceError, ServiceResult};

pub use secure_log::{InvalidEntry, SecureAuditLog};

pub const MASK: &str = "********";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Signing error: {0}")]
    Signing(String),
    #[error("Bad signature: {0}")]
    BadSignature(String),
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Database manager error: {0}")]
    DatabaseManager(#[from] DatabaseError),
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Replaces the value of every key naming a sensitive field, at any depth
pub fn mask_sensitive(value: &Value, sensitive: &[String]) -> Value {
    match value {
        Value::Object(map) => {
            let masked: Map<String, Value> = map
                .iter()
                .map(|(key, v)| {
                    let lowered = key.to_lowercase();
                    if sensitive.iter().any(|field| lowered.contains(field.as_str())) {
                        (key.clone(), json!(MASK))
                    } else {
                        (key.clone(), mask_sensitive(v, sensitive))
                    }
                })
                .collect();
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| mask_sensitive(v, sensitive)).collect()),
        other => other.clone(),
    }
}

/// One auditable action
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub description: String,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub tenant_id: Option<i64>,
    pub tenant_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub content_type: Option<String>,
    pub object_id: Option<String>,
    pub metadata: Value,
}

impl AuditRecord {
    pub fn new(action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            action,
            description: description.into(),
            user_id: None,
            username: None,
            tenant_id: None,
            tenant_name: None,
            ip_address: None,
            user_agent: String::new(),
            content_type: None,
            object_id: None,
            metadata: json!({}),
        }
    }

    pub fn by(mut self, user: &User) -> Self {
        self.user_id = Some(user.id);
        self.username = Some(user.username.clone());
        if self.tenant_id.is_none() {
            self.tenant_id = user.tenant_id;
        }
        self
    }

    pub fn in_tenant(mut self, tenant: &Tenant) -> Self {
        self.tenant_id = Some(tenant.id);
        self.tenant_name = Some(tenant.name.clone());
        self
    }

    pub fn from_client(mut self, ip_address: Option<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_object(mut self, content_type: impl Into<String>, object_id: impl ToString) -> Self {
        self.content_type = Some(content_type.into());
        self.object_id = Some(object_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// JSON written to the signed files
    pub fn to_log_json(&self, now: DateTime<Utc>) -> Value {
        json!({
            "user_id": self.user_id.map(|id| id.to_string()),
            "user_username": self.username.clone().unwrap_or_else(|| "system".to_string()),
            "tenant_id": self.tenant_id.map(|id| id.to_string()),
            "tenant_name": self.tenant_name.clone().unwrap_or_else(|| "system".to_string()),
            "action": self.action.as_str(),
            "description": self.description,
            "timestamp": now.to_rfc3339(),
            "ip_address": self.ip_address,
            "user_agent": self.user_agent,
            "metadata": self.metadata,
        })
    }
}

/// Query-string filters of the audit log listing
#[derive(Debug, Default, Clone)]
pub struct AuditFilters {
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub user_id: Option<i64>,
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates. Plain end
/// dates cover the whole day.
pub fn parse_date_bound(value: &str, end_of_day: bool) -> ServiceResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ServiceError::validation(format!("Fecha no válida: {}", value)))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| ServiceError::validation(format!("Fecha no válida: {}", value)))
}

#[derive(Debug, Serialize)]
pub struct AuditLogView {
    #[serde(flatten)]
    pub log: AuditLog,
    pub action_display: String,
}

impl From<AuditLog> for AuditLogView {
    fn from(mut log: AuditLog) -> Self {
        if log.user_name.is_none() {
            log.user_name = Some("Usuario eliminado".to_string());
        }
        Self {
            action_display: AuditAction::label_of(&log.action),
            log,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub total_actions: i64,
    pub actions_by_type: BTreeMap<String, i64>,
    pub actions_by_user: BTreeMap<String, i64>,
}

const SELECT_WITH_USER_NAME: &str = r#"
    SELECT a.*,
           COALESCE(NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''), u.username) AS user_name
    FROM audit_logs a
    LEFT JOIN users u ON u.id = a.user_id
"#;

pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Masks the metadata, appends the signed line to the files and
    /// stores the row when database logging is on.
    pub async fn log_action(&self, mut record: AuditRecord) -> Result<Option<AuditLog>, AuditError> {
        let audit = &config::config().audit;
        if audit.mask_sensitive_data {
            record.metadata = mask_sensitive(&record.metadata, &audit.sensitive_fields);
        }

        let payload = serde_json::to_string(&record.to_log_json(Utc::now()))?;
        let tenant_id = record.tenant_id;
        let log = SecureAuditLog::from_config();
        let written = tokio::task::spawn_blocking(move || log.append(&payload, tenant_id))
            .await
            .map_err(|e| AuditError::Task(e.to_string()))
            .and_then(|result| result);
        if let Err(e) = written {
            tracing::error!("Failed to write audit log file: {}", e);
        }

        if !audit.enable_db_logging {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (user_id, tenant_id, action, description, ip_address, user_agent,
                                    content_type, object_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(record.user_id)
        .bind(record.tenant_id)
        .bind(record.action.as_str())
        .bind(&record.description)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(&record.content_type)
        .bind(&record.object_id)
        .bind(&record.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(Some(row))
    }

    /// Logs and swallows failures; auditing never breaks the caller
    pub async fn log_quietly(&self, record: AuditRecord) {
        if let Err(e) = self.log_action(record).await {
            tracing::error!("Failed to record audit entry: {}", e);
        }
    }

    pub async fn list(&self, tenant_id: Option<i64>, filters: &AuditFilters) -> ServiceResult<Vec<AuditLogView>> {
        let start = filters.start_date.as_deref().map(|d| parse_date_bound(d, false)).transpose()?;
        let end = filters.end_date.as_deref().map(|d| parse_date_bound(d, true)).transpose()?;

        let sql = format!(
            r#"{}
            WHERE a.tenant_id IS NOT DISTINCT FROM $1
              AND ($2::VARCHAR IS NULL OR a.action = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR a.created_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR a.created_at <= $4)
              AND ($5::BIGINT IS NULL OR (a.user_id = $5 AND u.tenant_id IS NOT DISTINCT FROM $1))
            ORDER BY a.created_at DESC, a.id DESC
            "#,
            SELECT_WITH_USER_NAME
        );
        let logs = sqlx::query_as::<_, AuditLog>(&sql)
            .bind(tenant_id)
            .bind(filters.action.as_deref().filter(|a| !a.is_empty()))
            .bind(start)
            .bind(end)
            .bind(filters.user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(logs.into_iter().map(AuditLogView::from).collect())
    }

    pub async fn get(&self, tenant_id: Option<i64>, id: i64) -> ServiceResult<AuditLogView> {
        let sql = format!("{} WHERE a.id = $1 AND a.tenant_id IS NOT DISTINCT FROM $2", SELECT_WITH_USER_NAME);
        sqlx::query_as::<_, AuditLog>(&sql)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .map(AuditLogView::from)
            .ok_or_else(|| ServiceError::not_found("No encontrado."))
    }

    /// Manual entry posted by a client; who, where and tenant come from the request
    pub async fn create(&self, body: &Value, base: AuditRecord) -> ServiceResult<AuditLogView> {
        let action = body.get("action").and_then(Value::as_str).unwrap_or_default();
        let action = AuditAction::parse(action)
            .ok_or_else(|| ServiceError::field("action", format!("\"{}\" no es una elección válida.", action)))?;
        let mut record = AuditRecord {
            action,
            description: body.get("description").and_then(Value::as_str).unwrap_or_default().to_string(),
            metadata: body.get("metadata").cloned().unwrap_or_else(|| json!({})),
            ..base
        };
        if let Some(content_type) = body.get("content_type").and_then(Value::as_str) {
            record.content_type = Some(content_type.to_string());
        }
        if let Some(object_id) = body.get("object_id").filter(|v| !v.is_null()) {
            record.object_id = Some(object_id.as_str().map(str::to_string).unwrap_or_else(|| object_id.to_string()));
        }
        let tenant_id = record.tenant_id;

        let row = self
            .log_action(record)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .ok_or_else(|| ServiceError::Internal("database audit logging is disabled".to_string()))?;
        self.get(tenant_id, row.id).await
    }

    pub fn actions() -> BTreeMap<&'static str, &'static str> {
        AuditAction::ALL.iter().map(|a| (a.as_str(), a.label())).collect()
    }

    pub async fn report(&self, tenant_id: Option<i64>, filters: &AuditFilters) -> ServiceResult<AuditReport> {
        let logs = self.list(tenant_id, filters).await?;
        let mut actions_by_type = BTreeMap::new();
        let mut actions_by_user = BTreeMap::new();
        for view in &logs {
            *actions_by_type.entry(view.log.action.clone()).or_insert(0) += 1;
            let username = match view.log.user_id {
                Some(_) => view.log.user_name.clone().unwrap_or_default(),
                None => "system".to_string(),
            };
            *actions_by_user.entry(username).or_insert(0) += 1;
        }
        Ok(AuditReport {
            total_actions: logs.len() as i64,
            actions_by_type,
            actions_by_user,
        })
    }

    pub async fn user_activity(&self, tenant_id: Option<i64>, user_id: Option<i64>) -> ServiceResult<Vec<AuditLogView>> {
        let user_id = user_id.ok_or_else(|| ServiceError::validation("Se requiere el ID del usuario"))?;
        let filters = AuditFilters {
            user_id: Some(user_id),
            ..Default::default()
        };
        let logs = self.list(tenant_id, &filters).await?;
        if logs.is_empty() {
            return Err(ServiceError::not_found("Usuario no encontrado o no pertenece a tu organización"));
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensitive() -> Vec<String> {
        ["password", "token", "secret"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn masks_nested_sensitive_fields() {
        let masked = mask_sensitive(
            &json!({
                "username": "ana",
                "password": "x",
                "nested": {"refresh_token": "abc", "items": [{"client_secret": "s", "ok": 1}]}
            }),
            &sensitive(),
        );
        assert_eq!(masked["username"], "ana");
        assert_eq!(masked["password"], MASK);
        assert_eq!(masked["nested"]["refresh_token"], MASK);
        assert_eq!(masked["nested"]["items"][0]["client_secret"], MASK);
        assert_eq!(masked["nested"]["items"][0]["ok"], 1);
    }

    #[test]
    fn log_json_defaults_to_system() {
        let record = AuditRecord::new(AuditAction::Login, "login").from_client(Some("10.0.0.1".into()), "curl");
        let now = Utc::now();
        let json = record.to_log_json(now);
        assert_eq!(json["user_username"], "system");
        assert_eq!(json["tenant_name"], "system");
        assert_eq!(json["user_id"], Value::Null);
        assert_eq!(json["action"], "login");
        assert_eq!(json["ip_address"], "10.0.0.1");
        assert_eq!(json["timestamp"], now.to_rfc3339());
    }

    #[test]
    fn date_bounds_accept_dates_and_timestamps() {
        let start = parse_date_bound("2024-03-01", false).unwrap();
        let end = parse_date_bound("2024-03-01", true).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-03-01T23:59:59+00:00");
        assert!(parse_date_bound("2024-03-01T10:00:00Z", false).is_ok());
        assert!(parse_date_bound("ayer", false).is_err());
    }

    #[test]
    fn actions_map_lists_every_choice() {
        let actions = AuditService::actions();
        assert_eq!(actions.len(), 9);
        assert_eq!(actions["login"], "Inicio de sesión");
    }
}
