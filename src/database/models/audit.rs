use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

choices! {
    AuditAction {
        Login => ("login", "Inicio de sesión"),
        Logout => ("logout", "Cierre de sesión"),
        Create => ("create", "Creación"),
        Update => ("update", "Actualización"),
        Delete => ("delete", "Eliminación"),
        View => ("view", "Consulta"),
        Export => ("export", "Exportación"),
        Import => ("import", "Importación"),
        Other => ("other", "Otro"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub tenant_id: Option<i64>,
    pub action: String,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub content_type: Option<String>,
    pub object_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub user_name: Option<String>,
}
