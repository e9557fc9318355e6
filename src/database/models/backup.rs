use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

choices! {
    BackupStatus {
        Pending => ("pending", "Pendiente"),
        Completed => ("completed", "Completado"),
        Failed => ("failed", "Fallido"),
    }
}

choices! {
    BackupType {
        Automatic => ("automatic", "Automático"),
        Manual => ("manual", "Manual"),
        Admin => ("admin", "Administrador"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Backup {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub file: String,
    pub size: i64,
    pub status: String,
    pub backup_type: String,
    pub description: String,
    pub created_by_id: Option<i64>,
    pub notes: String,
}
