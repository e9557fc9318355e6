use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::models::{Backup, BackupStatus, BackupType, User, DEFAULT_LOGO};
use crate::services::{opt_i64, opt_str, ServiceError};

pub const FORMAT_VERSION: &str = "2.0.0";
const DATA_FILE: &str = "data.json";
const METADATA_FILE: &str = "metadata.json";
const MEDIA_PREFIX: &str = "media/";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("{0}")]
    Service(#[from] ServiceError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    InvalidArchive(String),
    #[error("El backup no pertenece a este usuario")]
    NotOwner,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<crate::database::manager::DatabaseError> for BackupError {
    fn from(err: crate::database::manager::DatabaseError) -> Self {
        BackupError::Service(err.into())
    }
}

pub type BackupResult<T> = Result<T, BackupError>;

/// How a foreign key column is rewritten on restore
#[derive(Debug, Clone, Copy, PartialEq)]
enum Link {
    /// Always the restoring user
    Owner,
    /// Always the restoring user's tenant
    Tenant,
    /// Id of a row restored earlier from the named set; rows whose
    /// parent was not restored are skipped
    Row(&'static str),
    /// Like `Row`, but an unknown parent clears the column
    OptionalRow(&'static str),
    /// The backup owner maps to the restoring user, other accounts are
    /// kept when they still exist
    User,
}

struct Dataset {
    key: &'static str,
    table: &'static str,
    export_sql: &'static str,
    columns: &'static [&'static str],
    links: &'static [(&'static str, Link)],
    /// At least one of these must survive remapping
    any_of: &'static [&'static str],
}

/// Exported sets in restore order: parents always precede children.
/// Every export query takes the owner's user id as `$1`.
const DATASETS: &[Dataset] = &[
    Dataset {
        key: "users_CustomUser",
        table: "users",
        export_sql: "SELECT to_jsonb(t) - 'password' FROM users t WHERE t.id = $1",
        columns: &[],
        links: &[],
        any_of: &[],
    },
    Dataset {
        key: "tienda_Tienda",
        table: "tiendas",
        export_sql: "SELECT to_jsonb(t) FROM tiendas t WHERE t.usuario_id = $1 ORDER BY t.id",
        columns: &[
            "tenant_id", "usuario_id", "nombre", "logo", "descripcion", "tema", "publicado", "color_primario",
            "color_secundario", "color_texto", "color_fondo", "slug",
        ],
        links: &[("usuario_id", Link::Owner), ("tenant_id", Link::Tenant)],
        any_of: &[],
    },
    Dataset {
        key: "tienda_Categoria",
        table: "categorias",
        export_sql: "SELECT to_jsonb(t) FROM categorias t JOIN tiendas s ON s.id = t.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &["tienda_id", "nombre", "descripcion", "imagen"],
        links: &[("tienda_id", Link::Row("tienda_Tienda"))],
        any_of: &[],
    },
    Dataset {
        key: "tienda_Producto",
        table: "productos",
        export_sql: "SELECT to_jsonb(t) FROM productos t JOIN tiendas s ON s.id = t.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &[
            "tienda_id", "nombre", "descripcion", "precio", "stock", "categoria_id", "imagen", "fecha_creacion",
            "fecha_actualizacion", "eliminado",
        ],
        links: &[
            ("tienda_id", Link::Row("tienda_Tienda")),
            ("categoria_id", Link::OptionalRow("tienda_Categoria")),
        ],
        any_of: &[],
    },
    Dataset {
        key: "UsersTiendaPublica_UsersTiendaPublica",
        table: "users_tienda_publica",
        export_sql: "SELECT to_jsonb(t) FROM users_tienda_publica t JOIN tiendas s ON s.id = t.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &["email", "first_name", "last_name", "password", "tienda_id", "is_active", "date_joined"],
        links: &[("tienda_id", Link::Row("tienda_Tienda"))],
        any_of: &[],
    },
    Dataset {
        key: "tienda_Pedido",
        table: "pedidos",
        export_sql: "SELECT to_jsonb(t) FROM pedidos t JOIN tiendas s ON s.id = t.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &[
            "tienda_id", "cliente_id", "cliente_tienda_publica_id", "fecha_creacion", "fecha_actualizacion", "estado",
            "total", "direccion_entrega", "telefono", "metodo_pago", "notas", "codigo_seguimiento",
        ],
        links: &[
            ("tienda_id", Link::Row("tienda_Tienda")),
            ("cliente_id", Link::User),
            ("cliente_tienda_publica_id", Link::OptionalRow("UsersTiendaPublica_UsersTiendaPublica")),
        ],
        any_of: &["cliente_id", "cliente_tienda_publica_id"],
    },
    Dataset {
        key: "tienda_DetallePedido",
        table: "detalles_pedido",
        export_sql: "SELECT to_jsonb(t) FROM detalles_pedido t JOIN pedidos p ON p.id = t.pedido_id JOIN tiendas s ON s.id = p.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &["pedido_id", "producto_id", "nombre_producto", "cantidad", "precio_unitario", "subtotal"],
        links: &[
            ("pedido_id", Link::Row("tienda_Pedido")),
            ("producto_id", Link::OptionalRow("tienda_Producto")),
        ],
        any_of: &[],
    },
    Dataset {
        key: "tienda_NotificacionPedido",
        table: "notificaciones_pedido",
        export_sql: "SELECT to_jsonb(t) FROM notificaciones_pedido t JOIN pedidos p ON p.id = t.pedido_id JOIN tiendas s ON s.id = p.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &["pedido_id", "mensaje", "fecha", "leido"],
        links: &[("pedido_id", Link::Row("tienda_Pedido"))],
        any_of: &[],
    },
    Dataset {
        key: "leads_Lead",
        table: "leads",
        export_sql: "SELECT to_jsonb(t) FROM leads t JOIN tiendas s ON s.id = t.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &[
            "usuario_id", "nombre", "email", "telefono", "estado", "fecha_creacion", "ultima_actualizacion", "notas",
            "tenant_id", "tienda_id", "valor_estimado", "probabilidad", "fuente", "total_compras",
            "valor_total_compras", "ultima_compra", "frecuencia_compra",
        ],
        links: &[
            ("usuario_id", Link::User),
            ("tenant_id", Link::Tenant),
            ("tienda_id", Link::Row("tienda_Tienda")),
        ],
        any_of: &[],
    },
    Dataset {
        key: "leads_InteraccionLead",
        table: "interacciones_lead",
        export_sql: "SELECT to_jsonb(t) FROM interacciones_lead t JOIN leads l ON l.id = t.lead_id JOIN tiendas s ON s.id = l.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &["lead_id", "tipo", "descripcion", "valor", "fecha"],
        links: &[("lead_id", Link::Row("leads_Lead"))],
        any_of: &[],
    },
    Dataset {
        key: "ComprasTiendaPublica_PedidoPublico",
        table: "pedidos_publicos",
        export_sql: "SELECT to_jsonb(t) FROM pedidos_publicos t JOIN tiendas s ON s.id = t.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &[
            "usuario_id", "tienda_id", "nombre", "apellido", "ci", "ciudad", "provincia", "direccion", "referencia",
            "telefono", "correo", "notas", "metodo_pago", "total", "fecha", "estado", "codigo_seguimiento",
        ],
        links: &[
            ("usuario_id", Link::Row("UsersTiendaPublica_UsersTiendaPublica")),
            ("tienda_id", Link::Row("tienda_Tienda")),
        ],
        any_of: &[],
    },
    Dataset {
        key: "ComprasTiendaPublica_DetallePedidoPublico",
        table: "detalles_pedido_publico",
        export_sql: "SELECT to_jsonb(t) FROM detalles_pedido_publico t JOIN pedidos_publicos p ON p.id = t.pedido_id JOIN tiendas s ON s.id = p.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &["pedido_id", "nombre_producto", "cantidad", "precio_unitario", "subtotal"],
        links: &[("pedido_id", Link::Row("ComprasTiendaPublica_PedidoPublico"))],
        any_of: &[],
    },
    Dataset {
        key: "payments_PaymentMethod",
        table: "payment_methods",
        export_sql: "SELECT to_jsonb(t) FROM payment_methods t JOIN tiendas s ON s.id = t.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &[
            "tenant_id", "tienda_id", "name", "payment_type", "is_active", "status", "credentials", "instructions",
            "created_at", "updated_at",
        ],
        links: &[("tenant_id", Link::Tenant), ("tienda_id", Link::Row("tienda_Tienda"))],
        any_of: &[],
    },
    Dataset {
        key: "payments_PaymentTransaction",
        table: "payment_transactions",
        export_sql: "SELECT to_jsonb(t) FROM payment_transactions t JOIN payment_methods m ON m.id = t.payment_method_id JOIN tiendas s ON s.id = m.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &[
            "tenant_id", "payment_method_id", "amount", "currency", "status", "transaction_id", "payment_details",
            "created_at", "updated_at",
        ],
        links: &[
            ("tenant_id", Link::Tenant),
            ("payment_method_id", Link::Row("payments_PaymentMethod")),
        ],
        any_of: &[],
    },
    Dataset {
        key: "store_style_StoreStyle",
        table: "store_styles",
        export_sql: "SELECT to_jsonb(t) FROM store_styles t JOIN tiendas s ON s.id = t.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &[
            "tienda_id", "color_primario", "color_secundario", "color_texto", "color_fondo", "tipo_fuente", "tema",
            "vista_producto", "tema_plantilla", "created_at", "updated_at",
        ],
        links: &[("tienda_id", Link::Row("tienda_Tienda"))],
        any_of: &[],
    },
    Dataset {
        key: "store_style_BloqueBienvenida",
        table: "bloques_bienvenida",
        export_sql: "SELECT to_jsonb(t) FROM bloques_bienvenida t JOIN store_styles st ON st.id = t.style_id JOIN tiendas s ON s.id = st.tienda_id WHERE s.usuario_id = $1 ORDER BY t.id",
        columns: &["style_id", "tipo", "titulo", "descripcion", "imagen"],
        links: &[("style_id", Link::Row("store_style_StoreStyle"))],
        any_of: &[],
    },
];

/// State shared by every row of one restore
struct RestoreContext {
    owner_old: i64,
    owner_new: i64,
    tenant_id: i64,
    existing_users: HashSet<i64>,
    ids: HashMap<&'static str, HashMap<i64, i64>>,
}

impl RestoreContext {
    /// Rewrites the foreign keys of a row in place. `Err` carries the
    /// reason the row has to be skipped.
    fn remap(&self, links: &[(&'static str, Link)], row: &mut Map<String, Value>) -> Result<(), String> {
        for (column, link) in links {
            let old = row.get(*column).and_then(Value::as_i64);
            let new = match link {
                Link::Owner => Some(self.owner_new),
                Link::Tenant => Some(self.tenant_id),
                Link::Row(set) => {
                    let old = old.ok_or_else(|| format!("{} vacío", column))?;
                    let mapped = self.ids.get(set).and_then(|m| m.get(&old)).copied();
                    Some(mapped.ok_or_else(|| format!("{} {} no fue restaurado", column, old))?)
                }
                Link::OptionalRow(set) => old.and_then(|old| self.ids.get(set).and_then(|m| m.get(&old)).copied()),
                Link::User => match old {
                    Some(old) if old == self.owner_old => Some(self.owner_new),
                    Some(old) if self.existing_users.contains(&old) => Some(old),
                    _ => None,
                },
            };
            row.insert(column.to_string(), new.map(Value::from).unwrap_or(Value::Null));
        }
        Ok(())
    }

    /// `remap` plus the dataset's row-level requirements
    fn prepare(&self, dataset: &Dataset, row: &mut Map<String, Value>) -> Result<(), String> {
        self.remap(dataset.links, row)?;
        if !dataset.any_of.is_empty() && dataset.any_of.iter().all(|c| row.get(*c).map_or(true, Value::is_null)) {
            return Err(format!("sin {}", dataset.any_of.join(" ni ")));
        }
        Ok(())
    }
}

/// Contents of a backup archive once read into memory
#[derive(Debug)]
pub struct BackupArchive {
    pub metadata: Value,
    pub data: Map<String, Value>,
    pub media: Vec<(PathBuf, Vec<u8>)>,
}

impl BackupArchive {
    pub fn read(bytes: &[u8]) -> BackupResult<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|_| BackupError::InvalidArchive("El archivo no es un ZIP válido".to_string()))?;

        let mut read_entry = |name: &str| -> BackupResult<Option<String>> {
            match archive.by_name(name) {
                Ok(mut entry) => {
                    let mut content = String::new();
                    entry.read_to_string(&mut content)?;
                    Ok(Some(content))
                }
                Err(zip::result::ZipError::FileNotFound) => Ok(None),
                Err(e) => Err(e.into()),
            }
        };

        let data_json = read_entry(DATA_FILE)?.ok_or_else(|| {
            BackupError::InvalidArchive("El archivo de backup no contiene datos JSON válidos".to_string())
        })?;
        let document: Value = serde_json::from_str(&data_json)
            .map_err(|e| BackupError::InvalidArchive(format!("Error al decodificar el archivo de datos: {}", e)))?;
        let metadata = match read_entry(METADATA_FILE)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable backup metadata: {}", e);
                Value::Null
            }),
            None => document.get("metadata").cloned().unwrap_or(Value::Null),
        };
        let data = document.get("data").and_then(Value::as_object).cloned().unwrap_or_default();

        let mut media = Vec::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() || !entry.name().starts_with(MEDIA_PREFIX) {
                continue;
            }
            // Entries that would escape the media directory are dropped
            let Some(relative) = entry
                .enclosed_name()
                .and_then(|p| p.strip_prefix(MEDIA_PREFIX).ok().map(Path::to_path_buf))
            else {
                tracing::warn!("Skipping unsafe media entry {}", entry.name());
                continue;
            };
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            media.push((relative, content));
        }

        Ok(Self { metadata, data, media })
    }

    pub fn owner_id(&self) -> Option<i64> {
        self.metadata.pointer("/user/id").and_then(|id| match id {
            Value::String(s) => s.parse().ok(),
            other => other.as_i64(),
        })
    }
}

/// Media paths referenced by exported rows: product and category images
/// and non-default store logos.
pub fn referenced_media(data: &Map<String, Value>) -> Vec<String> {
    let mut paths = Vec::new();
    let mut collect = |key: &str, column: &str, skip: Option<&str>| {
        for row in data.get(key).and_then(Value::as_array).into_iter().flatten() {
            if let Some(path) = row.get(column).and_then(Value::as_str) {
                if !path.is_empty() && Some(path) != skip && !paths.iter().any(|p| p == path) {
                    paths.push(path.to_string());
                }
            }
        }
    };
    collect("tienda_Producto", "imagen", None);
    collect("tienda_Tienda", "logo", Some(DEFAULT_LOGO));
    collect("tienda_Categoria", "imagen", None);
    collect("store_style_BloqueBienvenida", "imagen", None);
    paths
}

/// Unique per call; two backups in the same second get different names
pub fn backup_filename(user_id: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("backup_{}_{}_{}.zip", user_id, Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Writes the archive and returns `(media file count, bytes)`
fn build_archive(
    document: &Value,
    mut metadata: Value,
    media_root: &Path,
    media: &[String],
) -> BackupResult<(usize, Vec<u8>)> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(DATA_FILE, options)?;
    zip.write_all(serde_json::to_string_pretty(document)?.as_bytes())?;

    let mut media_count = 0;
    for relative in media {
        let source = media_root.join(relative);
        match fs::read(&source) {
            Ok(content) => {
                zip.start_file(format!("{}{}", MEDIA_PREFIX, relative), options)?;
                zip.write_all(&content)?;
                media_count += 1;
            }
            Err(e) => tracing::warn!("Media file {} not added to backup: {}", source.display(), e),
        }
    }

    metadata["media_files_count"] = json!(media_count);
    metadata["format"] = json!("json");
    zip.start_file(METADATA_FILE, options)?;
    zip.write_all(serde_json::to_string_pretty(&metadata)?.as_bytes())?;

    let bytes = zip.finish()?.into_inner();
    Ok((media_count, bytes))
}

#[derive(Debug, Serialize)]
pub struct BackupView {
    #[serde(flatten)]
    pub backup: Backup,
    pub username: String,
    pub email: String,
    pub tenant_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}

#[derive(Debug, sqlx::FromRow)]
struct BackupRow {
    #[sqlx(flatten)]
    backup: Backup,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    tenant_id: Option<i64>,
}

impl BackupRow {
    fn into_view(self, admin: bool) -> BackupView {
        let user_info = admin.then(|| {
            let name = format!("{} {}", self.first_name, self.last_name).trim().to_string();
            json!({
                "id": self.backup.user_id,
                "email": self.email,
                "name": if name.is_empty() { self.email.clone() } else { name },
            })
        });
        BackupView {
            backup: self.backup,
            username: self.username,
            email: self.email,
            tenant_id: self.tenant_id,
            user_info,
        }
    }
}

const BACKUP_SELECT: &str = r#"
    SELECT b.*, u.username, u.email, u.first_name, u.last_name, u.tenant_id
    FROM backups b
    JOIN users u ON u.id = b.user_id
"#;

pub struct BackupService {
    pool: PgPool,
    dir: PathBuf,
    media_root: PathBuf,
}

impl BackupService {
    pub async fn new() -> BackupResult<Self> {
        let pool = DatabaseManager::main_pool().await?;
        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        let settings = &config::config().backup;
        Self {
            pool,
            dir: settings.dir.clone(),
            media_root: settings.media_root.clone(),
        }
    }

    pub async fn find_user(&self, id: i64) -> BackupResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Usuario no encontrado"))?;
        Ok(user)
    }

    pub async fn find(&self, id: i64) -> BackupResult<Backup> {
        let backup = sqlx::query_as::<_, Backup>("SELECT * FROM backups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Backup no encontrado"))?;
        Ok(backup)
    }

    /// Admins see every backup (optionally one user's), others their own
    pub async fn list(&self, caller: &User, admin: bool, user_filter: Option<i64>) -> BackupResult<Vec<BackupView>> {
        let owner = if admin { user_filter } else { Some(caller.id) };
        let sql = format!(
            "{} WHERE ($1::BIGINT IS NULL OR b.user_id = $1) ORDER BY b.created_at DESC, b.id DESC",
            BACKUP_SELECT
        );
        let rows = sqlx::query_as::<_, BackupRow>(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.into_view(admin)).collect())
    }

    pub async fn get(&self, caller: &User, admin: bool, id: i64) -> BackupResult<BackupView> {
        let sql = format!("{} WHERE b.id = $1", BACKUP_SELECT);
        let row = sqlx::query_as::<_, BackupRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .filter(|row| admin || row.backup.user_id == caller.id)
            .ok_or_else(|| ServiceError::not_found("Backup no encontrado"))?;
        Ok(row.into_view(admin))
    }

    /// HTTP entry point: admins may back up another account
    pub async fn create(&self, caller: &User, admin: bool, body: &Value) -> BackupResult<BackupView> {
        let target = match opt_i64(body, "user").filter(|_| admin) {
            Some(user_id) => self.find_user(user_id).await?,
            None => caller.clone(),
        };
        let backup_type = if admin { BackupType::Admin } else { BackupType::Manual };
        let backup = self
            .create_for(
                &target,
                Some(caller),
                backup_type,
                &opt_str(body, "description").unwrap_or_default(),
                &opt_str(body, "notes").unwrap_or_default(),
            )
            .await?;
        self.get(caller, admin, backup.id).await
    }

    /// Inserts the row, then writes the archive. A failed archive removes
    /// the row again.
    pub async fn create_for(
        &self,
        user: &User,
        created_by: Option<&User>,
        backup_type: BackupType,
        description: &str,
        notes: &str,
    ) -> BackupResult<Backup> {
        let backup = sqlx::query_as::<_, Backup>(
            r#"
            INSERT INTO backups (user_id, status, backup_type, description, created_by_id, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(BackupStatus::Pending.as_str())
        .bind(backup_type.as_str())
        .bind(description)
        .bind(created_by.map(|u| u.id).unwrap_or(user.id))
        .bind(notes)
        .fetch_one(&self.pool)
        .await?;

        match self.write_archive(&backup, user, created_by).await {
            Ok(backup) => Ok(backup),
            Err(e) => {
                tracing::error!("Backup {} for user {} failed: {}", backup.id, user.id, e);
                sqlx::query("DELETE FROM backups WHERE id = $1")
                    .bind(backup.id)
                    .execute(&self.pool)
                    .await?;
                Err(e)
            }
        }
    }

    /// Serializes every dataset of the user into `{metadata, data}`
    pub async fn export_document(&self, user: &User) -> BackupResult<Value> {
        let mut data = Map::new();
        for dataset in DATASETS {
            let rows: Vec<(Value,)> = sqlx::query_as(dataset.export_sql)
                .bind(user.id)
                .fetch_all(&self.pool)
                .await?;
            if !rows.is_empty() {
                data.insert(dataset.key.to_string(), Value::Array(rows.into_iter().map(|(row,)| row).collect()));
            }
        }
        Ok(json!({
            "metadata": {
                "version": FORMAT_VERSION,
                "created_at": Utc::now().to_rfc3339(),
                "user": {"id": user.id, "username": user.username, "email": user.email},
            },
            "data": data,
        }))
    }

    async fn write_archive(&self, backup: &Backup, user: &User, created_by: Option<&User>) -> BackupResult<Backup> {
        let document = self.export_document(user).await?;
        let mut metadata = document["metadata"].clone();
        metadata["backup_type"] = json!(backup.backup_type);
        metadata["created_by"] = json!(created_by.map(|u| u.username.clone()).unwrap_or_else(|| "system".to_string()));
        let media = document["data"].as_object().map(referenced_media).unwrap_or_default();

        let path = self.dir.join(backup_filename(user.id));
        let media_root = self.media_root.clone();
        let target = path.clone();
        let size = tokio::task::spawn_blocking(move || -> BackupResult<usize> {
            let (media_count, bytes) = build_archive(&document, metadata, &media_root, &media)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::OpenOptions::new().write(true).create_new(true).open(&target)?;
            file.write_all(&bytes)?;
            tracing::debug!("Backup archive {} holds {} media files", target.display(), media_count);
            Ok(bytes.len())
        })
        .await??;

        let backup = sqlx::query_as::<_, Backup>(
            "UPDATE backups SET file = $2, size = $3, status = $4 WHERE id = $1 RETURNING *",
        )
        .bind(backup.id)
        .bind(path.display().to_string())
        .bind(size as i64)
        .bind(BackupStatus::Completed.as_str())
        .fetch_one(&self.pool)
        .await?;
        tracing::info!("Backup {} written to {} ({} bytes)", backup.id, backup.file, backup.size);
        Ok(backup)
    }

    pub async fn delete(&self, caller: &User, id: i64) -> BackupResult<()> {
        let backup = self.find(id).await?;
        if backup.user_id != caller.id {
            return Err(ServiceError::forbidden("No tienes permiso para eliminar este backup").into());
        }
        if !backup.file.is_empty() {
            if let Err(e) = fs::remove_file(&backup.file) {
                tracing::warn!("Could not remove backup file {}: {}", backup.file, e);
            }
        }
        sqlx::query("DELETE FROM backups WHERE id = $1")
            .bind(backup.id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Backup {} deleted", backup.id);
        Ok(())
    }

    /// File name and bytes of the archive, for the owner only
    pub async fn download(&self, caller: &User, id: i64) -> BackupResult<(String, Vec<u8>)> {
        let backup = self.find(id).await?;
        if backup.user_id != caller.id {
            return Err(ServiceError::forbidden("No tienes permisos para descargar este backup").into());
        }
        let missing = || BackupError::Service(ServiceError::not_found("El archivo de backup no existe"));
        if backup.file.is_empty() {
            return Err(missing());
        }
        let bytes = tokio::fs::read(&backup.file).await.map_err(|_| missing())?;
        let name = Path::new(&backup.file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("backup_{}.zip", backup.id));
        Ok((name, bytes))
    }

    /// Restores a stored backup into its owner's account
    pub async fn restore(&self, caller: &User, id: i64) -> BackupResult<()> {
        let backup = self.find(id).await?;
        if backup.user_id != caller.id {
            return Err(ServiceError::forbidden("Solo el usuario que creó el backup puede restaurarlo").into());
        }
        self.restore_backup(&backup, caller).await
    }

    /// Restore without the ownership check, for the CLI
    pub async fn restore_by_id(&self, id: i64) -> BackupResult<User> {
        let backup = self.find(id).await?;
        let owner = self.find_user(backup.user_id).await?;
        self.restore_backup(&backup, &owner).await?;
        Ok(owner)
    }

    async fn restore_backup(&self, backup: &Backup, owner: &User) -> BackupResult<()> {
        if backup.file.is_empty() {
            return Err(BackupError::InvalidArchive("No se puede restaurar un backup sin archivo".to_string()));
        }
        let bytes = tokio::fs::read(&backup.file).await?;
        self.restore_bytes(owner, bytes).await?;
        sqlx::query("UPDATE backups SET status = $2 WHERE id = $1")
            .bind(backup.id)
            .bind(BackupStatus::Completed.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stores an uploaded archive as a backup row and restores it. The
    /// row is removed again when the restore fails.
    pub async fn restore_from_upload(&self, caller: &User, bytes: Vec<u8>) -> BackupResult<()> {
        let path = self.dir.join(backup_filename(caller.id));
        let backup = sqlx::query_as::<_, Backup>(
            r#"
            INSERT INTO backups (user_id, status, backup_type, description, created_by_id, file, size)
            VALUES ($1, $2, $3, 'Restauración manual', $1, $4, $5)
            RETURNING *
            "#,
        )
        .bind(caller.id)
        .bind(BackupStatus::Pending.as_str())
        .bind(BackupType::Manual.as_str())
        .bind(path.display().to_string())
        .bind(bytes.len() as i64)
        .fetch_one(&self.pool)
        .await?;

        let stored = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            self.restore_backup(&backup, caller).await
        }
        .await;

        if let Err(e) = stored {
            tracing::warn!("Restore from upload failed for user {}: {}", caller.id, e);
            let _ = tokio::fs::remove_file(&path).await;
            sqlx::query("DELETE FROM backups WHERE id = $1")
                .bind(backup.id)
                .execute(&self.pool)
                .await?;
            return Err(e);
        }
        Ok(())
    }

    /// Replaces the owner's store with the archived one. All inserts run
    /// in one transaction; media files are written after it commits.
    pub async fn restore_bytes(&self, owner: &User, bytes: Vec<u8>) -> BackupResult<()> {
        let archive = tokio::task::spawn_blocking(move || BackupArchive::read(&bytes)).await??;
        let owner_old = archive.owner_id();
        if owner_old.is_some_and(|id| id != owner.id) {
            return Err(BackupError::NotOwner);
        }
        let tenant_id = owner
            .tenant_id
            .ok_or_else(|| ServiceError::validation("El usuario no tiene un tenant asignado"))?;

        let mut ctx = RestoreContext {
            owner_old: owner_old.unwrap_or(owner.id),
            owner_new: owner.id,
            tenant_id,
            existing_users: self.existing_users(&archive.data).await?,
            ids: HashMap::new(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tiendas WHERE usuario_id = $1")
            .bind(owner.id)
            .execute(&mut *tx)
            .await?;

        let mut restored = 0usize;
        for dataset in DATASETS.iter().filter(|d| !d.columns.is_empty()) {
            let Some(rows) = archive.data.get(dataset.key) else {
                continue;
            };
            let Some(rows) = rows.as_array() else {
                tracing::warn!("Backup set {} is not a list, skipped", dataset.key);
                continue;
            };
            let mapping = self.restore_dataset(&mut tx, dataset, rows, &ctx).await?;
            restored += mapping.len();
            ctx.ids.insert(dataset.key, mapping);
        }
        tx.commit().await?;

        let media_root = self.media_root.clone();
        let media = archive.media;
        tokio::task::spawn_blocking(move || {
            for (relative, content) in media {
                let target = media_root.join(&relative);
                let written = target
                    .parent()
                    .map(fs::create_dir_all)
                    .unwrap_or(Ok(()))
                    .and_then(|_| fs::write(&target, content));
                if let Err(e) = written {
                    tracing::warn!("Could not restore media file {}: {}", target.display(), e);
                }
            }
        })
        .await?;

        tracing::info!("Restored {} rows into the account of user {}", restored, owner.id);
        Ok(())
    }

    async fn restore_dataset(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dataset: &Dataset,
        rows: &[Value],
        ctx: &RestoreContext,
    ) -> BackupResult<HashMap<i64, i64>> {
        let mut mapping = HashMap::new();
        for row in rows {
            let Some(mut row) = row.as_object().cloned() else {
                continue;
            };
            let old_id = row.remove("id").and_then(|id| id.as_i64());
            if let Err(reason) = ctx.prepare(dataset, &mut row) {
                tracing::warn!("Skipping {} row {:?}: {}", dataset.key, old_id, reason);
                continue;
            }
            if dataset.table == "tiendas" {
                let slug = row.get("slug").and_then(Value::as_str).unwrap_or("tienda").to_string();
                row.insert("slug".to_string(), json!(Self::free_slug(tx, &slug).await?));
            }

            let columns: Vec<&str> = dataset.columns.iter().copied().filter(|c| row.contains_key(*c)).collect();
            let list = columns.join(", ");
            let sql = format!(
                "INSERT INTO {table} ({list}) SELECT {list} FROM jsonb_populate_record(NULL::{table}, $1) RETURNING id",
                table = dataset.table,
                list = list,
            );
            // A row the database rejects is skipped without aborting the restore
            sqlx::query("SAVEPOINT restore_row").execute(&mut **tx).await?;
            let inserted: Result<(i64,), sqlx::Error> =
                sqlx::query_as(&sql).bind(Value::Object(row)).fetch_one(&mut **tx).await;
            match inserted {
                Ok((new_id,)) => {
                    sqlx::query("RELEASE SAVEPOINT restore_row").execute(&mut **tx).await?;
                    if let Some(old_id) = old_id {
                        mapping.insert(old_id, new_id);
                    }
                }
                Err(e) => {
                    sqlx::query("ROLLBACK TO SAVEPOINT restore_row").execute(&mut **tx).await?;
                    tracing::warn!("Skipping {} row {:?}: {}", dataset.key, old_id, e);
                }
            }
        }
        tracing::debug!("Restored {} rows of {}", mapping.len(), dataset.key);
        Ok(mapping)
    }

    /// Store slugs are global; a taken slug gets a numeric suffix
    async fn free_slug(tx: &mut Transaction<'static, Postgres>, base: &str) -> BackupResult<String> {
        let mut candidate = base.to_string();
        let mut n = 1;
        loop {
            let (taken,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM tiendas WHERE slug = $1)")
                .bind(&candidate)
                .fetch_one(&mut **tx)
                .await?;
            if !taken {
                return Ok(candidate);
            }
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
    }

    /// Accounts referenced by restorable rows that still exist
    async fn existing_users(&self, data: &Map<String, Value>) -> BackupResult<HashSet<i64>> {
        let mut referenced: Vec<i64> = Vec::new();
        for dataset in DATASETS {
            let user_columns: Vec<&str> = dataset
                .links
                .iter()
                .filter(|(_, link)| *link == Link::User)
                .map(|(column, _)| *column)
                .collect();
            if user_columns.is_empty() {
                continue;
            }
            for row in data.get(dataset.key).and_then(Value::as_array).into_iter().flatten() {
                referenced.extend(user_columns.iter().filter_map(|c| row.get(*c).and_then(Value::as_i64)));
            }
        }
        if referenced.is_empty() {
            return Ok(HashSet::new());
        }
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ANY($1)")
            .bind(&referenced)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RestoreContext {
        let mut ids = HashMap::new();
        ids.insert("tienda_Tienda", HashMap::from([(10, 110)]));
        ids.insert("tienda_Categoria", HashMap::from([(20, 120)]));
        RestoreContext {
            owner_old: 1,
            owner_new: 1,
            tenant_id: 9,
            existing_users: HashSet::from([5]),
            ids,
        }
    }

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn datasets_are_ordered_parents_first() {
        for (position, dataset) in DATASETS.iter().enumerate() {
            for (_, link) in dataset.links {
                if let Link::Row(parent) | Link::OptionalRow(parent) = link {
                    let parent_position = DATASETS.iter().position(|d| d.key == *parent).unwrap();
                    assert!(parent_position < position, "{} before {}", parent, dataset.key);
                }
            }
        }
    }

    #[test]
    fn remap_rewrites_foreign_keys() {
        let ctx = context();
        let producto = DATASETS.iter().find(|d| d.key == "tienda_Producto").unwrap();

        let mut known = row(json!({"tienda_id": 10, "categoria_id": 20}));
        ctx.remap(producto.links, &mut known).unwrap();
        assert_eq!(known["tienda_id"], json!(110));
        assert_eq!(known["categoria_id"], json!(120));

        let mut lost_category = row(json!({"tienda_id": 10, "categoria_id": 99}));
        ctx.remap(producto.links, &mut lost_category).unwrap();
        assert_eq!(lost_category["categoria_id"], Value::Null);

        let mut orphan = row(json!({"tienda_id": 77}));
        assert!(ctx.remap(producto.links, &mut orphan).is_err());
    }

    #[test]
    fn remap_keeps_only_known_accounts() {
        let ctx = context();
        let lead = DATASETS.iter().find(|d| d.key == "leads_Lead").unwrap();

        let mut owner = row(json!({"usuario_id": 1, "tenant_id": 3, "tienda_id": 10}));
        ctx.remap(lead.links, &mut owner).unwrap();
        assert_eq!(owner["usuario_id"], json!(1));
        assert_eq!(owner["tenant_id"], json!(9));

        let mut other = row(json!({"usuario_id": 5, "tienda_id": 10}));
        ctx.remap(lead.links, &mut other).unwrap();
        assert_eq!(other["usuario_id"], json!(5));

        let mut gone = row(json!({"usuario_id": 6, "tienda_id": 10}));
        ctx.remap(lead.links, &mut gone).unwrap();
        assert_eq!(gone["usuario_id"], Value::Null);
    }

    #[test]
    fn media_references_skip_default_logo() {
        let data = row(json!({
            "tienda_Tienda": [{"logo": DEFAULT_LOGO}, {"logo": "logos/mio.png"}],
            "tienda_Producto": [{"imagen": "productos/a.png"}, {"imagen": null}, {"imagen": "productos/a.png"}],
            "tienda_Categoria": [{"imagen": "categorias/c.png"}],
        }));
        assert_eq!(
            referenced_media(&data),
            vec!["productos/a.png", "logos/mio.png", "categorias/c.png"]
        );
    }

    #[test]
    fn archives_round_trip_through_reader() {
        let dir = std::env::temp_dir().join(format!("backup-test-{}", uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(dir.join("productos")).unwrap();
        fs::write(dir.join("productos/a.png"), b"png").unwrap();

        let document = json!({
            "metadata": {"version": FORMAT_VERSION, "user": {"id": 4}},
            "data": {"tienda_Producto": [{"id": 1, "imagen": "productos/a.png"}]},
        });
        let media = vec!["productos/a.png".to_string(), "productos/missing.png".to_string()];
        let (count, bytes) = build_archive(&document, document["metadata"].clone(), &dir, &media).unwrap();
        assert_eq!(count, 1);

        let archive = BackupArchive::read(&bytes).unwrap();
        assert_eq!(archive.owner_id(), Some(4));
        assert_eq!(archive.metadata["media_files_count"], json!(1));
        assert!(archive.data.contains_key("tienda_Producto"));
        assert_eq!(archive.media, vec![(PathBuf::from("productos/a.png"), b"png".to_vec())]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn archives_without_data_are_rejected() {
        assert!(matches!(BackupArchive::read(b"not a zip"), Err(BackupError::InvalidArchive(_))));

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("metadata.json", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"{}").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(BackupArchive::read(&bytes), Err(BackupError::InvalidArchive(_))));
    }

    #[test]
    fn filenames_carry_user_and_timestamp() {
        let name = backup_filename(12);
        assert!(name.starts_with("backup_12_"));
        assert!(name.ends_with(".zip"));
        assert_eq!(name.len(), "backup_12_20240101_000000_0123abcd.zip".len());
    }

    #[test]
    fn filenames_differ_within_the_same_second() {
        assert_ne!(backup_filename(7), backup_filename(7));
    }

    #[test]
    fn orders_without_any_client_are_skipped() {
        let ctx = context();
        let pedido = DATASETS.iter().find(|d| d.key == "tienda_Pedido").unwrap();

        let mut gone_client = row(json!({"tienda_id": 10, "cliente_id": 6, "cliente_tienda_publica_id": null}));
        assert!(ctx.prepare(pedido, &mut gone_client).is_err());

        let mut known_client = row(json!({"tienda_id": 10, "cliente_id": 5, "cliente_tienda_publica_id": null}));
        ctx.prepare(pedido, &mut known_client).unwrap();
        assert_eq!(known_client["cliente_id"], json!(5));
    }

    #[test]
    fn store_payments_and_styling_are_backed_up() {
        for key in [
            "payments_PaymentMethod",
            "payments_PaymentTransaction",
            "store_style_StoreStyle",
            "store_style_BloqueBienvenida",
        ] {
            assert!(DATASETS.iter().any(|d| d.key == key), "{} missing", key);
        }

        let mut ids = context().ids;
        ids.insert("payments_PaymentMethod", HashMap::from([(30, 130)]));
        let ctx = RestoreContext { ids, ..context() };
        let transaction = DATASETS.iter().find(|d| d.key == "payments_PaymentTransaction").unwrap();
        let mut txn = row(json!({"tenant_id": 2, "payment_method_id": 30}));
        ctx.prepare(transaction, &mut txn).unwrap();
        assert_eq!(txn["payment_method_id"], json!(130));
        assert_eq!(txn["tenant_id"], json!(9));
    }
}
