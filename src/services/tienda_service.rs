use serde_json::Value;
use sqlx::PgPool;

use crate::database::manager::DatabaseManager;
use crate::database::models::{Categoria, Producto, TemaTienda, Tienda, User, DEFAULT_LOGO};
use crate::services::{opt_bool, opt_str, ServiceError, ServiceResult};

pub const DEFAULT_DESCRIPTION: &str = "Bienvenido a mi tienda";
const MAX_DESCRIPTION: usize = 500;

/// Field changes accepted for a store, already validated and normalized
#[derive(Debug, Default, PartialEq)]
pub struct TiendaChanges {
    pub nombre: Option<String>,
    pub descripcion: Option<String>,
    pub tema: Option<String>,
    pub publicado: Option<bool>,
    /// `Some(None)` clears the logo
    pub logo: Option<Option<String>>,
    pub color_primario: Option<String>,
    pub color_secundario: Option<String>,
    pub color_texto: Option<String>,
    pub color_fondo: Option<String>,
}

impl TiendaChanges {
    pub fn from_json(body: &Value) -> ServiceResult<Self> {
        let mut changes = TiendaChanges::default();

        if body.get("nombre").is_some() {
            let nombre = opt_str(body, "nombre").unwrap_or_default();
            let nombre = nombre.trim();
            if nombre.is_empty() {
                return Err(ServiceError::field("nombre", "El nombre no puede estar vacío"));
            }
            if nombre.chars().count() > 100 {
                return Err(ServiceError::field("nombre", "El nombre no puede tener más de 100 caracteres"));
            }
            changes.nombre = Some(nombre.to_string());
        }

        if body.get("descripcion").is_some() {
            let descripcion = opt_str(body, "descripcion").unwrap_or_default();
            if descripcion.chars().count() > MAX_DESCRIPTION {
                return Err(ServiceError::field(
                    "descripcion",
                    "La descripción no puede tener más de 500 caracteres",
                ));
            }
            changes.descripcion = Some(descripcion);
        }

        if body.get("tema").is_some() {
            let tema = opt_str(body, "tema").unwrap_or_default();
            if !tema.is_empty() {
                crate::services::check_choice("tema", &tema, &TemaTienda::values())?;
                changes.tema = Some(tema);
            }
        }

        changes.publicado = opt_bool(body, "publicado")?;

        if let Some(logo) = body.get("logo") {
            changes.logo = Some(logo.as_str().filter(|s| !s.is_empty()).map(str::to_string));
        }

        changes.color_primario = color_field(body, "color_primario")?;
        changes.color_secundario = color_field(body, "color_secundario")?;
        changes.color_texto = color_field(body, "color_texto")?;
        changes.color_fondo = color_field(body, "color_fondo")?;

        Ok(changes)
    }
}

/// `#RRGGBB`, adding the leading `#` when missing; null or blank means unchanged
pub fn normalize_color(field: &str, raw: &str) -> ServiceResult<Option<String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let color = if raw.starts_with('#') { raw.to_string() } else { format!("#{}", raw) };
    if color.len() != 7 || !color[1..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ServiceError::field(field, "El color debe tener el formato #RRGGBB"));
    }
    Ok(Some(color))
}

fn color_field(body: &Value, field: &str) -> ServiceResult<Option<String>> {
    match body.get(field).and_then(Value::as_str) {
        Some(raw) => normalize_color(field, raw),
        None => Ok(None),
    }
}

pub struct TiendaService {
    pool: PgPool,
}

impl TiendaService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, tenant_id: i64) -> ServiceResult<Vec<Tienda>> {
        let tiendas = sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE tenant_id = $1 ORDER BY id")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(tiendas)
    }

    pub async fn get(&self, tenant_id: i64, id: i64) -> ServiceResult<Tienda> {
        sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("No encontrado."))
    }

    /// The store owned by this user, if any
    pub async fn for_user(&self, user_id: i64) -> ServiceResult<Option<Tienda>> {
        let tienda = sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE usuario_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tienda)
    }

    /// First store of the tenant, used by staff accounts that own none
    pub async fn first_of_tenant(&self, tenant_id: i64) -> ServiceResult<Option<Tienda>> {
        let tienda = sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE tenant_id = $1 ORDER BY id LIMIT 1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tienda)
    }

    pub async fn by_slug(&self, slug: &str) -> ServiceResult<Option<Tienda>> {
        let tienda = sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tienda)
    }

    pub async fn published_by_slug(&self, slug: &str) -> ServiceResult<Tienda> {
        sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE slug = $1 AND publicado = true")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("No se encontró la tienda"))
    }

    pub async fn create(&self, user: &User, tenant_id: i64, body: &Value) -> ServiceResult<Tienda> {
        if self.for_user(user.id).await?.is_some() {
            return Err(ServiceError::validation("Ya tienes una tienda creada"));
        }
        let changes = TiendaChanges::from_json(body)?;
        let nombre = changes
            .nombre
            .clone()
            .ok_or_else(|| ServiceError::field("nombre", "Este campo es requerido."))?;
        let slug = self.unique_slug(&nombre).await?;

        let tienda = self.insert(user.id, tenant_id, &nombre, &slug, changes.descripcion.as_deref().unwrap_or("")).await?;
        let tienda = self.apply(tienda.id, changes).await?;
        tracing::info!("Store '{}' created by {}", tienda.slug, user.username);
        Ok(tienda)
    }

    /// Store created automatically for a new seller; `None` if one exists
    pub async fn create_default_for_seller(&self, user: &User, tenant_id: i64) -> ServiceResult<Option<Tienda>> {
        if self.for_user(user.id).await?.is_some() {
            return Ok(None);
        }
        let nombre = format!("Tienda de {}", user.username);
        let slug = self.unique_slug(&user.username).await?;
        let tienda = self.insert(user.id, tenant_id, &nombre, &slug, DEFAULT_DESCRIPTION).await?;
        Ok(Some(tienda))
    }

    pub async fn update(&self, tenant_id: i64, id: i64, body: &Value) -> ServiceResult<Tienda> {
        let tienda = self.get(tenant_id, id).await?;
        let changes = TiendaChanges::from_json(body)?;
        self.apply(tienda.id, changes).await
    }

    pub async fn delete(&self, tenant_id: i64, id: i64) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM tiendas WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("No encontrado."));
        }
        tracing::info!("Store {} deleted", id);
        Ok(())
    }

    /// Configuration view of the caller's own store
    pub async fn config_for(&self, user: &User) -> ServiceResult<Tienda> {
        self.for_user(user.id)
            .await?
            .ok_or_else(|| ServiceError::validation("Este usuario no tiene una tienda asignada."))
    }

    pub async fn update_config(&self, user: &User, body: &Value) -> ServiceResult<Tienda> {
        let tienda = self.config_for(user).await?;
        let changes = TiendaChanges::from_json(body)?;
        let updated = self.apply(tienda.id, changes).await?;
        tracing::info!("Store '{}' configuration updated", updated.slug);
        Ok(updated)
    }

    pub async fn public_products(&self, slug: &str) -> ServiceResult<Vec<Producto>> {
        let tienda = self.published_by_slug(slug).await?;
        let productos = sqlx::query_as::<_, Producto>(
            r#"
            SELECT p.*, c.nombre AS categoria_nombre
            FROM productos p
            LEFT JOIN categorias c ON c.id = p.categoria_id
            WHERE p.tienda_id = $1 AND p.eliminado = false
            ORDER BY p.fecha_creacion DESC
            "#,
        )
        .bind(tienda.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(productos)
    }

    pub async fn public_categories(&self, slug: &str) -> ServiceResult<Vec<Categoria>> {
        let tienda = self.published_by_slug(slug).await?;
        let categorias = sqlx::query_as::<_, Categoria>("SELECT * FROM categorias WHERE tienda_id = $1 ORDER BY nombre")
            .bind(tienda.id)
            .fetch_all(&self.pool)
            .await?;
        Ok(categorias)
    }

    /// slugify(base), then `-1`, `-2`, ... until unused
    pub async fn unique_slug(&self, base: &str) -> ServiceResult<String> {
        let mut root = crate::services::slugify(base);
        if root.is_empty() {
            root = "tienda".to_string();
        }
        let taken: Vec<(String,)> = sqlx::query_as("SELECT slug FROM tiendas WHERE slug = $1 OR slug LIKE $2")
            .bind(&root)
            .bind(format!("{}-%", root))
            .fetch_all(&self.pool)
            .await?;
        let taken: Vec<String> = taken.into_iter().map(|(s,)| s).collect();
        Ok(next_free_slug(&root, &taken))
    }

    async fn insert(&self, user_id: i64, tenant_id: i64, nombre: &str, slug: &str, descripcion: &str) -> ServiceResult<Tienda> {
        let tienda = sqlx::query_as::<_, Tienda>(
            r#"
            INSERT INTO tiendas (tenant_id, usuario_id, nombre, descripcion, slug, logo)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(nombre)
        .bind(descripcion)
        .bind(slug)
        .bind(DEFAULT_LOGO)
        .fetch_one(&self.pool)
        .await?;
        Ok(tienda)
    }

    async fn apply(&self, id: i64, changes: TiendaChanges) -> ServiceResult<Tienda> {
        let (logo_set, logo) = match changes.logo {
            Some(logo) => (true, logo),
            None => (false, None),
        };
        let tienda = sqlx::query_as::<_, Tienda>(
            r#"
            UPDATE tiendas SET
                nombre = COALESCE($2, nombre),
                descripcion = COALESCE($3, descripcion),
                tema = COALESCE($4, tema),
                publicado = COALESCE($5, publicado),
                logo = CASE WHEN $6 THEN $7 ELSE logo END,
                color_primario = COALESCE($8, color_primario),
                color_secundario = COALESCE($9, color_secundario),
                color_texto = COALESCE($10, color_texto),
                color_fondo = COALESCE($11, color_fondo)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.nombre)
        .bind(changes.descripcion)
        .bind(changes.tema)
        .bind(changes.publicado)
        .bind(logo_set)
        .bind(logo)
        .bind(changes.color_primario)
        .bind(changes.color_secundario)
        .bind(changes.color_texto)
        .bind(changes.color_fondo)
        .fetch_one(&self.pool)
        .await?;
        Ok(tienda)
    }
}

fn next_free_slug(root: &str, taken: &[String]) -> String {
    if !taken.iter().any(|s| s == root) {
        return root.to_string();
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{}-{}", root, counter);
        if !taken.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn colors_gain_hash_prefix() {
        assert_eq!(normalize_color("c", "3B82F6").unwrap(), Some("#3B82F6".to_string()));
        assert_eq!(normalize_color("c", "#ffffff").unwrap(), Some("#ffffff".to_string()));
        assert_eq!(normalize_color("c", "").unwrap(), None);
        assert!(normalize_color("c", "#12345").is_err());
        assert!(normalize_color("c", "zzzzzz").is_err());
    }

    #[test]
    fn config_changes_normalize_input() {
        let changes = TiendaChanges::from_json(&json!({
            "nombre": " Mi Tienda ",
            "publicado": "true",
            "descripcion": null,
            "logo": null,
            "color_fondo": "F3F4F6"
        }))
        .unwrap();
        assert_eq!(changes.nombre.as_deref(), Some("Mi Tienda"));
        assert_eq!(changes.publicado, Some(true));
        assert_eq!(changes.descripcion.as_deref(), Some(""));
        assert_eq!(changes.logo, Some(None));
        assert_eq!(changes.color_fondo.as_deref(), Some("#F3F4F6"));
        assert_eq!(changes.color_texto, None);
    }

    #[test]
    fn config_rejects_blank_name_and_long_description() {
        assert!(TiendaChanges::from_json(&json!({"nombre": "   "})).is_err());
        let long = "x".repeat(501);
        match TiendaChanges::from_json(&json!({"descripcion": long})) {
            Err(ServiceError::FieldValidation { message, .. }) => {
                assert_eq!(message, "La descripción no puede tener más de 500 caracteres")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(TiendaChanges::from_json(&json!({"tema": "neon"})).is_err());
    }

    #[test]
    fn slug_collisions_get_numeric_suffix() {
        assert_eq!(next_free_slug("ana", &[]), "ana");
        assert_eq!(next_free_slug("ana", &["ana".into()]), "ana-1");
        assert_eq!(next_free_slug("ana", &["ana".into(), "ana-1".into(), "ana-3".into()]), "ana-2");
        assert_eq!(next_free_slug("ana", &["ana-1".into()]), "ana");
    }
}
