use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::manager::DatabaseManager;
use crate::database::models::{
    BloqueBienvenida, StoreStyle, TemaEstilo, TemaPlantilla, Tienda, TipoBloque, VistaProducto,
};
use crate::services::tienda_service::normalize_color;
use crate::services::{check_choice, opt_i64, opt_str, ServiceError, ServiceResult};

const NO_STORE: &str = "No se encontró la tienda";

/// Style fields present in a request; absent fields stay unchanged
#[derive(Debug, Default, PartialEq)]
pub struct StyleChanges {
    pub color_primario: Option<String>,
    pub color_secundario: Option<String>,
    pub color_texto: Option<String>,
    pub color_fondo: Option<String>,
    pub tipo_fuente: Option<String>,
    pub tema: Option<String>,
    pub vista_producto: Option<String>,
    pub tema_plantilla: Option<String>,
}

impl StyleChanges {
    pub fn from_json(body: &Value) -> ServiceResult<Self> {
        let color = |field: &str| match opt_str(body, field) {
            Some(raw) => normalize_color(field, &raw),
            None => Ok(None),
        };
        let choice = |field: &str, allowed: Vec<&'static str>| -> ServiceResult<Option<String>> {
            match opt_str(body, field) {
                Some(value) => {
                    check_choice(field, &value, &allowed)?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        };

        let tipo_fuente = opt_str(body, "tipo_fuente").map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
        if tipo_fuente.as_ref().is_some_and(|f| f.chars().count() > 50) {
            return Err(ServiceError::field("tipo_fuente", "Asegúrese de que este campo no tenga más de 50 caracteres."));
        }

        Ok(Self {
            color_primario: color("color_primario")?,
            color_secundario: color("color_secundario")?,
            color_texto: color("color_texto")?,
            color_fondo: color("color_fondo")?,
            tipo_fuente,
            tema: choice("tema", TemaEstilo::values())?,
            vista_producto: choice("vista_producto", VistaProducto::values())?,
            tema_plantilla: choice("tema_plantilla", TemaPlantilla::values())?,
        })
    }
}

#[derive(Debug, PartialEq)]
pub struct BloqueInput {
    pub tipo: String,
    pub titulo: String,
    pub descripcion: String,
    pub imagen: Option<String>,
}

impl BloqueInput {
    pub fn from_json(body: &Value, current: Option<&BloqueBienvenida>) -> ServiceResult<Self> {
        let tipo = opt_str(body, "tipo")
            .or_else(|| current.map(|b| b.tipo.clone()))
            .ok_or_else(|| ServiceError::field("tipo", "Este campo es requerido."))?;
        check_choice("tipo", &tipo, &TipoBloque::values())?;

        let titulo = opt_str(body, "titulo")
            .or_else(|| current.map(|b| b.titulo.clone()))
            .unwrap_or_default();
        if titulo.trim().is_empty() {
            return Err(ServiceError::field("titulo", "Este campo es requerido."));
        }
        if titulo.chars().count() > 200 {
            return Err(ServiceError::field("titulo", "Asegúrese de que este campo no tenga más de 200 caracteres."));
        }

        let imagen = match body.get("imagen") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(_) => None,
            None => current.and_then(|b| b.imagen.clone()),
        };

        Ok(Self {
            tipo,
            titulo,
            descripcion: opt_str(body, "descripcion")
                .or_else(|| current.map(|b| b.descripcion.clone()))
                .unwrap_or_default(),
            imagen,
        })
    }
}

/// Turns a bloque validation error into the per-item error object
fn item_error(error: &ServiceError) -> Value {
    match error {
        ServiceError::FieldValidation { field, message } => json!({ field.as_str(): [message] }),
        other => json!({"error": other.to_string()}),
    }
}

#[derive(Debug, Serialize)]
pub struct StyleView {
    #[serde(flatten)]
    pub style: StoreStyle,
    pub bloques: Vec<BloqueBienvenida>,
}

impl StyleView {
    /// Shape used inside the public store payload
    pub fn public_json(&self) -> Value {
        json!({
            "color_primario": self.style.color_primario,
            "color_secundario": self.style.color_secundario,
            "color_texto": self.style.color_texto,
            "color_fondo": self.style.color_fondo,
            "tipo_fuente": self.style.tipo_fuente,
            "tema": self.style.tema,
            "vista_producto": self.style.vista_producto,
            "tema_plantilla": self.style.tema_plantilla,
            "bloques_bienvenida": self.bloques,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PublicStore {
    pub nombre: String,
    pub logo: Option<String>,
    pub style: Value,
}

#[derive(Debug, Serialize)]
pub struct BulkCreated {
    pub creados: Vec<BloqueBienvenida>,
    pub errores: Vec<Value>,
}

pub struct StoreStyleService {
    pool: PgPool,
}

impl StoreStyleService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn view(&self, style: StoreStyle) -> ServiceResult<StyleView> {
        let bloques = self.bloques_of(style.id).await?;
        Ok(StyleView { style, bloques })
    }

    async fn bloques_of(&self, style_id: i64) -> ServiceResult<Vec<BloqueBienvenida>> {
        let bloques = sqlx::query_as::<_, BloqueBienvenida>(
            "SELECT * FROM bloques_bienvenida WHERE style_id = $1 ORDER BY id",
        )
        .bind(style_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bloques)
    }

    // Tenant-scoped CRUD

    pub async fn list(&self, tenant_id: i64) -> ServiceResult<Vec<StyleView>> {
        let styles = sqlx::query_as::<_, StoreStyle>(
            r#"
            SELECT e.* FROM store_styles e
            JOIN tiendas t ON t.id = e.tienda_id
            WHERE t.tenant_id = $1
            ORDER BY e.id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut views = Vec::with_capacity(styles.len());
        for style in styles {
            views.push(self.view(style).await?);
        }
        Ok(views)
    }

    async fn find(&self, tenant_id: i64, id: i64) -> ServiceResult<StoreStyle> {
        sqlx::query_as::<_, StoreStyle>(
            r#"
            SELECT e.* FROM store_styles e
            JOIN tiendas t ON t.id = e.tienda_id
            WHERE e.id = $1 AND t.tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Estilo no encontrado"))
    }

    pub async fn get(&self, tenant_id: i64, id: i64) -> ServiceResult<StyleView> {
        let style = self.find(tenant_id, id).await?;
        self.view(style).await
    }

    pub async fn create(&self, tienda: Option<&Tienda>, body: &Value) -> ServiceResult<StyleView> {
        let tienda = tienda.ok_or_else(|| ServiceError::not_found(NO_STORE))?;
        let changes = StyleChanges::from_json(body)?;
        let mut tx = self.pool.begin().await?;
        let style = sqlx::query_as::<_, StoreStyle>("INSERT INTO store_styles (tienda_id) VALUES ($1) RETURNING *")
            .bind(tienda.id)
            .fetch_one(&mut *tx)
            .await?;
        let style = Self::apply(&mut tx, &style, &changes, bloques_field(body)?).await?;
        tx.commit().await?;
        tracing::info!("Style {} created for store {}", style.id, tienda.id);
        self.view(style).await
    }

    pub async fn update(&self, tenant_id: i64, id: i64, body: &Value) -> ServiceResult<StyleView> {
        let style = self.find(tenant_id, id).await?;
        self.update_style(style, body).await
    }

    pub async fn delete(&self, tenant_id: i64, id: i64) -> ServiceResult<()> {
        let style = self.find(tenant_id, id).await?;
        sqlx::query("DELETE FROM store_styles WHERE id = $1")
            .bind(style.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // The caller's own store and public storefronts

    pub async fn get_or_create(&self, tienda_id: i64) -> ServiceResult<StoreStyle> {
        sqlx::query("INSERT INTO store_styles (tienda_id) VALUES ($1) ON CONFLICT (tienda_id) DO NOTHING")
            .bind(tienda_id)
            .execute(&self.pool)
            .await?;
        let style = sqlx::query_as::<_, StoreStyle>("SELECT * FROM store_styles WHERE tienda_id = $1")
            .bind(tienda_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(style)
    }

    pub async fn my_style(&self, tienda: Option<&Tienda>) -> ServiceResult<StyleView> {
        let tienda = tienda.ok_or_else(|| ServiceError::not_found(NO_STORE))?;
        let style = self.get_or_create(tienda.id).await?;
        self.view(style).await
    }

    pub async fn update_my_style(&self, tienda: Option<&Tienda>, body: &Value) -> ServiceResult<StyleView> {
        let tienda = tienda.ok_or_else(|| ServiceError::not_found(NO_STORE))?;
        let style = self.get_or_create(tienda.id).await?;
        self.update_style(style, body).await
    }

    async fn published_store(&self, slug: &str) -> ServiceResult<Tienda> {
        sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE slug = $1 AND publicado = true")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Tienda no encontrada o no publicada"))
    }

    pub async fn public_style(&self, slug: &str) -> ServiceResult<StyleView> {
        let tienda = self.published_store(slug).await?;
        let style = self.get_or_create(tienda.id).await?;
        self.view(style).await
    }

    pub async fn update_public_style(&self, slug: &str, body: &Value) -> ServiceResult<StyleView> {
        let tienda = self.published_store(slug).await?;
        let style = self.get_or_create(tienda.id).await?;
        tracing::warn!("Anonymous style update on store '{}'", tienda.slug);
        self.update_style(style, body).await
    }

    /// Name, logo and style of any store; `style` is `{}` until one exists
    pub async fn public_store(&self, slug: &str) -> ServiceResult<PublicStore> {
        let tienda = sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Tienda no encontrada"))?;
        let style = sqlx::query_as::<_, StoreStyle>("SELECT * FROM store_styles WHERE tienda_id = $1")
            .bind(tienda.id)
            .fetch_optional(&self.pool)
            .await?;
        let style = match style {
            Some(style) => self.view(style).await?.public_json(),
            None => json!({}),
        };
        Ok(PublicStore {
            nombre: tienda.nombre,
            logo: tienda.logo,
            style,
        })
    }

    async fn update_style(&self, style: StoreStyle, body: &Value) -> ServiceResult<StyleView> {
        let changes = StyleChanges::from_json(body)?;
        let bloques = bloques_field(body)?;
        let mut tx = self.pool.begin().await?;
        let style = Self::apply(&mut tx, &style, &changes, bloques).await?;
        tx.commit().await?;
        self.view(style).await
    }

    /// Writes the style fields and, when a list was sent, makes the
    /// style's bloques match it: entries with an id of this style are
    /// updated, entries without id are created, everything else goes.
    async fn apply(
        tx: &mut Transaction<'static, Postgres>,
        style: &StoreStyle,
        changes: &StyleChanges,
        bloques: Option<&Vec<Value>>,
    ) -> ServiceResult<StoreStyle> {
        let style = sqlx::query_as::<_, StoreStyle>(
            r#"
            UPDATE store_styles SET
                color_primario = COALESCE($2, color_primario),
                color_secundario = COALESCE($3, color_secundario),
                color_texto = COALESCE($4, color_texto),
                color_fondo = COALESCE($5, color_fondo),
                tipo_fuente = COALESCE($6, tipo_fuente),
                tema = COALESCE($7, tema),
                vista_producto = COALESCE($8, vista_producto),
                tema_plantilla = COALESCE($9, tema_plantilla),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(style.id)
        .bind(&changes.color_primario)
        .bind(&changes.color_secundario)
        .bind(&changes.color_texto)
        .bind(&changes.color_fondo)
        .bind(&changes.tipo_fuente)
        .bind(&changes.tema)
        .bind(&changes.vista_producto)
        .bind(&changes.tema_plantilla)
        .fetch_one(&mut **tx)
        .await?;

        let Some(bloques) = bloques else {
            return Ok(style);
        };

        let mut kept: Vec<i64> = Vec::with_capacity(bloques.len());
        for entry in bloques {
            match opt_i64(entry, "id") {
                Some(id) => {
                    let current = sqlx::query_as::<_, BloqueBienvenida>(
                        "SELECT * FROM bloques_bienvenida WHERE id = $1 AND style_id = $2",
                    )
                    .bind(id)
                    .bind(style.id)
                    .fetch_optional(&mut **tx)
                    .await?;
                    // Ids of other styles are ignored, so those entries get dropped
                    let Some(current) = current else { continue };
                    let input = BloqueInput::from_json(entry, Some(&current))?;
                    Self::write_bloque(tx, Some(current.id), style.id, &input).await?;
                    kept.push(current.id);
                }
                None => {
                    let input = BloqueInput::from_json(entry, None)?;
                    let created = Self::write_bloque(tx, None, style.id, &input).await?;
                    kept.push(created.id);
                }
            }
        }

        sqlx::query("DELETE FROM bloques_bienvenida WHERE style_id = $1 AND NOT (id = ANY($2))")
            .bind(style.id)
            .bind(&kept)
            .execute(&mut **tx)
            .await?;
        tracing::debug!("Style {} now has {} bloques", style.id, kept.len());
        Ok(style)
    }

    async fn write_bloque(
        tx: &mut Transaction<'static, Postgres>,
        id: Option<i64>,
        style_id: i64,
        input: &BloqueInput,
    ) -> ServiceResult<BloqueBienvenida> {
        let query = match id {
            Some(id) => sqlx::query_as::<_, BloqueBienvenida>(
                r#"
                UPDATE bloques_bienvenida SET tipo = $3, titulo = $4, descripcion = $5, imagen = $6
                WHERE id = $1 AND style_id = $2
                RETURNING *
                "#,
            )
            .bind(id),
            None => sqlx::query_as::<_, BloqueBienvenida>(
                r#"
                INSERT INTO bloques_bienvenida (style_id, tipo, titulo, descripcion, imagen)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
                "#,
            ),
        };
        let bloque = query
            .bind(style_id)
            .bind(&input.tipo)
            .bind(&input.titulo)
            .bind(&input.descripcion)
            .bind(&input.imagen)
            .fetch_one(&mut **tx)
            .await?;
        Ok(bloque)
    }

    // Bloques of the caller's own store

    pub async fn list_bloques(&self, tienda: Option<&Tienda>) -> ServiceResult<Vec<BloqueBienvenida>> {
        let Some(tienda) = tienda else {
            return Ok(vec![]);
        };
        let style = sqlx::query_as::<_, StoreStyle>("SELECT * FROM store_styles WHERE tienda_id = $1")
            .bind(tienda.id)
            .fetch_optional(&self.pool)
            .await?;
        match style {
            Some(style) => self.bloques_of(style.id).await,
            None => Ok(vec![]),
        }
    }

    async fn find_bloque(&self, tienda: Option<&Tienda>, id: i64) -> ServiceResult<BloqueBienvenida> {
        let not_found = || ServiceError::not_found("Bloque no encontrado");
        let tienda = tienda.ok_or_else(not_found)?;
        sqlx::query_as::<_, BloqueBienvenida>(
            r#"
            SELECT b.* FROM bloques_bienvenida b
            JOIN store_styles e ON e.id = b.style_id
            WHERE b.id = $1 AND e.tienda_id = $2
            "#,
        )
        .bind(id)
        .bind(tienda.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(not_found)
    }

    pub async fn get_bloque(&self, tienda: Option<&Tienda>, id: i64) -> ServiceResult<BloqueBienvenida> {
        self.find_bloque(tienda, id).await
    }

    pub async fn create_bloque(&self, tienda: Option<&Tienda>, body: &Value) -> ServiceResult<BloqueBienvenida> {
        let tienda = tienda.ok_or_else(|| ServiceError::not_found("Tienda no encontrada"))?;
        let input = BloqueInput::from_json(body, None)?;
        let style = self.get_or_create(tienda.id).await?;
        let mut tx = self.pool.begin().await?;
        let bloque = Self::write_bloque(&mut tx, None, style.id, &input).await?;
        tx.commit().await?;
        Ok(bloque)
    }

    pub async fn update_bloque(&self, tienda: Option<&Tienda>, id: i64, body: &Value) -> ServiceResult<BloqueBienvenida> {
        let current = self.find_bloque(tienda, id).await?;
        let input = BloqueInput::from_json(body, Some(&current))?;
        let mut tx = self.pool.begin().await?;
        let bloque = Self::write_bloque(&mut tx, Some(current.id), current.style_id, &input).await?;
        tx.commit().await?;
        Ok(bloque)
    }

    pub async fn delete_bloque(&self, tienda: Option<&Tienda>, id: i64) -> ServiceResult<()> {
        let bloque = self.find_bloque(tienda, id).await?;
        sqlx::query("DELETE FROM bloques_bienvenida WHERE id = $1")
            .bind(bloque.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Creates each valid entry independently and reports the rest
    pub async fn create_many(&self, tienda: Option<&Tienda>, body: &Value) -> ServiceResult<BulkCreated> {
        let tienda = tienda.ok_or_else(|| ServiceError::not_found("Tienda no encontrada"))?;
        let entries = body
            .as_array()
            .ok_or_else(|| ServiceError::validation("Debe enviar una lista de bloques."))?;
        let style = self.get_or_create(tienda.id).await?;

        let mut result = BulkCreated {
            creados: Vec::new(),
            errores: Vec::new(),
        };
        for entry in entries {
            match BloqueInput::from_json(entry, None) {
                Ok(input) => {
                    let mut tx = self.pool.begin().await?;
                    let bloque = Self::write_bloque(&mut tx, None, style.id, &input).await?;
                    tx.commit().await?;
                    result.creados.push(bloque);
                }
                Err(e) => result.errores.push(item_error(&e)),
            }
        }
        tracing::info!(
            "Bulk bloques for store {}: {} created, {} rejected",
            tienda.id,
            result.creados.len(),
            result.errores.len()
        );
        Ok(result)
    }
}

/// `bloques_bienvenida` must be a list when present
fn bloques_field(body: &Value) -> ServiceResult<Option<&Vec<Value>>> {
    match body.get("bloques_bienvenida") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(ServiceError::field("bloques_bienvenida", "Se esperaba una lista de elementos.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_changes_validate_colors_and_choices() {
        let changes = StyleChanges::from_json(&json!({
            "color_primario": "ff0000",
            "tema": "oscuro",
            "vista_producto": "masonry",
        }))
        .unwrap();
        assert_eq!(changes.color_primario.as_deref(), Some("#ff0000"));
        assert_eq!(changes.tema.as_deref(), Some("oscuro"));
        assert_eq!(changes.color_fondo, None);

        assert!(StyleChanges::from_json(&json!({"color_texto": "#12"})).is_err());
        assert!(StyleChanges::from_json(&json!({"tema": "neon"})).is_err());
        assert!(StyleChanges::from_json(&json!({"tema_plantilla": "retro"})).is_err());
    }

    #[test]
    fn bloques_need_type_and_title() {
        assert!(BloqueInput::from_json(&json!({"titulo": "Hola"}), None).is_err());
        assert!(BloqueInput::from_json(&json!({"tipo": "apilado", "titulo": " "}), None).is_err());
        assert!(BloqueInput::from_json(&json!({"tipo": "vertical", "titulo": "Hola"}), None).is_err());

        let input = BloqueInput::from_json(&json!({"tipo": "en_linea", "titulo": "Hola", "imagen": ""}), None).unwrap();
        assert_eq!(input.imagen, None);
        assert_eq!(input.descripcion, "");
    }

    #[test]
    fn bloque_updates_keep_unsent_fields() {
        let current = BloqueBienvenida {
            id: 1,
            style_id: 2,
            tipo: "apilado".into(),
            titulo: "Antes".into(),
            descripcion: "Texto".into(),
            imagen: Some("bloques/a.png".into()),
        };
        let input = BloqueInput::from_json(&json!({"titulo": "Después"}), Some(&current)).unwrap();
        assert_eq!(input.tipo, "apilado");
        assert_eq!(input.titulo, "Después");
        assert_eq!(input.imagen.as_deref(), Some("bloques/a.png"));
    }

    #[test]
    fn item_errors_are_keyed_by_field() {
        let err = BloqueInput::from_json(&json!({}), None).unwrap_err();
        assert_eq!(item_error(&err), json!({"tipo": ["Este campo es requerido."]}));
    }

    #[test]
    fn bloques_field_must_be_a_list() {
        assert!(bloques_field(&json!({})).unwrap().is_none());
        assert_eq!(bloques_field(&json!({"bloques_bienvenida": []})).unwrap().map(Vec::len), Some(0));
        assert!(bloques_field(&json!({"bloques_bienvenida": "x"})).is_err());
    }
}
