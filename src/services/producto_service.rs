use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;

use crate::database::manager::DatabaseManager;
use crate::database::models::{Categoria, Plan, Producto, Subscription, LOW_STOCK_THRESHOLD};
use crate::database::Repository;
use crate::filter::FilterData;
use crate::services::{opt_decimal, opt_i64, opt_str, required_str, ServiceError, ServiceResult};

const SOFT_DELETE_COLUMN: &str = "eliminado";

/// Validated product fields; `None` leaves a column unchanged
#[derive(Debug, Default)]
pub struct ProductoInput {
    pub nombre: Option<String>,
    pub descripcion: Option<String>,
    pub precio: Option<rust_decimal::Decimal>,
    pub stock: Option<i32>,
    pub categoria_id: Option<Option<i64>>,
    pub imagen: Option<Option<String>>,
}

impl ProductoInput {
    pub fn from_json(body: &Value, creating: bool) -> ServiceResult<Self> {
        let mut input = ProductoInput::default();

        if creating || body.get("nombre").is_some() {
            let nombre = required_str(body, "nombre")?;
            if nombre.chars().count() > 200 {
                return Err(ServiceError::field("nombre", "Asegúrese de que este campo no tenga más de 200 caracteres."));
            }
            input.nombre = Some(nombre);
        }
        if body.get("descripcion").is_some() {
            input.descripcion = Some(opt_str(body, "descripcion").unwrap_or_default());
        }

        input.precio = opt_decimal(body, "precio")?;
        match input.precio {
            Some(precio) if precio.is_sign_negative() => {
                return Err(ServiceError::field("precio", "Asegúrese de que este valor sea mayor o igual a 0."));
            }
            None if creating => return Err(ServiceError::field("precio", "Este campo es requerido.")),
            _ => {}
        }

        if let Some(stock) = body.get("stock").filter(|v| !v.is_null()) {
            let stock = stock
                .as_i64()
                .or_else(|| stock.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| ServiceError::field("stock", "Un número entero válido es requerido."))?;
            if stock < 0 {
                return Err(ServiceError::field("stock", "Asegúrese de que este valor sea mayor o igual a 0."));
            }
            input.stock = Some(i32::try_from(stock).map_err(|_| ServiceError::field("stock", "Valor demasiado grande."))?);
        }

        // Accept both `categoria` and `categoria_id`
        for key in ["categoria", "categoria_id"] {
            if let Some(value) = body.get(key) {
                input.categoria_id = Some(if value.is_null() { None } else { opt_i64(body, key) });
            }
        }
        if let Some(imagen) = body.get("imagen") {
            input.imagen = Some(imagen.as_str().filter(|s| !s.is_empty()).map(str::to_string));
        }
        Ok(input)
    }
}

pub struct ProductoService {
    pool: PgPool,
}

impl ProductoService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn repository(&self, tienda_id: i64, include_deleted: bool) -> Repository<Producto> {
        Repository::new("productos", self.pool.clone())
            .scoped("tienda_id", tienda_id)
            .with_soft_delete(SOFT_DELETE_COLUMN, include_deleted)
    }

    /// Products of a store, newest first; deleted ones only on request
    pub async fn list(&self, tienda_id: i64, include_deleted: bool, where_clause: Option<Value>) -> ServiceResult<Vec<Producto>> {
        let productos = self
            .repository(tienda_id, include_deleted)
            .select_any(FilterData {
                where_clause,
                order: Some(json!("-fecha_creacion")),
                ..Default::default()
            })
            .await?;
        self.with_category_names(productos).await
    }

    pub async fn low_stock(&self, tienda_id: i64) -> ServiceResult<Vec<Producto>> {
        let where_clause = json!({ "stock": { "$lt": LOW_STOCK_THRESHOLD } });
        self.list(tienda_id, false, Some(where_clause)).await
    }

    pub async fn get(&self, tienda_id: i64, id: i64, include_deleted: bool) -> ServiceResult<Producto> {
        let producto = self
            .repository(tienda_id, include_deleted)
            .select_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("No encontrado."))?;
        let mut named = self.with_category_names(vec![producto]).await?;
        named.pop().ok_or_else(|| ServiceError::not_found("No encontrado."))
    }

    pub async fn count(&self, tienda_id: i64) -> ServiceResult<i64> {
        Ok(self.repository(tienda_id, false).count(FilterData::default()).await?)
    }

    pub async fn create(&self, tienda_id: i64, tenant_id: i64, body: &Value) -> ServiceResult<Producto> {
        let input = ProductoInput::from_json(body, true)?;
        if let Some(Some(categoria_id)) = input.categoria_id {
            self.check_category(tienda_id, categoria_id).await?;
        }

        let mut tx = self.pool.begin().await?;
        Self::reserve_product_slot(&mut tx, tenant_id).await?;
        let producto = sqlx::query_as::<_, Producto>(
            r#"
            INSERT INTO productos (tienda_id, nombre, descripcion, precio, stock, categoria_id, imagen)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(tienda_id)
        .bind(input.nombre.unwrap_or_default())
        .bind(input.descripcion.unwrap_or_default())
        .bind(input.precio.unwrap_or_default())
        .bind(input.stock.unwrap_or(0))
        .bind(input.categoria_id.flatten())
        .bind(input.imagen.flatten())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!("Product {} created in store {}", producto.id, tienda_id);
        self.get(tienda_id, producto.id, false).await
    }

    pub async fn update(&self, tienda_id: i64, id: i64, body: &Value) -> ServiceResult<Producto> {
        let existing = self.get(tienda_id, id, false).await?;
        let input = ProductoInput::from_json(body, false)?;
        if let Some(Some(categoria_id)) = input.categoria_id {
            self.check_category(tienda_id, categoria_id).await?;
        }
        let (categoria_set, categoria_id) = split_change(input.categoria_id);
        let (imagen_set, imagen) = split_change(input.imagen);

        sqlx::query(
            r#"
            UPDATE productos SET
                nombre = COALESCE($2, nombre),
                descripcion = COALESCE($3, descripcion),
                precio = COALESCE($4, precio),
                stock = COALESCE($5, stock),
                categoria_id = CASE WHEN $6 THEN $7 ELSE categoria_id END,
                imagen = CASE WHEN $8 THEN $9 ELSE imagen END,
                fecha_actualizacion = NOW()
            WHERE id = $1
            "#,
        )
        .bind(existing.id)
        .bind(input.nombre)
        .bind(input.descripcion)
        .bind(input.precio)
        .bind(input.stock)
        .bind(categoria_set)
        .bind(categoria_id)
        .bind(imagen_set)
        .bind(imagen)
        .execute(&self.pool)
        .await?;

        self.get(tienda_id, id, false).await
    }

    /// Soft delete; order lines keep the product name first
    pub async fn delete(&self, tienda_id: i64, tenant_id: i64, id: i64) -> ServiceResult<()> {
        let producto = self.get(tienda_id, id, false).await?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE detalles_pedido SET nombre_producto = $2 WHERE producto_id = $1 AND nombre_producto = ''")
            .bind(producto.id)
            .bind(&producto.nombre)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE productos SET eliminado = true, fecha_actualizacion = NOW() WHERE id = $1")
            .bind(producto.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE subscriptions SET products_count = GREATEST(products_count - 1, 0), updated_at = NOW() WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!("Product {} soft-deleted", producto.id);
        Ok(())
    }

    /// Checks the plan limit and counts the new product under a row lock
    /// on the tenant's subscription, so concurrent creates queue up.
    /// Tenants without a subscription are not limited.
    async fn reserve_product_slot(tx: &mut Transaction<'_, Postgres>, tenant_id: i64) -> ServiceResult<()> {
        let subscription =
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE tenant_id = $1 FOR UPDATE")
                .bind(tenant_id)
                .fetch_optional(&mut **tx)
                .await?;
        let Some(subscription) = subscription else {
            return Ok(());
        };
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(subscription.plan_id)
            .fetch_one(&mut **tx)
            .await?;
        if !subscription.can_add_product(&plan) {
            tracing::warn!("Tenant {} reached the product limit of plan '{}'", tenant_id, plan.name);
            return Err(ServiceError::PaymentRequired("Has alcanzado el límite de productos de tu plan".to_string()));
        }
        sqlx::query("UPDATE subscriptions SET products_count = products_count + 1, updated_at = NOW() WHERE id = $1")
            .bind(subscription.id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn check_category(&self, tienda_id: i64, categoria_id: i64) -> ServiceResult<()> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM categorias WHERE id = $1 AND tienda_id = $2)")
            .bind(categoria_id)
            .bind(tienda_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists.0 {
            return Err(ServiceError::field(
                "categoria",
                format!("Clave primaria \"{}\" inválida - objeto no existe.", categoria_id),
            ));
        }
        Ok(())
    }

    async fn with_category_names(&self, mut productos: Vec<Producto>) -> ServiceResult<Vec<Producto>> {
        let ids: Vec<i64> = productos.iter().filter_map(|p| p.categoria_id).collect();
        if ids.is_empty() {
            return Ok(productos);
        }
        let names: HashMap<i64, String> = sqlx::query_as::<_, (i64, String)>("SELECT id, nombre FROM categorias WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();
        for producto in productos.iter_mut() {
            producto.categoria_nombre = producto.categoria_id.and_then(|id| names.get(&id).cloned());
        }
        Ok(productos)
    }
}

fn split_change<T>(change: Option<Option<T>>) -> (bool, Option<T>) {
    match change {
        Some(value) => (true, value),
        None => (false, None),
    }
}

/// Store-level categories
pub struct CategoriaService {
    pool: PgPool,
}

impl CategoriaService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, tienda_id: i64) -> ServiceResult<Vec<Categoria>> {
        let categorias = Repository::<Categoria>::new("categorias", self.pool.clone())
            .scoped("tienda_id", tienda_id)
            .select_any(FilterData {
                order: Some(json!("nombre")),
                ..Default::default()
            })
            .await?;
        Ok(categorias)
    }

    pub async fn get(&self, tienda_id: i64, id: i64) -> ServiceResult<Categoria> {
        Repository::<Categoria>::new("categorias", self.pool.clone())
            .scoped("tienda_id", tienda_id)
            .select_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("No encontrado."))
    }

    pub async fn create(&self, tienda_id: i64, body: &Value) -> ServiceResult<Categoria> {
        let nombre = required_str(body, "nombre")?;
        let categoria = sqlx::query_as::<_, Categoria>(
            "INSERT INTO categorias (tienda_id, nombre, descripcion, imagen) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(tienda_id)
        .bind(nombre)
        .bind(opt_str(body, "descripcion").unwrap_or_default())
        .bind(opt_str(body, "imagen").filter(|s| !s.is_empty()))
        .fetch_one(&self.pool)
        .await?;
        Ok(categoria)
    }

    pub async fn update(&self, tienda_id: i64, id: i64, body: &Value) -> ServiceResult<Categoria> {
        let existing = self.get(tienda_id, id).await?;
        let nombre = match body.get("nombre") {
            Some(_) => Some(required_str(body, "nombre")?),
            None => None,
        };
        let (imagen_set, imagen) = match body.get("imagen") {
            Some(v) => (true, v.as_str().filter(|s| !s.is_empty()).map(str::to_string)),
            None => (false, None),
        };
        let categoria = sqlx::query_as::<_, Categoria>(
            r#"
            UPDATE categorias SET
                nombre = COALESCE($2, nombre),
                descripcion = COALESCE($3, descripcion),
                imagen = CASE WHEN $4 THEN $5 ELSE imagen END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(existing.id)
        .bind(nombre)
        .bind(opt_str(body, "descripcion"))
        .bind(imagen_set)
        .bind(imagen)
        .fetch_one(&self.pool)
        .await?;
        Ok(categoria)
    }

    pub async fn delete(&self, tienda_id: i64, id: i64) -> ServiceResult<()> {
        let existing = self.get(tienda_id, id).await?;
        sqlx::query("DELETE FROM categorias WHERE id = $1")
            .bind(existing.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_name_and_price() {
        assert!(ProductoInput::from_json(&json!({"precio": 10}), true).is_err());
        assert!(ProductoInput::from_json(&json!({"nombre": "Taza"}), true).is_err());
        let input = ProductoInput::from_json(&json!({"nombre": "Taza", "precio": "12.50", "stock": 3}), true).unwrap();
        assert_eq!(input.precio.unwrap().to_string(), "12.50");
        assert_eq!(input.stock, Some(3));
        assert!(input.categoria_id.is_none());
    }

    #[test]
    fn negative_stock_is_rejected() {
        let err = ProductoInput::from_json(&json!({"stock": -1}), false).unwrap_err();
        assert!(matches!(err, ServiceError::FieldValidation { ref field, .. } if field == "stock"));
    }

    #[test]
    fn category_can_be_cleared() {
        let input = ProductoInput::from_json(&json!({"categoria": null}), false).unwrap();
        assert_eq!(input.categoria_id, Some(None));
        let input = ProductoInput::from_json(&json!({"categoria": "4"}), false).unwrap();
        assert_eq!(input.categoria_id, Some(Some(4)));
    }

    #[test]
    fn partial_updates_leave_fields_alone() {
        let input = ProductoInput::from_json(&json!({"stock": 8}), false).unwrap();
        assert!(input.nombre.is_none());
        assert!(input.precio.is_none());
        assert!(input.imagen.is_none());
    }
}
