use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::{self, Claims};
use crate::database::manager::DatabaseManager;
use crate::database::models::{
    metodo_pago_publico_display, subtotal, DetallePedidoPublico, EstadoPedido, PedidoPublico, StorefrontUser, Tienda,
};
use crate::observer::{self, Signal};
use crate::services::{opt_decimal, opt_i64, opt_str, required_str, ServiceError, ServiceResult};

#[derive(Debug, Serialize)]
pub struct StorefrontLogin {
    pub message: &'static str,
    pub email: String,
    pub slug: String,
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct PedidoPublicoView {
    #[serde(flatten)]
    pub pedido: PedidoPublico,
    pub detalles: Vec<DetallePedidoPublico>,
    pub cliente_nombre: String,
    pub direccion_entrega: String,
    pub fecha_creacion: String,
    pub metodo_pago_display: String,
}

impl PedidoPublicoView {
    fn new(pedido: PedidoPublico, detalles: Vec<DetallePedidoPublico>) -> Self {
        Self {
            cliente_nombre: format!("{} {}", pedido.nombre, pedido.apellido).trim().to_string(),
            direccion_entrega: pedido.direccion.clone(),
            fecha_creacion: pedido.fecha.format("%Y-%m-%d %H:%M:%S").to_string(),
            metodo_pago_display: metodo_pago_publico_display(&pedido.metodo_pago.to_lowercase()),
            detalles,
            pedido,
        }
    }
}

#[derive(Debug)]
struct LineaPublica {
    nombre_producto: String,
    cantidad: i32,
    precio_unitario: Decimal,
}

impl LineaPublica {
    fn subtotal(&self) -> Decimal {
        subtotal(self.cantidad, self.precio_unitario)
    }
}

fn parse_lineas(body: &Value) -> ServiceResult<Vec<LineaPublica>> {
    let detalles = body
        .get("detalles")
        .and_then(Value::as_array)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ServiceError::field("detalles", "La compra debe incluir al menos un producto."))?;
    detalles
        .iter()
        .map(|linea| {
            let nombre_producto = required_str(linea, "nombre_producto")?;
            let cantidad = opt_i64(linea, "cantidad").unwrap_or(1);
            if cantidad < 1 {
                return Err(ServiceError::field("cantidad", "La cantidad debe ser al menos 1."));
            }
            let precio_unitario = opt_decimal(linea, "precio_unitario")?
                .ok_or_else(|| ServiceError::field("precio_unitario", "Este campo es requerido."))?;
            Ok(LineaPublica {
                nombre_producto,
                cantidad: i32::try_from(cantidad).map_err(|_| ServiceError::field("cantidad", "Cantidad inválida."))?,
                precio_unitario,
            })
        })
        .collect()
}

pub struct StorefrontService {
    pool: PgPool,
}

impl StorefrontService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn store_by_slug(&self, slug: &str) -> ServiceResult<Option<Tienda>> {
        let tienda = sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tienda)
    }

    pub async fn find_active(&self, id: i64) -> ServiceResult<StorefrontUser> {
        let customer = sqlx::query_as::<_, StorefrontUser>("SELECT * FROM users_tienda_publica WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match customer {
            Some(customer) if customer.is_active => Ok(customer),
            _ => Err(ServiceError::Unauthorized("Usuario inactivo o no encontrado".to_string())),
        }
    }

    // Customer accounts

    pub async fn register(&self, body: &Value) -> ServiceResult<StorefrontUser> {
        let email = required_str(body, "email")?;
        let password = required_str(body, "password")?;
        let slug = opt_str(body, "tienda_slug").unwrap_or_default();
        let tienda = self
            .store_by_slug(&slug)
            .await?
            .ok_or_else(|| ServiceError::validation("La tienda especificada no existe."))?;

        let (taken,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM users_tienda_publica WHERE LOWER(email) = LOWER($1) AND tienda_id = $2)",
        )
        .bind(&email)
        .bind(tienda.id)
        .fetch_one(&self.pool)
        .await?;
        if taken {
            return Err(ServiceError::validation("Este correo ya está registrado en esta tienda."));
        }

        let customer = sqlx::query_as::<_, StorefrontUser>(
            r#"
            INSERT INTO users_tienda_publica (email, first_name, last_name, password, tienda_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&email)
        .bind(opt_str(body, "first_name").unwrap_or_default())
        .bind(opt_str(body, "last_name").unwrap_or_default())
        .bind(hash_password(&password)?)
        .bind(tienda.id)
        .fetch_one(&self.pool)
        .await?;

        let result = observer::dispatch(Signal::StorefrontUserCreated(customer.clone()), self.pool.clone()).await;
        for error in result.errors {
            tracing::warn!("Observer failed for storefront user {}: {}", customer.id, error);
        }
        tracing::info!("Storefront customer {} registered at '{}'", customer.id, tienda.slug);
        Ok(customer)
    }

    pub async fn login(&self, body: &Value) -> ServiceResult<StorefrontLogin> {
        let slug = opt_str(body, "slug").unwrap_or_default();
        let email = opt_str(body, "email").unwrap_or_default();
        let password = opt_str(body, "password").unwrap_or_default();

        let tienda = self
            .store_by_slug(&slug)
            .await?
            .ok_or_else(|| ServiceError::not_found("Tienda no encontrada"))?;
        let customer = sqlx::query_as::<_, StorefrontUser>(
            "SELECT * FROM users_tienda_publica WHERE LOWER(email) = LOWER($1) AND tienda_id = $2",
        )
        .bind(&email)
        .bind(tienda.id)
        .fetch_optional(&self.pool)
        .await?
        .filter(|c| c.is_active)
        .ok_or_else(|| ServiceError::not_found("Usuario no registrado en esta tienda"))?;

        if !verify_password(&password, &customer.password) {
            tracing::warn!("Wrong storefront password for customer {}", customer.id);
            return Err(ServiceError::validation("Contraseña incorrecta"));
        }

        Ok(StorefrontLogin {
            message: "Login exitoso",
            token: auth::generate_jwt(&Claims::storefront(&customer))?,
            email: customer.email,
            slug: tienda.slug,
            user_id: customer.id,
        })
    }

    /// Customers only ever see their own profile
    pub async fn profile(&self, caller: &StorefrontUser, id: i64) -> ServiceResult<StorefrontUser> {
        if caller.id != id {
            return Err(ServiceError::forbidden("No tienes permiso para acceder a este perfil"));
        }
        self.find_active(id).await
    }

    pub async fn update_profile(&self, caller: &StorefrontUser, id: i64, body: &Value) -> ServiceResult<StorefrontUser> {
        let current = self.profile(caller, id).await?;
        let password = match opt_str(body, "password").filter(|p| !p.is_empty()) {
            Some(password) => Some(hash_password(&password)?),
            None => None,
        };
        let email = opt_str(body, "email").map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        if let Some(email) = &email {
            let (taken,): (bool,) = sqlx::query_as(
                "SELECT EXISTS (SELECT 1 FROM users_tienda_publica WHERE LOWER(email) = LOWER($1) AND tienda_id = $2 AND id <> $3)",
            )
            .bind(email)
            .bind(current.tienda_id)
            .bind(current.id)
            .fetch_one(&self.pool)
            .await?;
            if taken {
                return Err(ServiceError::validation("Este correo ya está registrado en esta tienda."));
            }
        }

        let customer = sqlx::query_as::<_, StorefrontUser>(
            r#"
            UPDATE users_tienda_publica SET
                email = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                password = COALESCE($5, password)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(current.id)
        .bind(email)
        .bind(opt_str(body, "first_name"))
        .bind(opt_str(body, "last_name"))
        .bind(password)
        .fetch_one(&self.pool)
        .await?;
        Ok(customer)
    }

    // Checkout

    /// Stores the public order and mirrors it as an internal order whose
    /// lines point at live products of the same name. Returns the
    /// internal order id.
    pub async fn save_purchase(&self, caller: &StorefrontUser, body: &Value) -> ServiceResult<i64> {
        let slug = opt_str(body, "slug")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::validation("No se pudo determinar la tienda"))?;
        let tienda = self
            .store_by_slug(&slug)
            .await?
            .ok_or_else(|| ServiceError::not_found("Tienda no encontrada"))?;
        let usuario_id = opt_i64(body, "usuario").ok_or_else(|| ServiceError::validation("Usuario no proporcionado"))?;
        let customer = sqlx::query_as::<_, StorefrontUser>("SELECT * FROM users_tienda_publica WHERE id = $1")
            .bind(usuario_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Usuario de tienda pública no encontrado"))?;
        if customer.id != caller.id {
            return Err(ServiceError::forbidden("No tienes permiso para realizar esta compra"));
        }

        let lineas = parse_lineas(body)?;
        let total: Decimal = lineas.iter().map(LineaPublica::subtotal).sum();
        let text = |key: &str| opt_str(body, key).unwrap_or_default();

        let mut tx = self.pool.begin().await?;
        let pedido_publico = sqlx::query_as::<_, PedidoPublico>(
            r#"
            INSERT INTO pedidos_publicos (usuario_id, tienda_id, nombre, apellido, ci, ciudad, provincia, direccion,
                                          referencia, telefono, correo, notas, metodo_pago, total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(customer.id)
        .bind(tienda.id)
        .bind(text("nombre"))
        .bind(text("apellido"))
        .bind(text("ci"))
        .bind(text("ciudad"))
        .bind(text("provincia"))
        .bind(text("direccion"))
        .bind(text("referencia"))
        .bind(text("telefono"))
        .bind(opt_str(body, "correo").filter(|c| !c.is_empty()).unwrap_or_else(|| customer.email.clone()))
        .bind(text("notas"))
        .bind(text("metodo_pago"))
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;

        let (pedido_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO pedidos (tienda_id, cliente_tienda_publica_id, total, direccion_entrega, telefono, metodo_pago, notas)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(tienda.id)
        .bind(customer.id)
        .bind(total)
        .bind(&pedido_publico.direccion)
        .bind(&pedido_publico.telefono)
        .bind(&pedido_publico.metodo_pago)
        .bind(&pedido_publico.notas)
        .fetch_one(&mut *tx)
        .await?;

        let live: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
            "SELECT nombre, MIN(id) FROM productos WHERE tienda_id = $1 AND eliminado = false GROUP BY nombre",
        )
        .bind(tienda.id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        for linea in &lineas {
            sqlx::query(
                r#"
                INSERT INTO detalles_pedido_publico (pedido_id, nombre_producto, cantidad, precio_unitario, subtotal)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(pedido_publico.id)
            .bind(&linea.nombre_producto)
            .bind(linea.cantidad)
            .bind(linea.precio_unitario)
            .bind(linea.subtotal())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO detalles_pedido (pedido_id, producto_id, nombre_producto, cantidad, precio_unitario, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(pedido_id)
            .bind(live.get(&linea.nombre_producto).copied())
            .bind(&linea.nombre_producto)
            .bind(linea.cantidad)
            .bind(linea.precio_unitario)
            .bind(linea.subtotal())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        let result = observer::dispatch(Signal::PublicOrderCreated(pedido_publico.clone()), self.pool.clone()).await;
        for error in result.errors {
            tracing::warn!("Observer failed for public order {}: {}", pedido_publico.id, error);
        }
        tracing::info!(
            "Public order {} saved for store '{}' (internal order {}, total {})",
            pedido_publico.id,
            tienda.slug,
            pedido_id,
            total
        );
        Ok(pedido_id)
    }

    pub async fn my_orders(&self, caller: &StorefrontUser) -> ServiceResult<Vec<PedidoPublicoView>> {
        let pedidos = sqlx::query_as::<_, PedidoPublico>(
            "SELECT * FROM pedidos_publicos WHERE usuario_id = $1 AND tienda_id = $2 ORDER BY fecha DESC",
        )
        .bind(caller.id)
        .bind(caller.tienda_id)
        .fetch_all(&self.pool)
        .await?;
        self.present(pedidos).await
    }

    // Staff side

    pub async fn store_orders(&self, tienda_id: i64) -> ServiceResult<Vec<PedidoPublicoView>> {
        let pedidos = sqlx::query_as::<_, PedidoPublico>(
            "SELECT * FROM pedidos_publicos WHERE tienda_id = $1 ORDER BY fecha DESC",
        )
        .bind(tienda_id)
        .fetch_all(&self.pool)
        .await?;
        self.present(pedidos).await
    }

    /// Same as `store_orders`, but a store without products has none to show
    pub async fn orders_by_store(&self, tienda_id: i64) -> ServiceResult<Vec<PedidoPublicoView>> {
        let (has_products,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM productos WHERE tienda_id = $1)")
            .bind(tienda_id)
            .fetch_one(&self.pool)
            .await?;
        if !has_products {
            return Ok(vec![]);
        }
        self.store_orders(tienda_id).await
    }

    async fn find_order(&self, id: i64) -> ServiceResult<PedidoPublico> {
        sqlx::query_as::<_, PedidoPublico>("SELECT * FROM pedidos_publicos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Pedido no encontrado"))
    }

    async fn store_order(&self, tienda_id: i64, id: i64) -> ServiceResult<PedidoPublico> {
        let pedido = self.find_order(id).await?;
        if pedido.tienda_id != tienda_id {
            return Err(ServiceError::not_found("Pedido no encontrado"));
        }
        Ok(pedido)
    }

    pub async fn store_order_view(&self, tienda_id: i64, id: i64) -> ServiceResult<PedidoPublicoView> {
        let pedido = self.store_order(tienda_id, id).await?;
        self.present_one(pedido).await
    }

    pub async fn update_status(&self, tienda_id: i64, id: i64, estado: Option<&str>) -> ServiceResult<PedidoPublicoView> {
        let pedido = self.store_order(tienda_id, id).await?;
        let estado = estado
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ServiceError::validation("Estado no proporcionado"))?;
        let estado = EstadoPedido::parse(estado)
            .ok_or_else(|| ServiceError::field("estado", format!("\"{}\" no es una elección válida.", estado)))?;

        let pedido = sqlx::query_as::<_, PedidoPublico>(
            "UPDATE pedidos_publicos SET estado = $2 WHERE id = $1 RETURNING *",
        )
        .bind(pedido.id)
        .bind(estado.as_str())
        .fetch_one(&self.pool)
        .await?;
        tracing::info!("Public order {} moved to {}", pedido.id, estado);
        self.present_one(pedido).await
    }

    pub async fn add_tracking_code(&self, tienda_id: i64, id: i64, codigo: Option<&str>) -> ServiceResult<()> {
        let pedido = self.find_order(id).await?;
        if pedido.tienda_id != tienda_id {
            return Err(ServiceError::forbidden("Este pedido no pertenece a esta tienda"));
        }
        let codigo = codigo
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::validation("Código vacío"))?;
        sqlx::query("UPDATE pedidos_publicos SET codigo_seguimiento = $2 WHERE id = $1")
            .bind(pedido.id)
            .bind(codigo)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn present_one(&self, pedido: PedidoPublico) -> ServiceResult<PedidoPublicoView> {
        self.present(vec![pedido])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::Internal("public order vanished while loading".to_string()))
    }

    async fn present(&self, pedidos: Vec<PedidoPublico>) -> ServiceResult<Vec<PedidoPublicoView>> {
        let ids: Vec<i64> = pedidos.iter().map(|p| p.id).collect();
        let mut by_order: HashMap<i64, Vec<DetallePedidoPublico>> = HashMap::new();
        if !ids.is_empty() {
            let detalles = sqlx::query_as::<_, DetallePedidoPublico>(
                "SELECT * FROM detalles_pedido_publico WHERE pedido_id = ANY($1) ORDER BY id",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
            for detalle in detalles {
                by_order.entry(detalle.pedido_id).or_default().push(detalle);
            }
        }
        Ok(pedidos
            .into_iter()
            .map(|pedido| {
                let detalles = by_order.remove(&pedido.id).unwrap_or_default();
                PedidoPublicoView::new(pedido, detalles)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn lines_need_name_and_price() {
        let lineas = parse_lineas(&json!({"detalles": [
            {"nombre_producto": "Taza", "cantidad": 2, "precio_unitario": "10.00"}
        ]}))
        .unwrap();
        assert_eq!(lineas[0].subtotal(), Decimal::new(2000, 2));

        assert!(parse_lineas(&json!({"detalles": []})).is_err());
        assert!(parse_lineas(&json!({"detalles": [{"cantidad": 1, "precio_unitario": 1}]})).is_err());
        assert!(parse_lineas(&json!({"detalles": [{"nombre_producto": "Taza"}]})).is_err());
    }

    #[test]
    fn view_derives_display_fields() {
        let pedido = PedidoPublico {
            id: 1,
            usuario_id: 2,
            tienda_id: 3,
            nombre: "Ana".into(),
            apellido: "Rojas".into(),
            ci: String::new(),
            ciudad: String::new(),
            provincia: String::new(),
            direccion: "Calle 1".into(),
            referencia: String::new(),
            telefono: String::new(),
            correo: "ana@example.com".into(),
            notas: String::new(),
            metodo_pago: "QR".into(),
            total: Decimal::from(5),
            fecha: Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap(),
            estado: "pendiente".into(),
            codigo_seguimiento: None,
        };
        let view = PedidoPublicoView::new(pedido, vec![]);
        assert_eq!(view.cliente_nombre, "Ana Rojas");
        assert_eq!(view.direccion_entrega, "Calle 1");
        assert_eq!(view.fecha_creacion, "2024-06-01 09:30:00");
        assert_eq!(view.metodo_pago_display, "Pago con QR");
    }
}
