use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::database::manager::DatabaseManager;
use crate::database::models::{
    subtotal, DetallePedido, EstadoPedido, MetodoPago, NotificacionPedido, Pedido, Producto,
};
use crate::services::{check_choice, opt_decimal, opt_i64, opt_str, ServiceError, ServiceResult};

pub const PRODUCTO_NO_DISPONIBLE: &str = "Producto no disponible";

#[derive(Debug, Serialize)]
pub struct DetalleView {
    #[serde(flatten)]
    pub detalle: DetallePedido,
    pub producto_nombre: String,
    pub producto_imagen: Option<String>,
    pub producto_eliminado: bool,
}

#[derive(Debug, Serialize)]
pub struct PedidoView {
    #[serde(flatten)]
    pub pedido: Pedido,
    pub detalles: Vec<DetalleView>,
    pub cliente_nombre: String,
    pub estado_display: String,
    pub metodo_pago_display: String,
    pub tienda_nombre: String,
}

/// Name shown for an order line: the live product name while the product
/// exists, else the name stored on the line.
pub fn line_product_name(stored: &str, producto: Option<&Producto>) -> (String, bool) {
    match producto {
        Some(p) if !p.eliminado => (p.nombre.clone(), false),
        _ if !stored.is_empty() => (stored.to_string(), true),
        _ => (PRODUCTO_NO_DISPONIBLE.to_string(), true),
    }
}

pub fn line_product_image(producto: Option<&Producto>) -> Option<String> {
    producto.filter(|p| !p.eliminado).and_then(|p| p.imagen.clone())
}

#[derive(Debug)]
struct LineaInput {
    producto_id: i64,
    cantidad: i32,
    precio_unitario: Option<Decimal>,
}

fn parse_lineas(body: &Value) -> ServiceResult<Vec<LineaInput>> {
    let detalles = body
        .get("detalles")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::field("detalles", "Este campo es requerido."))?;
    if detalles.is_empty() {
        return Err(ServiceError::field("detalles", "El pedido debe tener al menos un producto."));
    }
    detalles
        .iter()
        .map(|linea| {
            let producto_id = opt_i64(linea, "producto")
                .or_else(|| opt_i64(linea, "producto_id"))
                .ok_or_else(|| ServiceError::field("detalles", "Cada detalle requiere un producto."))?;
            let cantidad = opt_i64(linea, "cantidad").unwrap_or(1);
            if cantidad < 1 {
                return Err(ServiceError::field("detalles", "La cantidad debe ser al menos 1."));
            }
            Ok(LineaInput {
                producto_id,
                cantidad: i32::try_from(cantidad).map_err(|_| ServiceError::field("detalles", "Cantidad inválida."))?,
                precio_unitario: opt_decimal(linea, "precio_unitario")?,
            })
        })
        .collect()
}

pub struct PedidoService {
    pool: PgPool,
}

impl PedidoService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Orders of the store when given, otherwise the caller's own orders
    pub async fn list(&self, tienda_id: Option<i64>, user_id: i64) -> ServiceResult<Vec<PedidoView>> {
        let pedidos = match tienda_id {
            Some(tienda_id) => {
                sqlx::query_as::<_, Pedido>("SELECT * FROM pedidos WHERE tienda_id = $1 ORDER BY fecha_creacion DESC")
                    .bind(tienda_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, Pedido>("SELECT * FROM pedidos WHERE cliente_id = $1 ORDER BY fecha_creacion DESC")
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        self.present(pedidos).await
    }

    async fn find(&self, tienda_id: Option<i64>, user_id: i64, id: i64) -> ServiceResult<Pedido> {
        sqlx::query_as::<_, Pedido>(
            "SELECT * FROM pedidos WHERE id = $1 AND (tienda_id = $2 OR ($2 IS NULL AND cliente_id = $3))",
        )
        .bind(id)
        .bind(tienda_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("No encontrado."))
    }

    pub async fn get(&self, tienda_id: Option<i64>, user_id: i64, id: i64) -> ServiceResult<PedidoView> {
        let pedido = self.find(tienda_id, user_id, id).await?;
        self.present_one(pedido).await
    }

    pub async fn create(&self, tienda_id: i64, user_id: i64, body: &Value) -> ServiceResult<PedidoView> {
        let lineas = parse_lineas(body)?;
        let metodo_pago = opt_str(body, "metodo_pago").unwrap_or_else(|| MetodoPago::Efectivo.as_str().to_string());
        check_choice("metodo_pago", &metodo_pago, &MetodoPago::values())?;
        let cliente_id = opt_i64(body, "cliente").unwrap_or(user_id);

        let ids: Vec<i64> = lineas.iter().map(|l| l.producto_id).collect();
        let productos: HashMap<i64, Producto> = sqlx::query_as::<_, Producto>(
            "SELECT * FROM productos WHERE id = ANY($1) AND tienda_id = $2 AND eliminado = false",
        )
        .bind(&ids)
        .bind(tienda_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

        let mut tx = self.pool.begin().await?;
        let pedido = sqlx::query_as::<_, Pedido>(
            r#"
            INSERT INTO pedidos (tienda_id, cliente_id, direccion_entrega, telefono, metodo_pago, notas)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(tienda_id)
        .bind(cliente_id)
        .bind(opt_str(body, "direccion_entrega").unwrap_or_default())
        .bind(opt_str(body, "telefono").unwrap_or_default())
        .bind(&metodo_pago)
        .bind(opt_str(body, "notas").unwrap_or_default())
        .fetch_one(&mut *tx)
        .await?;

        let mut total = Decimal::ZERO;
        for linea in &lineas {
            let producto = productos.get(&linea.producto_id).ok_or_else(|| {
                ServiceError::field(
                    "detalles",
                    format!("Clave primaria \"{}\" inválida - objeto no existe.", linea.producto_id),
                )
            })?;
            let precio = linea.precio_unitario.unwrap_or(producto.precio);
            let line_total = subtotal(linea.cantidad, precio);
            total += line_total;

            sqlx::query(
                r#"
                INSERT INTO detalles_pedido (pedido_id, producto_id, nombre_producto, cantidad, precio_unitario, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(pedido.id)
            .bind(producto.id)
            .bind(&producto.nombre)
            .bind(linea.cantidad)
            .bind(precio)
            .bind(line_total)
            .execute(&mut *tx)
            .await?;
        }

        let pedido = sqlx::query_as::<_, Pedido>("UPDATE pedidos SET total = $2 WHERE id = $1 RETURNING *")
            .bind(pedido.id)
            .bind(total)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Order {} created in store {} (total {})", pedido.id, tienda_id, pedido.total);
        self.present_one(pedido).await
    }

    /// Editable order fields; lines and total are fixed once created
    pub async fn update(&self, tienda_id: Option<i64>, user_id: i64, id: i64, body: &Value) -> ServiceResult<PedidoView> {
        let pedido = self.find(tienda_id, user_id, id).await?;
        let estado = opt_str(body, "estado");
        if let Some(estado) = &estado {
            check_choice("estado", estado, &EstadoPedido::values())?;
        }
        let metodo_pago = opt_str(body, "metodo_pago");
        if let Some(metodo) = &metodo_pago {
            check_choice("metodo_pago", metodo, &MetodoPago::values())?;
        }

        let pedido = sqlx::query_as::<_, Pedido>(
            r#"
            UPDATE pedidos SET
                estado = COALESCE($2, estado),
                direccion_entrega = COALESCE($3, direccion_entrega),
                telefono = COALESCE($4, telefono),
                metodo_pago = COALESCE($5, metodo_pago),
                notas = COALESCE($6, notas),
                fecha_actualizacion = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(pedido.id)
        .bind(estado)
        .bind(opt_str(body, "direccion_entrega"))
        .bind(opt_str(body, "telefono"))
        .bind(metodo_pago)
        .bind(opt_str(body, "notas"))
        .fetch_one(&self.pool)
        .await?;
        self.present_one(pedido).await
    }

    pub async fn delete(&self, tienda_id: Option<i64>, user_id: i64, id: i64) -> ServiceResult<()> {
        let pedido = self.find(tienda_id, user_id, id).await?;
        sqlx::query("DELETE FROM pedidos WHERE id = $1")
            .bind(pedido.id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Order {} deleted", pedido.id);
        Ok(())
    }

    pub async fn update_status(&self, tienda_id: Option<i64>, user_id: i64, id: i64, estado: Option<&str>) -> ServiceResult<PedidoView> {
        let pedido = self.find(tienda_id, user_id, id).await?;
        let estado = estado
            .and_then(EstadoPedido::parse)
            .ok_or_else(|| ServiceError::validation("Estado no válido"))?;

        let mut tx = self.pool.begin().await?;
        let pedido = sqlx::query_as::<_, Pedido>(
            "UPDATE pedidos SET estado = $2, fecha_actualizacion = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(pedido.id)
        .bind(estado.as_str())
        .fetch_one(&mut *tx)
        .await?;
        Self::notify(
            &mut tx,
            pedido.id,
            &format!("El estado de tu pedido ha sido actualizado a: {}", estado.label()),
        )
        .await?;
        tx.commit().await?;

        tracing::info!("Order {} moved to {}", pedido.id, estado);
        self.present_one(pedido).await
    }

    pub async fn add_tracking_code(&self, tienda_id: Option<i64>, user_id: i64, id: i64, codigo: Option<&str>) -> ServiceResult<PedidoView> {
        let pedido = self.find(tienda_id, user_id, id).await?;
        let codigo = codigo
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::validation("Código de seguimiento requerido"))?;

        let mut tx = self.pool.begin().await?;
        let pedido = sqlx::query_as::<_, Pedido>(
            "UPDATE pedidos SET codigo_seguimiento = $2, fecha_actualizacion = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(pedido.id)
        .bind(codigo)
        .fetch_one(&mut *tx)
        .await?;
        Self::notify(
            &mut tx,
            pedido.id,
            &format!("Se ha agregado un código de seguimiento a tu pedido: {}", codigo),
        )
        .await?;
        tx.commit().await?;
        self.present_one(pedido).await
    }

    async fn notify(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, pedido_id: i64, mensaje: &str) -> ServiceResult<()> {
        sqlx::query("INSERT INTO notificaciones_pedido (pedido_id, mensaje) VALUES ($1, $2)")
            .bind(pedido_id)
            .bind(mensaje)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    // Notifications of orders placed by the caller

    pub async fn notifications(&self, user_id: i64) -> ServiceResult<Vec<NotificacionPedido>> {
        let notificaciones = sqlx::query_as::<_, NotificacionPedido>(
            r#"
            SELECT n.* FROM notificaciones_pedido n
            JOIN pedidos p ON p.id = n.pedido_id
            WHERE p.cliente_id = $1
            ORDER BY n.fecha DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notificaciones)
    }

    pub async fn notification(&self, user_id: i64, id: i64) -> ServiceResult<NotificacionPedido> {
        sqlx::query_as::<_, NotificacionPedido>(
            r#"
            SELECT n.* FROM notificaciones_pedido n
            JOIN pedidos p ON p.id = n.pedido_id
            WHERE n.id = $1 AND p.cliente_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("No encontrado."))
    }

    pub async fn mark_notification_read(&self, user_id: i64, id: i64) -> ServiceResult<NotificacionPedido> {
        let notificacion = self.notification(user_id, id).await?;
        let notificacion = sqlx::query_as::<_, NotificacionPedido>(
            "UPDATE notificaciones_pedido SET leido = true WHERE id = $1 RETURNING *",
        )
        .bind(notificacion.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(notificacion)
    }

    async fn present_one(&self, pedido: Pedido) -> ServiceResult<PedidoView> {
        self.present(vec![pedido])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::Internal("order vanished while loading".to_string()))
    }

    async fn present(&self, pedidos: Vec<Pedido>) -> ServiceResult<Vec<PedidoView>> {
        if pedidos.is_empty() {
            return Ok(vec![]);
        }
        let pedido_ids: Vec<i64> = pedidos.iter().map(|p| p.id).collect();
        let detalles = sqlx::query_as::<_, DetallePedido>(
            "SELECT * FROM detalles_pedido WHERE pedido_id = ANY($1) ORDER BY id",
        )
        .bind(&pedido_ids)
        .fetch_all(&self.pool)
        .await?;

        let producto_ids: Vec<i64> = detalles.iter().filter_map(|d| d.producto_id).collect();
        let productos: HashMap<i64, Producto> = sqlx::query_as::<_, Producto>("SELECT * FROM productos WHERE id = ANY($1)")
            .bind(&producto_ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let tienda_ids: Vec<i64> = pedidos.iter().map(|p| p.tienda_id).collect();
        let tiendas: HashMap<i64, String> = sqlx::query_as::<_, (i64, String)>("SELECT id, nombre FROM tiendas WHERE id = ANY($1)")
            .bind(&tienda_ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();

        let clientes = self.client_names(&pedidos).await?;

        let mut lines_by_order: HashMap<i64, Vec<DetalleView>> = HashMap::new();
        for detalle in detalles {
            let producto = detalle.producto_id.and_then(|id| productos.get(&id));
            let (producto_nombre, producto_eliminado) = line_product_name(&detalle.nombre_producto, producto);
            let producto_imagen = line_product_image(producto);
            lines_by_order.entry(detalle.pedido_id).or_default().push(DetalleView {
                detalle,
                producto_nombre,
                producto_imagen,
                producto_eliminado,
            });
        }

        Ok(pedidos
            .into_iter()
            .map(|pedido| {
                let cliente_nombre = clientes.get(&pedido.id).cloned().unwrap_or_default();
                PedidoView {
                    detalles: lines_by_order.remove(&pedido.id).unwrap_or_default(),
                    cliente_nombre,
                    estado_display: EstadoPedido::label_of(&pedido.estado),
                    metodo_pago_display: MetodoPago::label_of(&pedido.metodo_pago),
                    tienda_nombre: tiendas.get(&pedido.tienda_id).cloned().unwrap_or_default(),
                    pedido,
                }
            })
            .collect())
    }

    /// Display name of each order's client keyed by order id
    async fn client_names(&self, pedidos: &[Pedido]) -> ServiceResult<HashMap<i64, String>> {
        let pedido_ids: Vec<i64> = pedidos.iter().map(|p| p.id).collect();
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT p.id,
                   COALESCE(
                       NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''),
                       u.username,
                       NULLIF(TRIM(c.first_name || ' ' || c.last_name), ''),
                       c.email,
                       ''
                   )
            FROM pedidos p
            LEFT JOIN users u ON u.id = p.cliente_id
            LEFT JOIN users_tienda_publica c ON c.id = p.cliente_tienda_publica_id
            WHERE p.id = ANY($1)
            "#,
        )
        .bind(&pedido_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn producto(eliminado: bool) -> Producto {
        let now = Utc::now();
        Producto {
            id: 1,
            tienda_id: 1,
            nombre: "Taza azul".into(),
            descripcion: String::new(),
            precio: Decimal::from(10),
            stock: 4,
            categoria_id: None,
            imagen: None,
            fecha_creacion: now,
            fecha_actualizacion: now,
            eliminado,
            categoria_nombre: None,
        }
    }

    #[test]
    fn line_names_survive_product_deletion() {
        assert_eq!(line_product_name("", Some(&producto(false))), ("Taza azul".to_string(), false));
        assert_eq!(line_product_name("Taza vieja", Some(&producto(true))), ("Taza vieja".to_string(), true));
        assert_eq!(line_product_name("", None), (PRODUCTO_NO_DISPONIBLE.to_string(), true));
    }

    #[test]
    fn deleted_products_hide_their_image() {
        let mut live = producto(false);
        live.imagen = Some("productos/taza.png".into());
        let mut gone = producto(true);
        gone.imagen = Some("productos/taza.png".into());
        assert_eq!(line_product_image(Some(&live)).as_deref(), Some("productos/taza.png"));
        assert_eq!(line_product_image(Some(&gone)), None);
        assert_eq!(line_product_image(None), None);
    }

    #[test]
    fn order_lines_are_parsed() {
        let lineas = parse_lineas(&json!({"detalles": [
            {"producto": 3, "cantidad": 2},
            {"producto_id": "4", "cantidad": 1, "precio_unitario": "5.50"}
        ]}))
        .unwrap();
        assert_eq!(lineas.len(), 2);
        assert_eq!(lineas[0].producto_id, 3);
        assert_eq!(lineas[0].precio_unitario, None);
        assert_eq!(lineas[1].precio_unitario.unwrap().to_string(), "5.50");
    }

    #[test]
    fn order_lines_must_be_valid() {
        assert!(parse_lineas(&json!({})).is_err());
        assert!(parse_lineas(&json!({"detalles": []})).is_err());
        assert!(parse_lineas(&json!({"detalles": [{"cantidad": 1}]})).is_err());
        assert!(parse_lineas(&json!({"detalles": [{"producto": 1, "cantidad": 0}]})).is_err());
    }

    #[test]
    fn totals_are_sum_of_subtotals() {
        let total: Decimal = [(2, Decimal::new(1050, 2)), (1, Decimal::from(3))]
            .iter()
            .map(|(c, p)| subtotal(*c, *p))
            .sum();
        assert_eq!(total, Decimal::new(2400, 2));
    }
}
