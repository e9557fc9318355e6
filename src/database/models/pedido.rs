use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

choices! {
    EstadoPedido {
        Pendiente => ("pendiente", "Pendiente"),
        Confirmado => ("confirmado", "Confirmado"),
        EnProceso => ("en_proceso", "En Proceso"),
        Enviado => ("enviado", "Enviado"),
        Entregado => ("entregado", "Entregado"),
        Cancelado => ("cancelado", "Cancelado"),
    }
}

choices! {
    MetodoPago {
        Efectivo => ("efectivo", "Efectivo"),
        Tarjeta => ("tarjeta", "Tarjeta de Crédito/Débito"),
        Transferencia => ("transferencia", "Transferencia Bancaria"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pedido {
    pub id: i64,
    pub tienda_id: i64,
    pub cliente_id: Option<i64>,
    pub cliente_tienda_publica_id: Option<i64>,
    pub fecha_creacion: DateTime<Utc>,
    pub fecha_actualizacion: DateTime<Utc>,
    pub estado: String,
    pub total: Decimal,
    pub direccion_entrega: String,
    pub telefono: String,
    pub metodo_pago: String,
    pub notas: String,
    pub codigo_seguimiento: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DetallePedido {
    pub id: i64,
    pub pedido_id: i64,
    pub producto_id: Option<i64>,
    pub nombre_producto: String,
    pub cantidad: i32,
    pub precio_unitario: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificacionPedido {
    pub id: i64,
    pub pedido_id: i64,
    pub mensaje: String,
    pub fecha: DateTime<Utc>,
    pub leido: bool,
}

/// Line subtotal; kept in one place so totals always agree with lines
pub fn subtotal(cantidad: i32, precio_unitario: Decimal) -> Decimal {
    Decimal::from(cantidad) * precio_unitario
}
