use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Customer account registered on a single public storefront
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StorefrontUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub tienda_id: i64,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PedidoPublico {
    pub id: i64,
    pub usuario_id: i64,
    pub tienda_id: i64,
    pub nombre: String,
    pub apellido: String,
    pub ci: String,
    pub ciudad: String,
    pub provincia: String,
    pub direccion: String,
    pub referencia: String,
    pub telefono: String,
    pub correo: String,
    pub notas: String,
    pub metodo_pago: String,
    pub total: Decimal,
    pub fecha: DateTime<Utc>,
    pub estado: String,
    pub codigo_seguimiento: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DetallePedidoPublico {
    pub id: i64,
    pub pedido_id: i64,
    pub nombre_producto: String,
    pub cantidad: i32,
    pub precio_unitario: Decimal,
    pub subtotal: Decimal,
}

/// Display text for the free-form payment method of a storefront order
pub fn metodo_pago_publico_display(metodo: &str) -> String {
    match metodo {
        "transferencia" => "Transferencia Bancaria".to_string(),
        "efectivo" => "Pago en Efectivo".to_string(),
        "qr" => "Pago con QR".to_string(),
        "tarjeta" => "Tarjeta de Débito/Crédito".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_payment_methods_have_fixed_labels() {
        assert_eq!(metodo_pago_publico_display("qr"), "Pago con QR");
        assert_eq!(metodo_pago_publico_display("efectivo"), "Pago en Efectivo");
    }

    #[test]
    fn unknown_payment_methods_are_capitalized() {
        assert_eq!(metodo_pago_publico_display("cripto"), "Cripto");
        assert_eq!(metodo_pago_publico_display("PAYPAL"), "Paypal");
        assert_eq!(metodo_pago_publico_display(""), "");
    }
}
