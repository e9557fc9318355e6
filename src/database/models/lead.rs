use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

choices! {
    EstadoLead {
        Nuevo => ("nuevo", "Nuevo"),
        Contactado => ("contactado", "Contactado"),
        Calificado => ("calificado", "Calificado"),
        Propuesta => ("propuesta", "Propuesta"),
        Negociacion => ("negociacion", "Negociación"),
        Ganado => ("ganado", "Ganado"),
        Perdido => ("perdido", "Perdido"),
    }
}

choices! {
    FuenteLead {
        Ecommerce => ("ecommerce", "E-commerce"),
        Manual => ("manual", "Manual"),
        TiendaPublica => ("tienda_publica", "Tienda pública"),
        Otro => ("otro", "Otro"),
    }
}

choices! {
    TipoInteraccion {
        Llamada => ("llamada", "Llamada"),
        Email => ("email", "Email"),
        Reunion => ("reunion", "Reunión"),
        Compra => ("compra", "Compra"),
        Otro => ("otro", "Otro"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: i64,
    pub usuario_id: Option<i64>,
    pub nombre: String,
    pub email: String,
    pub telefono: String,
    pub estado: String,
    pub fecha_creacion: DateTime<Utc>,
    pub ultima_actualizacion: DateTime<Utc>,
    pub notas: String,
    pub tenant_id: i64,
    pub tienda_id: i64,
    pub valor_estimado: Decimal,
    pub probabilidad: i32,
    pub fuente: String,
    pub total_compras: i32,
    pub valor_total_compras: Decimal,
    pub ultima_compra: Option<DateTime<Utc>>,
    pub frecuencia_compra: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InteraccionLead {
    pub id: i64,
    pub lead_id: i64,
    pub tipo: String,
    pub descripcion: String,
    pub valor: Option<Decimal>,
    pub fecha: DateTime<Utc>,
}
