use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEFAULT_LOGO: &str = "logos/default_logo.png";

choices! {
    TemaTienda {
        Default => ("default", "Predeterminado"),
        Modern => ("modern", "Moderno"),
        Minimal => ("minimal", "Minimalista"),
        Corporate => ("corporate", "Corporativo"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tienda {
    pub id: i64,
    pub tenant_id: i64,
    pub usuario_id: i64,
    pub nombre: String,
    pub logo: Option<String>,
    pub descripcion: String,
    pub tema: String,
    pub publicado: bool,
    pub color_primario: String,
    pub color_secundario: String,
    pub color_texto: String,
    pub color_fondo: String,
    pub slug: String,
}

/// Store-level product category
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Categoria {
    pub id: i64,
    pub tienda_id: i64,
    pub nombre: String,
    pub descripcion: String,
    pub imagen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Producto {
    pub id: i64,
    pub tienda_id: i64,
    pub nombre: String,
    pub descripcion: String,
    pub precio: Decimal,
    pub stock: i32,
    pub categoria_id: Option<i64>,
    pub imagen: Option<String>,
    pub fecha_creacion: DateTime<Utc>,
    pub fecha_actualizacion: DateTime<Utc>,
    pub eliminado: bool,
    #[sqlx(default)]
    pub categoria_nombre: Option<String>,
}

/// Products below this stock level are reported as low stock
pub const LOW_STOCK_THRESHOLD: i32 = 5;
