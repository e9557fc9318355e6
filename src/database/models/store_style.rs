use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

choices! {
    TemaEstilo {
        Claro => ("claro", "Claro"),
        Oscuro => ("oscuro", "Oscuro"),
    }
}

choices! {
    VistaProducto {
        Grid => ("grid", "Cuadrícula"),
        List => ("list", "Lista"),
        Detallada => ("detallada", "Detallada"),
        Masonry => ("masonry", "Mosaico"),
    }
}

choices! {
    TemaPlantilla {
        Clasico => ("clasico", "Clásico"),
        Urbano => ("urbano", "Urbano"),
        Corporativo => ("corporativo", "Corporativo"),
    }
}

choices! {
    TipoBloque {
        Apilado => ("apilado", "Apilado"),
        EnLinea => ("en_linea", "En línea"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoreStyle {
    pub id: i64,
    pub tienda_id: i64,
    pub color_primario: String,
    pub color_secundario: String,
    pub color_texto: String,
    pub color_fondo: String,
    pub tipo_fuente: String,
    pub tema: String,
    pub vista_producto: String,
    pub tema_plantilla: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BloqueBienvenida {
    pub id: i64,
    pub style_id: i64,
    pub tipo: String,
    pub titulo: String,
    pub descripcion: String,
    pub imagen: Option<String>,
}
