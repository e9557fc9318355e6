/// Declares a closed set of string values stored in a VARCHAR column,
/// each with a human readable label.
macro_rules! choices {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => ($value:literal, $label:literal)),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $value)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self { $($name::$variant => $value),+ }
            }

            pub fn label(&self) -> &'static str {
                match self { $($name::$variant => $label),+ }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn values() -> Vec<&'static str> {
                Self::ALL.iter().map(|c| c.as_str()).collect()
            }

            /// Label for a stored value, falling back to the raw value
            pub fn label_of(value: &str) -> String {
                Self::parse(value).map(|c| c.label().to_string()).unwrap_or_else(|| value.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod audit;
pub mod backup;
pub mod category;
pub mod lead;
pub mod payment;
pub mod pedido;
pub mod store_style;
pub mod storefront;
pub mod subscription;
pub mod tenant;
pub mod tienda;
pub mod user;

pub use audit::*;
pub use backup::*;
pub use category::*;
pub use lead::*;
pub use payment::*;
pub use pedido::*;
pub use store_style::*;
pub use storefront::*;
pub use subscription::*;
pub use tenant::*;
pub use tienda::*;
pub use user::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_round_trip_through_str() {
        for estado in EstadoPedido::ALL {
            assert_eq!(EstadoPedido::parse(estado.as_str()), Some(*estado));
        }
        assert_eq!(EstadoPedido::parse("perdido"), None);
        assert_eq!(EstadoLead::parse("perdido"), Some(EstadoLead::Perdido));
    }

    #[test]
    fn labels_fall_back_to_raw_value() {
        assert_eq!(EstadoPedido::label_of("en_proceso"), "En Proceso");
        assert_eq!(EstadoPedido::label_of("desconocido"), "desconocido");
        assert_eq!(MetodoPago::label_of("tarjeta"), "Tarjeta de Crédito/Débito");
    }

    #[test]
    fn choices_serialize_as_stored_value() {
        let v = serde_json::to_value(TipoInteraccion::Reunion).unwrap();
        assert_eq!(v, serde_json::json!("reunion"));
        let back: FuenteLead = serde_json::from_value(serde_json::json!("tienda_publica")).unwrap();
        assert_eq!(back, FuenteLead::TiendaPublica);
    }
}
