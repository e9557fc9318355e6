use thiserror::Error;

/// Rejections of a client supplied filter. Messages go back to the caller
/// as 400 responses.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Tabla no válida: {0}")]
    InvalidTableName(String),

    #[error("Columna no válida: {0}")]
    InvalidColumn(String),

    #[error("Filtro `where` no válido: {0}")]
    InvalidWhereClause(String),

    #[error("Operador no soportado: {0}")]
    UnsupportedOperator(String),

    #[error("Valor no válido para el operador: {0}")]
    InvalidOperatorData(String),

    #[error("Límite no válido: {0}")]
    InvalidLimit(String),

    #[error("Desplazamiento no válido: {0}")]
    InvalidOffset(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    #[test]
    fn filter_errors_are_client_errors() {
        let api: ApiError = FilterError::UnsupportedOperator("$regex".into()).into();
        assert_eq!(api.status_code(), 400);
        assert_eq!(api.message(), "Operador no soportado: $regex");
    }
}
