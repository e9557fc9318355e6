use serde_json::Value;

use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                // ["-fecha_creacion", "nombre asc"]
                let mut out = Vec::new();
                for v in arr {
                    if let Value::String(s) = v {
                        out.extend(Self::parse_order_string(s)?);
                    }
                }
                Ok(out)
            }
            Value::Object(obj) => {
                // { "fecha_creacion": "desc", "nombre": "asc" }
                let mut out = Vec::new();
                for (k, v) in obj {
                    let sort = match v.as_str().unwrap_or("asc").to_ascii_lowercase().as_str() {
                        "desc" => SortDirection::Desc,
                        _ => SortDirection::Asc,
                    };
                    out.push(Self::info(k, sort)?);
                }
                Ok(out)
            }
            _ => Ok(vec![]),
        }
    }

    /// Accepts "col", "col desc" and the "-col" shorthand, comma separated
    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let (col, mut sort) = match col.strip_prefix('-') {
                    Some(stripped) => (stripped, SortDirection::Desc),
                    None => (col, SortDirection::Asc),
                };
                if let Some(dir) = it.next() {
                    sort = if dir.eq_ignore_ascii_case("desc") { SortDirection::Desc } else { SortDirection::Asc };
                }
                out.push(Self::info(col, sort)?);
            }
        }
        Ok(out)
    }

    fn info(column: &str, sort: SortDirection) -> Result<FilterOrderInfo, FilterError> {
        if !FilterWhere::is_valid_column(column) {
            return Err(FilterError::InvalidColumn(column.to_string()));
        }
        Ok(FilterOrderInfo { column: column.to_string(), sort })
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> Result<String, FilterError> {
        if infos.is_empty() {
            return Ok(String::new());
        }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dash_prefix_sorts_descending() {
        let infos = FilterOrder::validate_and_parse(&json!("-fecha_creacion, nombre")).unwrap();
        assert_eq!(
            FilterOrder::generate(&infos).unwrap(),
            "ORDER BY \"fecha_creacion\" DESC, \"nombre\" ASC"
        );
    }

    #[test]
    fn rejects_quoted_columns() {
        assert!(FilterOrder::validate_and_parse(&json!("nombre\" desc; --")).is_err());
    }
}
