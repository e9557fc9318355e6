use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo, FilterWhereOptions};

pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
    depth: u32,
    conditions: Vec<FilterWhereInfo>,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            depth: 0,
            conditions: vec![],
        }
    }

    /// Compile `where_data` into a SQL predicate whose placeholders start
    /// after `starting_param_index`.
    pub fn generate(
        where_data: &Value,
        starting_param_index: usize,
        options: &FilterWhereOptions,
    ) -> Result<(String, Vec<Value>), FilterError> {
        Self::generate_nested(where_data, starting_param_index, 0, options)
    }

    fn generate_nested(
        where_data: &Value,
        starting_param_index: usize,
        depth: u32,
        options: &FilterWhereOptions,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let max_depth = crate::config::CONFIG.filter.max_nested_depth;
        if depth > max_depth {
            return Err(FilterError::InvalidWhereClause(format!(
                "Nesting depth exceeds maximum of {}",
                max_depth
            )));
        }
        let mut filter_where = Self::new(starting_param_index);
        filter_where.depth = depth;
        filter_where.build(where_data, options)
    }

    pub fn generate_empty(options: &FilterWhereOptions) -> (String, Vec<Value>) {
        let where_clause = options.visibility_condition().unwrap_or_else(|| "1=1".to_string());
        (where_clause, vec![])
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        if where_data.is_null() {
            return Ok(());
        }
        match where_data {
            Value::Object(_) | Value::String(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be object or string".to_string())),
        }
    }

    pub fn is_valid_column(column: &str) -> bool {
        let mut chars = column.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    fn build(&mut self, where_data: &Value, options: &FilterWhereOptions) -> Result<(String, Vec<Value>), FilterError> {
        self.param_values.clear();
        self.conditions.clear();

        self.parse_where_data(where_data)?;

        let mut sql_conditions = vec![];
        if let Some(visibility) = options.visibility_condition() {
            sql_conditions.push(visibility);
        }
        let conditions_snapshot = self.conditions.clone();
        for condition in &conditions_snapshot {
            if let Some(sql) = self.build_sql_condition(condition)? {
                sql_conditions.push(sql);
            }
        }
        let where_clause = if sql_conditions.is_empty() { "1=1".to_string() } else { sql_conditions.join(" AND ") };
        Ok((where_clause, self.param_values.clone()))
    }

    fn parse_where_data(&mut self, where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null => Ok(()),
            Value::Object(obj) => {
                for (key, value) in obj {
                    if key.starts_with('$') {
                        self.parse_logical_operator(key, value)?;
                    } else {
                        self.parse_field_condition(key, value)?;
                    }
                }
                Ok(())
            }
            Value::String(s) => {
                if !crate::config::CONFIG.filter.allow_raw_sql {
                    return Err(FilterError::InvalidWhereClause(
                        "Raw SQL queries are disabled in this environment".to_string(),
                    ));
                }
                tracing::warn!("Raw SQL filter predicate used: {}", s);
                self.conditions.push(FilterWhereInfo { column: s.clone(), operator: FilterOp::Text, data: Value::Null });
                Ok(())
            }
            _ => Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        }
    }

    /// Sub-clauses continue numbering from the parent's current index
    fn nested(&mut self, value: &Value) -> Result<String, FilterError> {
        let (sql, params) =
            Self::generate_nested(value, self.param_index, self.depth + 1, &FilterWhereOptions::default())?;
        self.param_index += params.len();
        self.param_values.extend(params);
        Ok(sql)
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value) -> Result<(), FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Ok(());
                }
                let mut sql_parts = Vec::new();
                for v in arr {
                    let sql = self.nested(v)?;
                    sql_parts.push(format!("({})", sql));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                let combined = format!("({})", sql_parts.join(joiner));
                self.conditions.push(FilterWhereInfo { column: combined, operator: FilterOp::Text, data: Value::Null });
                Ok(())
            }
            "$not" => {
                let sql = self.nested(value)?;
                self.conditions.push(FilterWhereInfo {
                    column: format!("NOT ({})", sql),
                    operator: FilterOp::Text,
                    data: Value::Null,
                });
                Ok(())
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<(), FilterError> {
        if !Self::is_valid_column(field) {
            return Err(FilterError::InvalidColumn(field.to_string()));
        }
        if let Value::Object(obj) = value {
            for (op_key, op_val) in obj {
                let operator = Self::map_operator(op_key)?;
                self.conditions.push(FilterWhereInfo { column: field.to_string(), operator, data: op_val.clone() });
            }
        } else {
            // Implicit equality: { field: value }
            self.conditions.push(FilterWhereInfo { column: field.to_string(), operator: FilterOp::Eq, data: value.clone() });
        }
        Ok(())
    }

    fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Neq,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$nlike" => FilterOp::NLike,
            "$ilike" => FilterOp::ILike,
            "$nilike" => FilterOp::NILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            "$any" => FilterOp::Any,
            "$all" => FilterOp::All,
            "$size" => FilterOp::Size,
            "$null" => FilterOp::Null,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<Option<String>, FilterError> {
        // Pseudo conditions carry pre-built SQL in `column`
        if matches!(condition.operator, FilterOp::Text) && condition.data.is_null() {
            return Ok(Some(condition.column.clone()));
        }

        let quoted_column = format!("\"{}\"", condition.column);
        let data = condition.data.clone();
        let sql = match condition.operator {
            FilterOp::Eq if data.is_null() => format!("{} IS NULL", quoted_column),
            FilterOp::Eq => format!("{} = {}", quoted_column, self.param(data)),
            FilterOp::Ne | FilterOp::Neq if data.is_null() => format!("{} IS NOT NULL", quoted_column),
            FilterOp::Ne | FilterOp::Neq => format!("{} <> {}", quoted_column, self.param(data)),
            FilterOp::Gt => format!("{} > {}", quoted_column, self.param(data)),
            FilterOp::Gte => format!("{} >= {}", quoted_column, self.param(data)),
            FilterOp::Lt => format!("{} < {}", quoted_column, self.param(data)),
            FilterOp::Lte => format!("{} <= {}", quoted_column, self.param(data)),
            FilterOp::Like => format!("{} LIKE {}", quoted_column, self.param(data)),
            FilterOp::NLike => format!("{} NOT LIKE {}", quoted_column, self.param(data)),
            FilterOp::ILike => format!("{} ILIKE {}", quoted_column, self.param(data)),
            FilterOp::NILike => format!("{} NOT ILIKE {}", quoted_column, self.param(data)),
            FilterOp::In | FilterOp::NIn => {
                let negate = matches!(condition.operator, FilterOp::NIn);
                match &data {
                    Value::Array(values) if values.is_empty() => {
                        if negate { "1=1".to_string() } else { "1=0".to_string() }
                    }
                    Value::Array(values) => {
                        let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                        let op = if negate { "NOT IN" } else { "IN" };
                        format!("{} {} ({})", quoted_column, op, params.join(", "))
                    }
                    _ => {
                        let op = if negate { "<>" } else { "=" };
                        format!("{} {} {}", quoted_column, op, self.param(data))
                    }
                }
            }
            FilterOp::Between => match &data {
                Value::Array(values) if values.len() == 2 => format!(
                    "{} BETWEEN {} AND {}",
                    quoted_column,
                    self.param(values[0].clone()),
                    self.param(values[1].clone())
                ),
                _ => {
                    return Err(FilterError::InvalidOperatorData(
                        "$between requires array with 2 values".to_string(),
                    ))
                }
            },
            FilterOp::Any => match &data {
                Value::Array(values) if values.is_empty() => "1=0".to_string(),
                Value::Array(values) => {
                    let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                    format!("{} && ARRAY[{}]", quoted_column, params.join(", "))
                }
                _ => format!("{} && ARRAY[{}]", quoted_column, self.param(data)),
            },
            FilterOp::All => match &data {
                Value::Array(values) => {
                    let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                    format!("{} @> ARRAY[{}]", quoted_column, params.join(", "))
                }
                _ => format!("{} @> ARRAY[{}]", quoted_column, self.param(data)),
            },
            FilterOp::Size => format!("array_length({}, 1) = {}", quoted_column, self.param(data)),
            FilterOp::Null => {
                if data.as_bool().unwrap_or(true) {
                    format!("{} IS NULL", quoted_column)
                } else {
                    format!("{} IS NOT NULL", quoted_column)
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(sql))
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn implicit_equality_and_operators() {
        let (sql, params) = FilterWhere::generate(
            &json!({"estado": "nuevo", "probabilidad": {"$gte": 50}}),
            0,
            &FilterWhereOptions::default(),
        )
        .unwrap();
        assert_eq!(sql, "\"estado\" = $1 AND \"probabilidad\" >= $2");
        assert_eq!(params, vec![json!("nuevo"), json!(50)]);
    }

    #[test]
    fn nested_clauses_keep_placeholder_numbering() {
        let (sql, params) = FilterWhere::generate(
            &json!({"tenant_id": 7, "$or": [{"estado": "nuevo"}, {"estado": "ganado"}]}),
            0,
            &FilterWhereOptions::default(),
        )
        .unwrap();
        // object keys iterate in sorted order, so `$or` is numbered first
        assert!(sql.contains("(\"estado\" = $1) OR (\"estado\" = $2)"));
        assert!(sql.contains("\"tenant_id\" = $3"));
        assert_eq!(params, vec![json!("nuevo"), json!("ganado"), json!(7)]);
    }

    #[test]
    fn soft_delete_column_hides_rows_unless_included() {
        let hidden = FilterWhereOptions::soft_delete("eliminado", false);
        let (sql, _) = FilterWhere::generate(&json!({"tienda_id": 1}), 0, &hidden).unwrap();
        assert!(sql.starts_with("\"eliminado\" = false AND "));

        let shown = FilterWhereOptions::soft_delete("eliminado", true);
        let (sql, _) = FilterWhere::generate_empty(&shown);
        assert_eq!(sql, "1=1");
    }

    #[test]
    fn rejects_unsafe_columns() {
        let err = FilterWhere::generate(&json!({"id; DROP TABLE x": 1}), 0, &FilterWhereOptions::default());
        assert!(matches!(err, Err(FilterError::InvalidColumn(_))));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, params) =
            FilterWhere::generate(&json!({"id": {"$in": []}}), 0, &FilterWhereOptions::default()).unwrap();
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());
    }
}
