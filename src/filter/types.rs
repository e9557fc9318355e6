use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$neq")] Neq,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,

    #[serde(rename = "$like")] Like,
    #[serde(rename = "$nlike")] NLike,
    #[serde(rename = "$ilike")] ILike,
    #[serde(rename = "$nilike")] NILike,
    #[serde(rename = "$regex")] Regex,
    #[serde(rename = "$nregex")] NRegex,

    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,

    #[serde(rename = "$any")] Any,
    #[serde(rename = "$all")] All,
    #[serde(rename = "$nany")] NAny,
    #[serde(rename = "$nall")] NAll,
    #[serde(rename = "$size")] Size,

    #[serde(rename = "$and")] And,
    #[serde(rename = "$or")] Or,
    #[serde(rename = "$not")] Not,
    #[serde(rename = "$nand")] NAnd,
    #[serde(rename = "$nor")] NOr,

    #[serde(rename = "$between")] Between,

    #[serde(rename = "$find")] Find,
    #[serde(rename = "$text")] Text,

    #[serde(rename = "$exists")] Exists,
    #[serde(rename = "$null")] Null,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterData {
    pub select: Option<Vec<String>>,
    pub where_clause: Option<serde_json::Value>,
    pub order: Option<serde_json::Value>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct FilterWhereInfo {
    pub column: String,
    pub operator: FilterOp,
    pub data: serde_json::Value,
}

/// Soft-delete handling for generated WHERE clauses. Tables without a
/// soft-delete flag leave `soft_delete_column` unset.
#[derive(Debug, Clone, Default)]
pub struct FilterWhereOptions {
    pub soft_delete_column: Option<String>,
    pub include_deleted: bool,
}

impl FilterWhereOptions {
    pub fn soft_delete(column: impl Into<String>, include_deleted: bool) -> Self {
        Self {
            soft_delete_column: Some(column.into()),
            include_deleted,
        }
    }

    /// Condition hiding soft-deleted rows, if any applies
    pub fn visibility_condition(&self) -> Option<String> {
        match (&self.soft_delete_column, self.include_deleted) {
            (Some(column), false) => Some(format!("\"{}\" = false", column)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<serde_json::Value>,
}
