use serde_json::{json, Value};
use sqlx::{self, postgres::PgRow, FromRow, PgPool};

use crate::database::manager::DatabaseError;
use crate::database::query_builder::QueryBuilder;
use crate::filter::{FilterData, FilterWhereOptions};

/// Table access bound to a pool, with optional mandatory scope
/// (`tenant_id`, `tienda_id`, ...) and soft-delete handling.
pub struct Repository<T> {
    table_name: String,
    pool: PgPool,
    scope: Vec<(String, Value)>,
    soft_delete: FilterWhereOptions,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Repository<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(table_name: impl Into<String>, pool: PgPool) -> Self {
        Self {
            table_name: table_name.into(),
            pool,
            scope: vec![],
            soft_delete: FilterWhereOptions::default(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn scoped(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.scope.push((column.to_string(), value.into()));
        self
    }

    pub fn with_soft_delete(mut self, column: &str, include_deleted: bool) -> Self {
        self.soft_delete = FilterWhereOptions::soft_delete(column, include_deleted);
        self
    }

    fn builder(&self, filter_data: FilterData) -> Result<QueryBuilder<T>, DatabaseError> {
        let mut builder = QueryBuilder::<T>::new(&self.table_name)?
            .filter(filter_data)?
            .soft_delete(self.soft_delete.clone());
        for (column, value) in &self.scope {
            builder = builder.scope(column, value.clone())?;
        }
        Ok(builder)
    }

    pub async fn select_any(&self, filter_data: FilterData) -> Result<Vec<T>, DatabaseError> {
        self.builder(filter_data)?.select_all(&self.pool).await
    }

    pub async fn select_one(&self, filter_data: FilterData) -> Result<Option<T>, DatabaseError> {
        self.builder(filter_data)?.select_optional(&self.pool).await
    }

    pub async fn select_404(&self, filter_data: FilterData) -> Result<T, DatabaseError> {
        self.select_one(filter_data)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Record not found in {}", self.table_name)))
    }

    pub async fn select_id(&self, id: i64) -> Result<Option<T>, DatabaseError> {
        self.select_one(FilterData {
            where_clause: Some(json!({ "id": id })),
            ..Default::default()
        })
        .await
    }

    pub async fn count(&self, filter_data: FilterData) -> Result<i64, DatabaseError> {
        self.builder(filter_data)?.count(&self.pool).await
    }

    pub async fn select_ids(&self, ids: Vec<i64>) -> Result<Vec<T>, DatabaseError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let filter = FilterData {
            where_clause: Some(json!({ "id": { "$in": ids } })),
            ..Default::default()
        };
        self.select_any(filter).await
    }
}
