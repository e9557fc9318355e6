use serde_json::{json, Value};
use sqlx::PgPool;

use crate::database::manager::DatabaseManager;
use crate::database::models::Category;
use crate::database::Repository;
use crate::filter::FilterData;
use crate::services::{ServiceError, ServiceResult};

/// Trimmed, non-empty category name
pub fn clean_name(body: &Value) -> ServiceResult<String> {
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default().trim();
    if name.is_empty() {
        return Err(ServiceError::field("name", "El nombre de la categoría no puede estar vacío"));
    }
    if name.chars().count() > 100 {
        return Err(ServiceError::field("name", "Asegúrese de que este campo no tenga más de 100 caracteres."));
    }
    Ok(name.to_string())
}

pub struct CategoryService {
    pool: PgPool,
}

impl CategoryService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn repository(&self, tenant_id: i64) -> Repository<Category> {
        Repository::new("categories", self.pool.clone()).scoped("tenant_id", tenant_id)
    }

    pub async fn list(&self, tenant_id: i64) -> ServiceResult<Vec<Category>> {
        let categories = self
            .repository(tenant_id)
            .select_any(FilterData {
                order: Some(json!("name")),
                ..Default::default()
            })
            .await?;
        Ok(categories)
    }

    pub async fn get(&self, tenant_id: i64, id: i64) -> ServiceResult<Category> {
        self.repository(tenant_id)
            .select_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("No encontrado."))
    }

    pub async fn create(&self, tenant_id: i64, body: &Value) -> ServiceResult<Category> {
        let name = clean_name(body)?;
        self.check_unique(tenant_id, &name, None).await?;
        let category = sqlx::query_as::<_, Category>("INSERT INTO categories (name, tenant_id) VALUES ($1, $2) RETURNING *")
            .bind(&name)
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        tracing::info!("Category '{}' created for tenant {}", category.name, tenant_id);
        Ok(category)
    }

    pub async fn update(&self, tenant_id: i64, id: i64, body: &Value) -> ServiceResult<Category> {
        let existing = self.get(tenant_id, id).await?;
        if body.get("name").is_none() {
            return Ok(existing);
        }
        let name = clean_name(body)?;
        self.check_unique(tenant_id, &name, Some(existing.id)).await?;
        let category = sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(existing.id)
        .bind(&name)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    pub async fn delete(&self, tenant_id: i64, id: i64) -> ServiceResult<()> {
        let existing = self.get(tenant_id, id).await?;
        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(existing.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn check_unique(&self, tenant_id: i64, name: &str, except: Option<i64>) -> ServiceResult<()> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM categories
                WHERE tenant_id = $1 AND name = $2 AND ($3::BIGINT IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        if exists {
            return Err(ServiceError::field("name", "Ya existe una categoría con este nombre"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed() {
        assert_eq!(clean_name(&json!({"name": "  Ropa  "})).unwrap(), "Ropa");
    }

    #[test]
    fn blank_names_are_rejected() {
        for body in [json!({}), json!({"name": "   "}), json!({"name": null})] {
            match clean_name(&body) {
                Err(ServiceError::FieldValidation { message, .. }) => {
                    assert_eq!(message, "El nombre de la categoría no puede estar vacío")
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
