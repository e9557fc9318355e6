use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::manager::DatabaseManager;
use crate::database::models::{PaymentMethod, PaymentMethodStatus, PaymentTransaction, PaymentType, Tienda, TransactionStatus};
use crate::services::{check_choice, opt_bool, opt_decimal, opt_i64, opt_str, ServiceError, ServiceResult};

const NO_STORE: &str = "No tienes una tienda configurada";

const TRANSACTION_SELECT: &str = r#"
    SELECT t.*, m.name AS payment_method_name
    FROM payment_transactions t
    JOIN payment_methods m ON m.id = t.payment_method_id
"#;

/// Fields of a payment method after merging the request over the stored row
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentMethodInput {
    pub name: String,
    pub payment_type: String,
    pub is_active: bool,
    pub status: String,
    pub credentials: Value,
    pub instructions: String,
}

impl PaymentMethodInput {
    pub fn from_json(body: &Value, current: Option<&PaymentMethod>) -> ServiceResult<Self> {
        let name = opt_str(body, "name")
            .or_else(|| current.map(|m| m.name.clone()))
            .unwrap_or_default();
        if name.trim().is_empty() {
            return Err(ServiceError::field("name", "El nombre no puede estar vacío"));
        }

        let payment_type = opt_str(body, "payment_type")
            .or_else(|| current.map(|m| m.payment_type.clone()))
            .ok_or_else(|| ServiceError::field("payment_type", "Este campo es requerido."))?;
        check_choice("payment_type", &payment_type, &PaymentType::values())?;

        let status = opt_str(body, "status")
            .or_else(|| current.map(|m| m.status.clone()))
            .unwrap_or_else(|| PaymentMethodStatus::Pending.as_str().to_string());
        check_choice("status", &status, &PaymentMethodStatus::values())?;

        let credentials = match body.get("credentials") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            None | Some(Value::Null) => current.map(|m| m.credentials.clone()).unwrap_or_else(|| json!({})),
            Some(_) => return Err(ServiceError::field("credentials", "Debe ser un objeto JSON.")),
        };
        validate_credentials(&payment_type, &credentials)?;

        Ok(Self {
            name: name.trim().to_string(),
            payment_type,
            is_active: opt_bool(body, "is_active")?.or(current.map(|m| m.is_active)).unwrap_or(true),
            status,
            credentials,
            instructions: opt_str(body, "instructions")
                .or_else(|| current.map(|m| m.instructions.clone()))
                .unwrap_or_default(),
        })
    }
}

/// Gateways that need API credentials before they can be stored
pub fn validate_credentials(payment_type: &str, credentials: &Value) -> ServiceResult<()> {
    let has = |key: &str| {
        credentials
            .get(key)
            .and_then(Value::as_str)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    };
    match PaymentType::parse(payment_type) {
        Some(PaymentType::Paypal) if !(has("client_id") && has("client_secret")) => {
            Err(ServiceError::validation("PayPal requiere client_id y client_secret"))
        }
        Some(PaymentType::Stripe) if !(has("public_key") && has("secret_key")) => {
            Err(ServiceError::validation("Stripe requiere public_key y secret_key"))
        }
        _ => Ok(()),
    }
}

pub fn generate_transaction_id() -> String {
    format!("TXN-{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

#[derive(Debug, Default, Serialize)]
pub struct SeedSummary {
    pub stores: usize,
    pub created: usize,
    pub skipped: usize,
}

/// Sample methods given to every published store
fn sample_methods(stamp: i64) -> Vec<PaymentMethodInput> {
    vec![
        PaymentMethodInput {
            name: "PayPal".into(),
            payment_type: PaymentType::Paypal.as_str().into(),
            is_active: true,
            status: PaymentMethodStatus::Active.as_str().into(),
            credentials: json!({
                "client_id": format!("paypal_client_{}", stamp),
                "client_secret": format!("paypal_secret_{}", stamp),
            }),
            instructions: "Puede pagar con su cuenta de PayPal de forma segura.".into(),
        },
        PaymentMethodInput {
            name: "Tarjeta de Crédito".into(),
            payment_type: PaymentType::CreditCard.as_str().into(),
            is_active: true,
            status: PaymentMethodStatus::Active.as_str().into(),
            credentials: json!({}),
            instructions: "Aceptamos todas las tarjetas de crédito principales.".into(),
        },
        PaymentMethodInput {
            name: "Transferencia Bancaria".into(),
            payment_type: PaymentType::BankTransfer.as_str().into(),
            is_active: true,
            status: PaymentMethodStatus::Active.as_str().into(),
            credentials: json!({
                "bank_name": "Banco de Ejemplo",
                "account_number": "123-456-789",
                "account_holder": "Tienda Ejemplo S.A.",
                "routing_number": "987654321",
            }),
            instructions: "Realice la transferencia a nuestra cuenta bancaria. Su pedido se procesará una vez recibido el pago."
                .into(),
        },
        PaymentMethodInput {
            name: "Efectivo".into(),
            payment_type: PaymentType::Cash.as_str().into(),
            is_active: true,
            status: PaymentMethodStatus::Active.as_str().into(),
            credentials: json!({}),
            instructions: "Pago en efectivo al momento de la entrega.".into(),
        },
    ]
}

pub struct PaymentService {
    pool: PgPool,
}

impl PaymentService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    // Payment methods. Staff only ever see the methods of their own store.

    pub async fn list_methods(&self, tenant_id: i64, tienda: Option<&Tienda>) -> ServiceResult<Vec<PaymentMethod>> {
        let Some(tienda) = tienda else {
            return Ok(vec![]);
        };
        let methods = sqlx::query_as::<_, PaymentMethod>(
            "SELECT * FROM payment_methods WHERE tenant_id = $1 AND tienda_id = $2 ORDER BY id",
        )
        .bind(tenant_id)
        .bind(tienda.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(methods)
    }

    async fn find_method(&self, tenant_id: i64, id: i64) -> ServiceResult<PaymentMethod> {
        sqlx::query_as::<_, PaymentMethod>("SELECT * FROM payment_methods WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Método de pago no encontrado"))
    }

    async fn owned_method(&self, tenant_id: i64, tienda: Option<&Tienda>, id: i64) -> ServiceResult<PaymentMethod> {
        let method = self.find_method(tenant_id, id).await?;
        match tienda {
            Some(tienda) if tienda.id == method.tienda_id => Ok(method),
            _ => Err(ServiceError::forbidden("No tienes permiso para modificar este método de pago")),
        }
    }

    pub async fn get_method(&self, tenant_id: i64, tienda: Option<&Tienda>, id: i64) -> ServiceResult<PaymentMethod> {
        let method = self.find_method(tenant_id, id).await?;
        match tienda {
            Some(tienda) if tienda.id == method.tienda_id => Ok(method),
            _ => Err(ServiceError::not_found("Método de pago no encontrado")),
        }
    }

    pub async fn create_method(&self, tenant_id: i64, tienda: Option<&Tienda>, body: &Value) -> ServiceResult<PaymentMethod> {
        let tienda = tienda.ok_or_else(|| ServiceError::forbidden(NO_STORE))?;
        let input = PaymentMethodInput::from_json(body, None)?;
        let method = self.insert_method(tenant_id, tienda.id, &input).await?;
        tracing::info!("Payment method '{}' ({}) added to store {}", method.name, method.payment_type, tienda.id);
        Ok(method)
    }

    async fn insert_method(&self, tenant_id: i64, tienda_id: i64, input: &PaymentMethodInput) -> ServiceResult<PaymentMethod> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            r#"
            INSERT INTO payment_methods (tenant_id, tienda_id, name, payment_type, is_active, status, credentials, instructions)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(tienda_id)
        .bind(&input.name)
        .bind(&input.payment_type)
        .bind(input.is_active)
        .bind(&input.status)
        .bind(&input.credentials)
        .bind(&input.instructions)
        .fetch_one(&self.pool)
        .await?;
        Ok(method)
    }

    pub async fn update_method(
        &self,
        tenant_id: i64,
        tienda: Option<&Tienda>,
        id: i64,
        body: &Value,
    ) -> ServiceResult<PaymentMethod> {
        let current = self.owned_method(tenant_id, tienda, id).await?;
        let input = PaymentMethodInput::from_json(body, Some(&current))?;
        let method = sqlx::query_as::<_, PaymentMethod>(
            r#"
            UPDATE payment_methods SET
                name = $2, payment_type = $3, is_active = $4, status = $5,
                credentials = $6, instructions = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(current.id)
        .bind(&input.name)
        .bind(&input.payment_type)
        .bind(input.is_active)
        .bind(&input.status)
        .bind(&input.credentials)
        .bind(&input.instructions)
        .fetch_one(&self.pool)
        .await?;
        Ok(method)
    }

    pub async fn delete_method(&self, tenant_id: i64, tienda: Option<&Tienda>, id: i64) -> ServiceResult<()> {
        let method = self.owned_method(tenant_id, tienda, id).await?;
        sqlx::query("DELETE FROM payment_methods WHERE id = $1")
            .bind(method.id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Payment method {} removed from store {}", method.id, method.tienda_id);
        Ok(())
    }

    /// Active methods a published store offers at checkout
    pub async fn public_methods(&self, slug: &str) -> ServiceResult<Vec<PaymentMethod>> {
        let tienda = sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE slug = $1 AND publicado = true")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Tienda no encontrada"))?;
        let methods = sqlx::query_as::<_, PaymentMethod>(
            "SELECT * FROM payment_methods WHERE tienda_id = $1 AND is_active = true ORDER BY id",
        )
        .bind(tienda.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(methods)
    }

    // Transactions

    pub async fn list_transactions(&self, tenant_id: i64, tienda: Option<&Tienda>) -> ServiceResult<Vec<PaymentTransaction>> {
        let Some(tienda) = tienda else {
            return Ok(vec![]);
        };
        let sql = format!("{} WHERE t.tenant_id = $1 AND m.tienda_id = $2 ORDER BY t.created_at DESC", TRANSACTION_SELECT);
        let transactions = sqlx::query_as::<_, PaymentTransaction>(&sql)
            .bind(tenant_id)
            .bind(tienda.id)
            .fetch_all(&self.pool)
            .await?;
        Ok(transactions)
    }

    pub async fn get_transaction(&self, tenant_id: i64, tienda: Option<&Tienda>, id: i64) -> ServiceResult<PaymentTransaction> {
        let tienda = tienda.ok_or_else(|| ServiceError::not_found("Transacción no encontrada"))?;
        let sql = format!("{} WHERE t.id = $1 AND t.tenant_id = $2 AND m.tienda_id = $3", TRANSACTION_SELECT);
        sqlx::query_as::<_, PaymentTransaction>(&sql)
            .bind(id)
            .bind(tenant_id)
            .bind(tienda.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Transacción no encontrada"))
    }

    pub async fn create_transaction(
        &self,
        tenant_id: i64,
        tienda: Option<&Tienda>,
        body: &Value,
    ) -> ServiceResult<PaymentTransaction> {
        let method_id = opt_i64(body, "payment_method")
            .ok_or_else(|| ServiceError::field("payment_method", "Este campo es requerido."))?;
        let method = sqlx::query_as::<_, PaymentMethod>("SELECT * FROM payment_methods WHERE id = $1")
            .bind(method_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::field("payment_method", "El método de pago no existe."))?;
        let owns = tienda.map(|t| t.id == method.tienda_id).unwrap_or(false);
        if method.tenant_id != tenant_id || !owns {
            return Err(ServiceError::forbidden("No tienes permiso para usar este método de pago"));
        }

        let amount = opt_decimal(body, "amount")?.ok_or_else(|| ServiceError::field("amount", "Este campo es requerido."))?;
        if amount < Decimal::ZERO {
            return Err(ServiceError::field("amount", "El monto no puede ser negativo."));
        }
        let status = opt_str(body, "status").unwrap_or_else(|| TransactionStatus::Pending.as_str().to_string());
        check_choice("status", &status, &TransactionStatus::values())?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO payment_transactions (tenant_id, payment_method_id, amount, currency, status, transaction_id, payment_details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(method.id)
        .bind(amount)
        .bind(opt_str(body, "currency").unwrap_or_else(|| "BOB".to_string()))
        .bind(&status)
        .bind(generate_transaction_id())
        .bind(body.get("payment_details").cloned().unwrap_or_else(|| json!({})))
        .fetch_one(&self.pool)
        .await?;
        tracing::info!("Transaction {} recorded on payment method {}", id, method.id);
        self.get_transaction(tenant_id, tienda, id).await
    }

    pub async fn update_transaction(
        &self,
        tenant_id: i64,
        tienda: Option<&Tienda>,
        id: i64,
        body: &Value,
    ) -> ServiceResult<PaymentTransaction> {
        let current = self.get_transaction(tenant_id, tienda, id).await?;
        let status = opt_str(body, "status");
        if let Some(status) = &status {
            check_choice("status", status, &TransactionStatus::values())?;
        }
        sqlx::query(
            r#"
            UPDATE payment_transactions SET
                amount = COALESCE($2, amount),
                currency = COALESCE($3, currency),
                status = COALESCE($4, status),
                payment_details = COALESCE($5, payment_details),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(current.id)
        .bind(opt_decimal(body, "amount")?)
        .bind(opt_str(body, "currency"))
        .bind(status)
        .bind(body.get("payment_details").filter(|v| !v.is_null()).cloned())
        .execute(&self.pool)
        .await?;
        self.get_transaction(tenant_id, tienda, id).await
    }

    pub async fn delete_transaction(&self, tenant_id: i64, tienda: Option<&Tienda>, id: i64) -> ServiceResult<()> {
        let current = self.get_transaction(tenant_id, tienda, id).await?;
        sqlx::query("DELETE FROM payment_transactions WHERE id = $1")
            .bind(current.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Gives every published store the sample methods it lacks
    pub async fn seed_payment_methods(&self) -> ServiceResult<SeedSummary> {
        let tiendas = sqlx::query_as::<_, Tienda>("SELECT * FROM tiendas WHERE publicado = true ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut summary = SeedSummary {
            stores: tiendas.len(),
            ..Default::default()
        };
        let samples = sample_methods(chrono::Utc::now().timestamp());

        for tienda in &tiendas {
            for sample in &samples {
                let (exists,): (bool,) = sqlx::query_as(
                    "SELECT EXISTS (SELECT 1 FROM payment_methods WHERE tienda_id = $1 AND payment_type = $2)",
                )
                .bind(tienda.id)
                .bind(&sample.payment_type)
                .fetch_one(&self.pool)
                .await?;
                if exists {
                    summary.skipped += 1;
                    continue;
                }
                self.insert_method(tienda.tenant_id, tienda.id, sample).await?;
                summary.created += 1;
            }
            tracing::info!("Seeded payment methods for store '{}'", tienda.nombre);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateways_require_credentials() {
        assert!(validate_credentials("paypal", &json!({"client_id": "a"})).is_err());
        assert!(validate_credentials("paypal", &json!({"client_id": "a", "client_secret": "b"})).is_ok());
        assert!(validate_credentials("stripe", &json!({"public_key": "", "secret_key": "b"})).is_err());
        assert!(validate_credentials("cash", &json!({})).is_ok());
    }

    #[test]
    fn method_input_validates_name_and_type() {
        assert!(PaymentMethodInput::from_json(&json!({"name": " ", "payment_type": "cash"}), None).is_err());
        assert!(PaymentMethodInput::from_json(&json!({"name": "X", "payment_type": "cheque"}), None).is_err());

        let input = PaymentMethodInput::from_json(&json!({"name": " Efectivo ", "payment_type": "cash"}), None).unwrap();
        assert_eq!(input.name, "Efectivo");
        assert_eq!(input.status, "pending");
        assert!(input.is_active);
        assert_eq!(input.credentials, json!({}));
    }

    #[test]
    fn sample_methods_pass_their_own_validation() {
        for sample in sample_methods(1) {
            validate_credentials(&sample.payment_type, &sample.credentials).unwrap();
        }
    }

    #[test]
    fn transaction_ids_are_unique() {
        let a = generate_transaction_id();
        assert!(a.starts_with("TXN-"));
        assert_ne!(a, generate_transaction_id());
    }
}
