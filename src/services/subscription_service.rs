use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::database::manager::DatabaseManager;
use crate::database::models::{Plan, PlanType, Subscription, SubscriptionStatus, Tenant};
use crate::services::{check_choice, opt_bool, opt_decimal, opt_i64, opt_str, required_str, ServiceError, ServiceResult};

pub const TRIAL_PLAN_NAME: &str = "Plan de Prueba";
const NO_TENANT: &str = "No se encontró un tenant asociado a tu cuenta";

/// Subscription as returned over HTTP, with the plan and derived flags
#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub plan_details: Value,
    pub is_active: bool,
    pub is_trial: bool,
}

impl SubscriptionView {
    pub fn new(subscription: Subscription, plan: &Plan) -> Self {
        Self {
            is_active: subscription.is_active(),
            is_trial: subscription.is_trial(),
            plan_details: plan.to_json(),
            subscription,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Quota<T> {
    pub used: T,
    pub limit: i32,
    pub remaining: T,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub products: Quota<i32>,
    pub users: Quota<i32>,
    pub storage: Quota<f64>,
    pub is_trial: bool,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub end_date: DateTime<Utc>,
    pub status: String,
}

impl Usage {
    pub fn new(subscription: &Subscription, plan: &Plan) -> Self {
        let storage_used = f64::from(subscription.storage_used);
        Self {
            products: Quota {
                used: subscription.products_count,
                limit: plan.max_products,
                remaining: (plan.max_products - subscription.products_count).max(0),
            },
            users: Quota {
                used: subscription.users_count,
                limit: plan.max_users,
                remaining: (plan.max_users - subscription.users_count).max(0),
            },
            storage: Quota {
                used: storage_used,
                limit: plan.max_storage,
                remaining: (f64::from(plan.max_storage) - storage_used).max(0.0),
            },
            is_trial: subscription.is_trial(),
            trial_end_date: subscription.trial_end_date,
            end_date: subscription.end_date,
            status: subscription.status.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SimulatedPayment {
    pub status: &'static str,
    pub message: &'static str,
    pub subscription: SubscriptionView,
    pub is_trial: bool,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize)]
pub struct TrialSummary {
    pub plan_id: i64,
    pub plan_name: String,
    pub tenants: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: Vec<(String, String)>,
}

/// Plan names containing these words are activated as trials
pub fn is_trial_plan_name(name: &str) -> bool {
    let name = name.to_lowercase();
    name == "prueba" || name.contains("free")
}

/// Fields of a plan row, used by admin CRUD and the seed command
#[derive(Debug, Clone, PartialEq)]
pub struct PlanInput {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub plan_type: String,
    pub duration_months: i32,
    pub max_products: i32,
    pub max_users: i32,
    pub max_storage: i32,
    pub has_crm: bool,
    pub has_ecommerce: bool,
    pub has_analytics: bool,
    pub has_api_access: bool,
    pub is_active: bool,
}

impl PlanInput {
    pub fn from_json(body: &Value, current: Option<&Plan>) -> ServiceResult<Self> {
        let name = match current {
            Some(plan) => opt_str(body, "name").unwrap_or_else(|| plan.name.clone()),
            None => required_str(body, "name")?,
        };
        let price = match (opt_decimal(body, "price")?, current) {
            (Some(price), _) => price,
            (None, Some(plan)) => plan.price,
            (None, None) => return Err(ServiceError::field("price", "Este campo es requerido.")),
        };
        if price < Decimal::ZERO {
            return Err(ServiceError::field("price", "El precio no puede ser negativo."));
        }
        let plan_type = opt_str(body, "plan_type")
            .or_else(|| current.map(|p| p.plan_type.clone()))
            .unwrap_or_else(|| PlanType::Mensual.as_str().to_string());
        check_choice("plan_type", &plan_type, &PlanType::values())?;

        let int = |key: &str, fallback: i32| -> ServiceResult<i32> {
            match opt_i64(body, key) {
                Some(v) => i32::try_from(v)
                    .ok()
                    .filter(|v| *v >= 0)
                    .ok_or_else(|| ServiceError::field(key, "Un entero válido es requerido.")),
                None => Ok(fallback),
            }
        };
        let flag = |key: &str, fallback: bool| -> ServiceResult<bool> { Ok(opt_bool(body, key)?.unwrap_or(fallback)) };

        Ok(Self {
            description: opt_str(body, "description")
                .or_else(|| current.map(|p| p.description.clone()))
                .unwrap_or_default(),
            duration_months: int("duration_months", current.map(|p| p.duration_months).unwrap_or(1))?,
            max_products: int("max_products", current.map(|p| p.max_products).unwrap_or(100))?,
            max_users: int("max_users", current.map(|p| p.max_users).unwrap_or(5))?,
            max_storage: int("max_storage", current.map(|p| p.max_storage).unwrap_or(5))?,
            has_crm: flag("has_crm", current.map(|p| p.has_crm).unwrap_or(true))?,
            has_ecommerce: flag("has_ecommerce", current.map(|p| p.has_ecommerce).unwrap_or(true))?,
            has_analytics: flag("has_analytics", current.map(|p| p.has_analytics).unwrap_or(false))?,
            has_api_access: flag("has_api_access", current.map(|p| p.has_api_access).unwrap_or(false))?,
            is_active: flag("is_active", current.map(|p| p.is_active).unwrap_or(true))?,
            name,
            price,
            plan_type,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn seed_plan(
    name: &str,
    description: &str,
    cents: i64,
    plan_type: PlanType,
    max_products: i32,
    max_users: i32,
    max_storage: i32,
    tier: u8,
) -> PlanInput {
    PlanInput {
        name: name.to_string(),
        description: description.to_string(),
        price: Decimal::new(cents, 2),
        plan_type: plan_type.as_str().to_string(),
        duration_months: if plan_type == PlanType::Anual { 12 } else { 1 },
        max_products,
        max_users,
        max_storage,
        has_crm: tier >= 2,
        has_ecommerce: true,
        has_analytics: tier >= 2,
        has_api_access: tier >= 3,
        is_active: true,
    }
}

/// Basic, standard and premium tiers, monthly and annual
pub fn default_plans() -> Vec<PlanInput> {
    vec![
        seed_plan("Básico Mensual", "Ideal para emprendedores que recién comienzan.", 999, PlanType::Mensual, 50, 2, 2, 1),
        seed_plan("Estándar Mensual", "Para negocios en crecimiento con funciones adicionales.", 1999, PlanType::Mensual, 200, 5, 5, 2),
        seed_plan("Premium Mensual", "Todas las funciones disponibles, ideal para empresas establecidas.", 2999, PlanType::Mensual, 1000, 20, 20, 3),
        seed_plan("Básico Anual", "Versión anual del plan básico con descuento.", 9999, PlanType::Anual, 50, 2, 2, 1),
        seed_plan("Estándar Anual", "Plan estándar con todos los beneficios durante un año.", 19999, PlanType::Anual, 200, 5, 5, 2),
        seed_plan("Premium Anual", "Acceso completo a todas las herramientas premium por un año.", 29999, PlanType::Anual, 1000, 20, 20, 3),
    ]
}

fn trial_plan() -> PlanInput {
    PlanInput {
        name: TRIAL_PLAN_NAME.to_string(),
        description: "Plan de prueba gratuito por 30 días".to_string(),
        price: Decimal::ZERO,
        plan_type: PlanType::Mensual.as_str().to_string(),
        duration_months: 1,
        max_products: 50,
        max_users: 2,
        max_storage: 5,
        has_crm: true,
        has_ecommerce: true,
        has_analytics: false,
        has_api_access: false,
        is_active: true,
    }
}

pub struct SubscriptionService {
    pool: PgPool,
}

impl SubscriptionService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    // Plans

    pub async fn active_plans(&self) -> ServiceResult<Vec<Plan>> {
        let plans = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE is_active = true ORDER BY price, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(plans)
    }

    pub async fn plan(&self, id: i64) -> ServiceResult<Plan> {
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1 AND is_active = true")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Plan no encontrado"))
    }

    pub async fn create_plan(&self, body: &Value) -> ServiceResult<Plan> {
        let input = PlanInput::from_json(body, None)?;
        let plan = self.upsert_plan(&input).await?.0;
        tracing::info!("Plan '{}' created", plan.name);
        Ok(plan)
    }

    pub async fn update_plan(&self, id: i64, body: &Value) -> ServiceResult<Plan> {
        let current = self.plan(id).await?;
        let input = PlanInput::from_json(body, Some(&current))?;
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            UPDATE plans SET
                name = $2, description = $3, price = $4, plan_type = $5, duration_months = $6,
                max_products = $7, max_users = $8, max_storage = $9, has_crm = $10,
                has_ecommerce = $11, has_analytics = $12, has_api_access = $13, is_active = $14,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.plan_type)
        .bind(input.duration_months)
        .bind(input.max_products)
        .bind(input.max_users)
        .bind(input.max_storage)
        .bind(input.has_crm)
        .bind(input.has_ecommerce)
        .bind(input.has_analytics)
        .bind(input.has_api_access)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(plan)
    }

    pub async fn delete_plan(&self, id: i64) -> ServiceResult<()> {
        let plan = self.plan(id).await?;
        let (in_use,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM subscriptions WHERE plan_id = $1)")
            .bind(plan.id)
            .fetch_one(&self.pool)
            .await?;
        if in_use {
            return Err(ServiceError::Conflict("El plan tiene suscripciones asociadas".to_string()));
        }
        sqlx::query("DELETE FROM plans WHERE id = $1").bind(plan.id).execute(&self.pool).await?;
        tracing::info!("Plan '{}' deleted", plan.name);
        Ok(())
    }

    /// Insert or update a plan by name; the flag tells whether it was new
    async fn upsert_plan(&self, input: &PlanInput) -> ServiceResult<(Plan, bool)> {
        let row = sqlx::query_as::<_, Plan>(
            r#"
            INSERT INTO plans (name, description, price, plan_type, duration_months, max_products, max_users,
                               max_storage, has_crm, has_ecommerce, has_analytics, has_api_access, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (name) DO UPDATE SET
                description = EXCLUDED.description, price = EXCLUDED.price, plan_type = EXCLUDED.plan_type,
                duration_months = EXCLUDED.duration_months, max_products = EXCLUDED.max_products,
                max_users = EXCLUDED.max_users, max_storage = EXCLUDED.max_storage, has_crm = EXCLUDED.has_crm,
                has_ecommerce = EXCLUDED.has_ecommerce, has_analytics = EXCLUDED.has_analytics,
                has_api_access = EXCLUDED.has_api_access, is_active = EXCLUDED.is_active, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.plan_type)
        .bind(input.duration_months)
        .bind(input.max_products)
        .bind(input.max_users)
        .bind(input.max_storage)
        .bind(input.has_crm)
        .bind(input.has_ecommerce)
        .bind(input.has_analytics)
        .bind(input.has_api_access)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await?;
        let created = row.created_at == row.updated_at;
        Ok((row, created))
    }

    pub async fn seed_plans(&self) -> ServiceResult<Vec<(String, bool)>> {
        let mut seeded = Vec::new();
        for input in default_plans() {
            let (plan, created) = self.upsert_plan(&input).await?;
            tracing::info!("Plan '{}' {}", plan.name, if created { "created" } else { "updated" });
            seeded.push((plan.name, created));
        }
        Ok(seeded)
    }

    // Subscriptions, always scoped to the caller's tenant

    pub async fn for_tenant(&self, tenant_id: i64) -> ServiceResult<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(subscription)
    }

    async fn plan_any(&self, id: i64) -> ServiceResult<Plan> {
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Plan no encontrado"))
    }

    async fn view(&self, subscription: Subscription) -> ServiceResult<SubscriptionView> {
        let plan = self.plan_any(subscription.plan_id).await?;
        Ok(SubscriptionView::new(subscription, &plan))
    }

    pub async fn list(&self, tenant_id: i64) -> ServiceResult<Vec<SubscriptionView>> {
        match self.for_tenant(tenant_id).await? {
            Some(subscription) => Ok(vec![self.view(subscription).await?]),
            None => Ok(vec![]),
        }
    }

    async fn find(&self, tenant_id: i64, id: i64) -> ServiceResult<Subscription> {
        sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Suscripción no encontrada"))
    }

    pub async fn get(&self, tenant_id: i64, id: i64) -> ServiceResult<SubscriptionView> {
        let subscription = self.find(tenant_id, id).await?;
        self.view(subscription).await
    }

    /// New subscriptions start with a 14 day trial on the chosen plan
    pub async fn create(&self, tenant: Option<&Tenant>, body: &Value) -> ServiceResult<SubscriptionView> {
        let tenant = tenant.ok_or_else(|| ServiceError::validation(NO_TENANT))?;
        let plan_id = opt_i64(body, "plan").ok_or_else(|| ServiceError::field("plan", "Este campo es requerido."))?;
        let plan = self.plan(plan_id).await?;

        let start = Utc::now();
        let end = start + Duration::days(plan.period_days());
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (tenant_id, plan_id, status, start_date, end_date, trial_end_date,
                                       payment_method, last_payment_date, next_payment_date)
            VALUES ($1, $2, $3, $4, $5, $6, 'manual', $4, $5)
            RETURNING *
            "#,
        )
        .bind(tenant.id)
        .bind(plan.id)
        .bind(SubscriptionStatus::Trial.as_str())
        .bind(start)
        .bind(end)
        .bind(start + Duration::days(14))
        .fetch_one(&self.pool)
        .await?;

        self.activate_tenant(tenant).await?;
        tracing::info!("Tenant '{}' subscribed to plan '{}'", tenant.name, plan.name);
        Ok(SubscriptionView::new(subscription, &plan))
    }

    pub async fn update(&self, tenant_id: i64, id: i64, body: &Value) -> ServiceResult<SubscriptionView> {
        let current = self.find(tenant_id, id).await?;
        let plan_id = match opt_i64(body, "plan") {
            Some(plan_id) => Some(self.plan(plan_id).await?.id),
            None => None,
        };
        let status = opt_str(body, "status");
        if let Some(status) = &status {
            check_choice("status", status, &SubscriptionStatus::values())?;
        }
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions SET
                plan_id = COALESCE($2, plan_id),
                status = COALESCE($3, status),
                payment_method = COALESCE($4, payment_method),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(current.id)
        .bind(plan_id)
        .bind(status)
        .bind(opt_str(body, "payment_method"))
        .fetch_one(&self.pool)
        .await?;
        self.view(subscription).await
    }

    pub async fn delete(&self, tenant_id: i64, id: i64) -> ServiceResult<()> {
        let subscription = self.find(tenant_id, id).await?;
        sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(subscription.id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Subscription {} of tenant {} deleted", subscription.id, tenant_id);
        Ok(())
    }

    pub async fn current(&self, tenant_id: i64) -> ServiceResult<SubscriptionView> {
        let subscription = self
            .for_tenant(tenant_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("No se encontró ninguna suscripción para este tenant"))?;
        self.view(subscription).await
    }

    async fn set_status(&self, id: i64, status: SubscriptionStatus) -> ServiceResult<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "UPDATE subscriptions SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        tracing::info!("Subscription {} is now {}", id, status);
        Ok(subscription)
    }

    pub async fn cancel_current(&self, tenant_id: i64) -> ServiceResult<SubscriptionView> {
        let subscription = self
            .for_tenant(tenant_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("No se encontró ninguna suscripción para cancelar"))?;
        let subscription = self.set_status(subscription.id, SubscriptionStatus::Cancelled).await?;
        self.view(subscription).await
    }

    pub async fn current_usage(&self, tenant_id: i64) -> ServiceResult<Usage> {
        let subscription = self
            .for_tenant(tenant_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("No se encontró ninguna suscripción"))?;
        let plan = self.plan_any(subscription.plan_id).await?;
        Ok(Usage::new(&subscription, &plan))
    }

    pub async fn cancel(&self, tenant_id: i64, id: i64) -> ServiceResult<()> {
        let subscription = self.find(tenant_id, id).await?;
        self.set_status(subscription.id, SubscriptionStatus::Cancelled).await?;
        Ok(())
    }

    /// Extends the end date by one period of the plan and reactivates
    pub async fn renew(&self, tenant_id: i64, id: i64) -> ServiceResult<()> {
        let subscription = self.find(tenant_id, id).await?;
        let plan = self.plan_any(subscription.plan_id).await?;
        sqlx::query("UPDATE subscriptions SET end_date = $2, status = $3, updated_at = NOW() WHERE id = $1")
            .bind(subscription.id)
            .bind(subscription.end_date + Duration::days(plan.period_days()))
            .bind(SubscriptionStatus::Active.as_str())
            .execute(&self.pool)
            .await?;
        tracing::info!("Subscription {} renewed", subscription.id);
        Ok(())
    }

    pub async fn usage(&self, tenant_id: i64, id: i64) -> ServiceResult<Value> {
        let subscription = self.find(tenant_id, id).await?;
        let plan = self.plan_any(subscription.plan_id).await?;
        Ok(json!({
            "products_count": subscription.products_count,
            "max_products": plan.max_products,
            "users_count": subscription.users_count,
            "max_users": plan.max_users,
            "storage_used": subscription.storage_used,
            "max_storage": plan.max_storage,
        }))
    }

    /// Sandbox checkout: activates the plan without a payment gateway
    pub async fn simulate_payment(&self, tenant: Option<&Tenant>, body: &Value) -> ServiceResult<SimulatedPayment> {
        let plan_id = opt_i64(body, "plan_id").ok_or_else(|| ServiceError::validation("plan_id es requerido"))?;
        let tenant = tenant.ok_or_else(|| ServiceError::validation(NO_TENANT))?;
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1 AND is_active = true")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Plan no encontrado o inactivo"))?;

        let now = Utc::now();
        let is_trial = is_trial_plan_name(&plan.name);
        let (status, end_date, trial_end_date) = if is_trial {
            let end = now + Duration::days(30);
            (SubscriptionStatus::Trial, end, Some(end))
        } else {
            let months = i64::from(plan.duration_months.max(1));
            (SubscriptionStatus::Active, now + Duration::days(30 * months), None)
        };

        let subscription = self
            .upsert_subscription(tenant.id, plan.id, status, now, end_date, trial_end_date, "sandbox")
            .await?;
        self.activate_tenant(tenant).await?;
        tracing::info!("Simulated payment for tenant '{}' on plan '{}'", tenant.name, plan.name);

        Ok(SimulatedPayment {
            status: "success",
            message: if is_trial {
                "Prueba activada exitosamente"
            } else {
                "Pago simulado exitosamente"
            },
            subscription: SubscriptionView::new(subscription, &plan),
            is_trial,
            trial_end_date,
            end_date,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn upsert_subscription(
        &self,
        tenant_id: i64,
        plan_id: i64,
        status: SubscriptionStatus,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        trial_end: Option<DateTime<Utc>>,
        payment_method: &str,
    ) -> ServiceResult<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (tenant_id, plan_id, status, start_date, end_date, trial_end_date,
                                       payment_method, last_payment_date, next_payment_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $4, $5)
            ON CONFLICT (tenant_id) DO UPDATE SET
                plan_id = EXCLUDED.plan_id, status = EXCLUDED.status, start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date, trial_end_date = EXCLUDED.trial_end_date,
                payment_method = EXCLUDED.payment_method, last_payment_date = EXCLUDED.last_payment_date,
                next_payment_date = EXCLUDED.next_payment_date, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(plan_id)
        .bind(status.as_str())
        .bind(start)
        .bind(end)
        .bind(trial_end)
        .bind(payment_method)
        .fetch_one(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn activate_tenant(&self, tenant: &Tenant) -> ServiceResult<()> {
        if !tenant.is_active {
            sqlx::query("UPDATE tenants SET is_active = true, updated_at = NOW() WHERE id = $1")
                .bind(tenant.id)
                .execute(&self.pool)
                .await?;
            tracing::info!("Tenant '{}' activated by subscription", tenant.name);
        }
        Ok(())
    }

    /// Puts tenants on a 30 day trial. Tenants that already have a
    /// subscription are left alone unless `all_tenants` is set.
    pub async fn assign_trial(&self, plan_id: Option<i64>, all_tenants: bool) -> ServiceResult<TrialSummary> {
        let plan = match plan_id {
            Some(id) => sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1 AND is_active = true")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ServiceError::not_found(format!("No se encontró un plan activo con ID {}", id)))?,
            None => {
                let existing = sqlx::query_as::<_, Plan>(
                    "SELECT * FROM plans WHERE name ILIKE '%prueba%' AND is_active = true ORDER BY id LIMIT 1",
                )
                .fetch_optional(&self.pool)
                .await?;
                match existing {
                    Some(plan) => plan,
                    None => self.upsert_plan(&trial_plan()).await?.0,
                }
            }
        };

        let tenants = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut summary = TrialSummary {
            plan_id: plan.id,
            plan_name: plan.name.clone(),
            tenants: tenants.len(),
            ..Default::default()
        };

        for tenant in &tenants {
            let existing = match self.for_tenant(tenant.id).await {
                Ok(existing) => existing,
                Err(e) => {
                    tracing::error!("Could not load subscription of tenant {}: {}", tenant.name, e);
                    summary.failed.push((tenant.name.clone(), e.to_string()));
                    continue;
                }
            };
            if existing.is_some() && !all_tenants {
                summary.unchanged += 1;
                continue;
            }
            let now = Utc::now();
            let end = now + Duration::days(30);
            match self
                .upsert_subscription(tenant.id, plan.id, SubscriptionStatus::Trial, now, end, Some(end), "system")
                .await
            {
                Ok(_) if existing.is_some() => summary.updated += 1,
                Ok(_) => summary.created += 1,
                Err(e) => {
                    tracing::error!("Could not assign trial to tenant {}: {}", tenant.name, e);
                    summary.failed.push((tenant.name.clone(), e.to_string()));
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_detection_follows_plan_name() {
        assert!(is_trial_plan_name("Prueba"));
        assert!(is_trial_plan_name("Free Tier"));
        assert!(!is_trial_plan_name("Plan de Prueba"));
        assert!(!is_trial_plan_name("Premium Mensual"));
    }

    #[test]
    fn default_plans_cover_three_tiers_twice() {
        let plans = default_plans();
        assert_eq!(plans.len(), 6);
        let premium = plans.iter().find(|p| p.name == "Premium Anual").unwrap();
        assert_eq!(premium.price, Decimal::new(29999, 2));
        assert_eq!(premium.duration_months, 12);
        assert!(premium.has_api_access);
        let basic = plans.iter().find(|p| p.name == "Básico Mensual").unwrap();
        assert!(!basic.has_crm);
        assert!(!basic.has_analytics);
    }

    #[test]
    fn plan_input_requires_name_and_price() {
        assert!(PlanInput::from_json(&json!({"price": 10}), None).is_err());
        assert!(PlanInput::from_json(&json!({"name": "X"}), None).is_err());
        assert!(PlanInput::from_json(&json!({"name": "X", "price": 1, "plan_type": "semanal"}), None).is_err());

        let input = PlanInput::from_json(&json!({"name": "X", "price": "5.50"}), None).unwrap();
        assert_eq!(input.plan_type, "mensual");
        assert_eq!(input.max_products, 100);
    }

    #[test]
    fn usage_never_reports_negative_remaining() {
        let now = Utc::now();
        let plan: Plan = serde_json::from_value(json!({
            "id": 1, "name": "P", "description": "", "price": "1.00", "plan_type": "mensual",
            "duration_months": 1, "max_products": 2, "max_users": 1, "max_storage": 1,
            "has_crm": true, "has_ecommerce": true, "has_analytics": false, "has_api_access": false,
            "is_active": true, "created_at": now, "updated_at": now
        }))
        .unwrap();
        let subscription: Subscription = serde_json::from_value(json!({
            "id": 1, "tenant_id": 1, "plan_id": 1, "status": "active", "start_date": now,
            "end_date": now, "trial_end_date": null, "products_count": 5, "users_count": 1,
            "storage_used": 3, "payment_method": "manual", "last_payment_date": null,
            "next_payment_date": null, "created_at": now, "updated_at": now
        }))
        .unwrap();
        let usage = Usage::new(&subscription, &plan);
        assert_eq!(usage.products.remaining, 0);
        assert_eq!(usage.users.remaining, 0);
        assert_eq!(usage.storage.remaining, 0.0);
    }
}
