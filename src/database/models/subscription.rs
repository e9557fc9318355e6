use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

choices! {
    PlanType {
        Mensual => ("mensual", "Mensual"),
        Anual => ("anual", "Anual"),
    }
}

choices! {
    SubscriptionStatus {
        Active => ("active", "Activa"),
        Cancelled => ("cancelled", "Cancelada"),
        Expired => ("expired", "Expirada"),
        Trial => ("trial", "Prueba"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: i64,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn is_annual(&self) -> bool {
        self.plan_type == PlanType::Anual.as_str()
    }

    pub fn price_per_month(&self) -> Decimal {
        if self.is_annual() {
            (self.price / Decimal::from(12)).round_dp(2)
        } else {
            self.price
        }
    }

    /// Days a paid period lasts
    pub fn period_days(&self) -> i64 {
        if self.is_annual() {
            365
        } else {
            30
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        value["price_per_month"] = serde_json::json!(self.price_per_month());
        value["plan_type_display"] = serde_json::json!(PlanType::label_of(&self.plan_type));
        value
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub tenant_id: i64,
    pub plan_id: i64,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub products_count: i32,
    pub users_count: i32,
    pub storage_used: i32,
    pub payment_method: String,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub next_payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active.as_str() && self.end_date > now
    }

    pub fn is_trial_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Trial.as_str()
            && self.trial_end_date.map(|end| end > now).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    pub fn is_trial(&self) -> bool {
        self.is_trial_at(Utc::now())
    }

    /// Active or in a running trial
    pub fn grants_access(&self) -> bool {
        self.is_active() || self.is_trial()
    }

    pub fn can_add_product(&self, plan: &Plan) -> bool {
        self.products_count < plan.max_products
    }

    pub fn can_add_user(&self, plan: &Plan) -> bool {
        self.users_count < plan.max_users
    }

    pub fn can_use_storage(&self, plan: &Plan, size: i32) -> bool {
        self.storage_used + size <= plan.max_storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn plan(plan_type: &str, price: i64) -> Plan {
        let now = Utc::now();
        Plan {
            id: 1,
            name: "Plan".into(),
            description: String::new(),
            price: Decimal::from(price),
            plan_type: plan_type.into(),
            duration_months: if plan_type == "anual" { 12 } else { 1 },
            max_products: 2,
            max_users: 1,
            max_storage: 5,
            has_crm: true,
            has_ecommerce: true,
            has_analytics: false,
            has_api_access: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn subscription(status: &str, end: DateTime<Utc>, trial_end: Option<DateTime<Utc>>) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: 1,
            tenant_id: 1,
            plan_id: 1,
            status: status.into(),
            start_date: now,
            end_date: end,
            trial_end_date: trial_end,
            products_count: 1,
            users_count: 1,
            storage_used: 4,
            payment_method: "manual".into(),
            last_payment_date: None,
            next_payment_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn annual_plans_report_monthly_price() {
        assert_eq!(plan("anual", 1200).price_per_month(), Decimal::from(100));
        assert_eq!(plan("mensual", 99).price_per_month(), Decimal::from(99));
        assert_eq!(plan("anual", 1).period_days(), 365);
    }

    #[test]
    fn active_requires_future_end_date() {
        let now = Utc::now();
        assert!(subscription("active", now + Duration::days(1), None).is_active_at(now));
        assert!(!subscription("active", now - Duration::days(1), None).is_active_at(now));
        assert!(!subscription("cancelled", now + Duration::days(1), None).is_active_at(now));
    }

    #[test]
    fn trial_requires_future_trial_end() {
        let now = Utc::now();
        let running = subscription("trial", now + Duration::days(30), Some(now + Duration::days(14)));
        assert!(running.is_trial_at(now));
        let lapsed = subscription("trial", now + Duration::days(30), Some(now - Duration::days(1)));
        assert!(!lapsed.is_trial_at(now));
        assert!(!subscription("trial", now, None).is_trial_at(now));
    }

    #[test]
    fn limits_follow_plan() {
        let p = plan("mensual", 10);
        let s = subscription("active", Utc::now(), None);
        assert!(s.can_add_product(&p));
        assert!(!s.can_add_user(&p));
        assert!(s.can_use_storage(&p, 1));
        assert!(!s.can_use_storage(&p, 2));
    }
}
