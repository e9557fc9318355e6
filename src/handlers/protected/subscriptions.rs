use axum::{extract::Path, http::Method, Extension, Json};
use serde_json::{json, Value};

use crate::database::models::Plan;
use crate::middleware::{require, ApiResponse, ApiResult, CurrentUser, Permission, TenantContext};
use crate::services::subscription_service::{SimulatedPayment, SubscriptionService, SubscriptionView, Usage};

// Plans

pub async fn plan_list() -> ApiResult<Vec<Value>> {
    let plans = SubscriptionService::new().await?.active_plans().await?;
    Ok(ApiResponse::success(plans.iter().map(Plan::to_json).collect()))
}

pub async fn plan_get(Path(id): Path<i64>) -> ApiResult<Value> {
    Ok(ApiResponse::success(SubscriptionService::new().await?.plan(id).await?.to_json()))
}

pub async fn plan_create(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    require(&current, &method, Permission::Admin)?;
    let plan = SubscriptionService::new().await?.create_plan(&body).await?;
    Ok(ApiResponse::created(plan.to_json()))
}

pub async fn plan_update(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    require(&current, &method, Permission::Admin)?;
    let plan = SubscriptionService::new().await?.update_plan(id, &body).await?;
    Ok(ApiResponse::success(plan.to_json()))
}

pub async fn plan_delete(
    method: Method,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    require(&current, &method, Permission::Admin)?;
    SubscriptionService::new().await?.delete_plan(id).await?;
    Ok(ApiResponse::no_content())
}

// Subscriptions

pub async fn list(Extension(tenant): Extension<TenantContext>) -> ApiResult<Vec<SubscriptionView>> {
    Ok(ApiResponse::success(SubscriptionService::new().await?.list(tenant.require()?).await?))
}

/// POST /api/subscriptions/subscriptions - starts a trial of the plan
pub async fn create(Extension(tenant): Extension<TenantContext>, Json(body): Json<Value>) -> ApiResult<SubscriptionView> {
    let view = SubscriptionService::new().await?.create(tenant.tenant.as_ref(), &body).await?;
    Ok(ApiResponse::created(view))
}

pub async fn get(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<SubscriptionView> {
    Ok(ApiResponse::success(SubscriptionService::new().await?.get(tenant.require()?, id).await?))
}

pub async fn update(
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<SubscriptionView> {
    let view = SubscriptionService::new().await?.update(tenant.require()?, id, &body).await?;
    Ok(ApiResponse::success(view))
}

pub async fn delete(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<()> {
    SubscriptionService::new().await?.delete(tenant.require()?, id).await?;
    Ok(ApiResponse::no_content())
}

/// GET /api/subscriptions/subscriptions/current
pub async fn current(Extension(tenant): Extension<TenantContext>) -> ApiResult<SubscriptionView> {
    Ok(ApiResponse::success(SubscriptionService::new().await?.current(tenant.require()?).await?))
}

/// POST /api/subscriptions/subscriptions/cancel
pub async fn cancel_current(Extension(tenant): Extension<TenantContext>) -> ApiResult<Value> {
    let view = SubscriptionService::new().await?.cancel_current(tenant.require()?).await?;
    Ok(ApiResponse::success(json!({
        "status": "success",
        "message": "Suscripción cancelada exitosamente",
        "subscription": view,
    })))
}

/// GET /api/subscriptions/subscriptions/usage
pub async fn current_usage(Extension(tenant): Extension<TenantContext>) -> ApiResult<Usage> {
    Ok(ApiResponse::success(SubscriptionService::new().await?.current_usage(tenant.require()?).await?))
}

/// POST /api/subscriptions/subscriptions/:id/cancel
pub async fn cancel(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<Value> {
    SubscriptionService::new().await?.cancel(tenant.require()?, id).await?;
    Ok(ApiResponse::success(json!({ "status": "subscription cancelled" })))
}

/// POST /api/subscriptions/subscriptions/:id/renew
pub async fn renew(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<Value> {
    SubscriptionService::new().await?.renew(tenant.require()?, id).await?;
    Ok(ApiResponse::success(json!({ "status": "subscription renewed" })))
}

/// GET /api/subscriptions/subscriptions/:id/usage
pub async fn usage(Extension(tenant): Extension<TenantContext>, Path(id): Path<i64>) -> ApiResult<Value> {
    Ok(ApiResponse::success(SubscriptionService::new().await?.usage(tenant.require()?, id).await?))
}

/// POST /api/subscriptions/simulate-payment
pub async fn simulate_payment(
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> ApiResult<SimulatedPayment> {
    let payment = SubscriptionService::new()
        .await?
        .simulate_payment(tenant.tenant.as_ref(), &body)
        .await?;
    Ok(ApiResponse::success(payment))
}
