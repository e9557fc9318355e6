use axum::{extract::Path, Extension, Json};
use serde_json::Value;

use crate::database::models::{PaymentMethod, PaymentTransaction};
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, TenantContext};
use crate::services::payment_service::PaymentService;

pub async fn method_list(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<PaymentMethod>> {
    let methods = PaymentService::new()
        .await?
        .list_methods(tenant.require()?, current.tienda.as_ref())
        .await?;
    Ok(ApiResponse::success(methods))
}

pub async fn method_create(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> ApiResult<PaymentMethod> {
    let method = PaymentService::new()
        .await?
        .create_method(tenant.require()?, current.tienda.as_ref(), &body)
        .await?;
    Ok(ApiResponse::created(method))
}

pub async fn method_get(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<PaymentMethod> {
    let method = PaymentService::new()
        .await?
        .get_method(tenant.require()?, current.tienda.as_ref(), id)
        .await?;
    Ok(ApiResponse::success(method))
}

pub async fn method_update(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<PaymentMethod> {
    let method = PaymentService::new()
        .await?
        .update_method(tenant.require()?, current.tienda.as_ref(), id, &body)
        .await?;
    Ok(ApiResponse::success(method))
}

pub async fn method_delete(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    PaymentService::new()
        .await?
        .delete_method(tenant.require()?, current.tienda.as_ref(), id)
        .await?;
    Ok(ApiResponse::no_content())
}

pub async fn transaction_list(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<PaymentTransaction>> {
    let transactions = PaymentService::new()
        .await?
        .list_transactions(tenant.require()?, current.tienda.as_ref())
        .await?;
    Ok(ApiResponse::success(transactions))
}

pub async fn transaction_create(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> ApiResult<PaymentTransaction> {
    let transaction = PaymentService::new()
        .await?
        .create_transaction(tenant.require()?, current.tienda.as_ref(), &body)
        .await?;
    Ok(ApiResponse::created(transaction))
}

pub async fn transaction_get(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<PaymentTransaction> {
    let transaction = PaymentService::new()
        .await?
        .get_transaction(tenant.require()?, current.tienda.as_ref(), id)
        .await?;
    Ok(ApiResponse::success(transaction))
}

pub async fn transaction_update(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<PaymentTransaction> {
    let transaction = PaymentService::new()
        .await?
        .update_transaction(tenant.require()?, current.tienda.as_ref(), id, &body)
        .await?;
    Ok(ApiResponse::success(transaction))
}

pub async fn transaction_delete(
    Extension(current): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    PaymentService::new()
        .await?
        .delete_transaction(tenant.require()?, current.tienda.as_ref(), id)
        .await?;
    Ok(ApiResponse::no_content())
}
