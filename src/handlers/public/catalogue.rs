use axum::{extract::Path, Json};
use serde_json::Value;

use crate::database::models::{Categoria, PaymentMethod, Plan, Producto, Tienda};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::payment_service::PaymentService;
use crate::services::store_style_service::{PublicStore, StoreStyleService, StyleView};
use crate::services::subscription_service::SubscriptionService;
use crate::services::tienda_service::TiendaService;

/// GET /api/tiendas/tiendas/:slug/public_store
pub async fn public_store(Path(slug): Path<String>) -> ApiResult<Tienda> {
    let tienda = TiendaService::new().await?.published_by_slug(&slug).await?;
    Ok(ApiResponse::success(tienda))
}

/// GET /api/tiendas/tiendas/:slug/public_products
pub async fn public_products(Path(slug): Path<String>) -> ApiResult<Vec<Producto>> {
    let productos = TiendaService::new().await?.public_products(&slug).await?;
    Ok(ApiResponse::success(productos))
}

/// GET /api/tiendas/tiendas/:slug/public_categories
pub async fn public_categories(Path(slug): Path<String>) -> ApiResult<Vec<Categoria>> {
    let categorias = TiendaService::new().await?.public_categories(&slug).await?;
    Ok(ApiResponse::success(categorias))
}

/// GET /api/store-style/estilo-publico/:slug
pub async fn style_get(Path(slug): Path<String>) -> ApiResult<StyleView> {
    Ok(ApiResponse::success(StoreStyleService::new().await?.public_style(&slug).await?))
}

/// PATCH /api/store-style/estilo-publico/:slug
pub async fn style_patch(Path(slug): Path<String>, Json(body): Json<Value>) -> ApiResult<StyleView> {
    let view = StoreStyleService::new().await?.update_public_style(&slug, &body).await?;
    Ok(ApiResponse::success(view))
}

/// GET /api/store-style/tiendas/:slug/public_store
pub async fn styled_store(Path(slug): Path<String>) -> ApiResult<PublicStore> {
    Ok(ApiResponse::success(StoreStyleService::new().await?.public_store(&slug).await?))
}

/// GET /api/payments/public/:slug
pub async fn payment_methods(Path(slug): Path<String>) -> ApiResult<Vec<PaymentMethod>> {
    Ok(ApiResponse::success(PaymentService::new().await?.public_methods(&slug).await?))
}

/// GET /api/subscriptions/plans/public and /plans/base
pub async fn plans() -> ApiResult<Vec<Value>> {
    let plans = SubscriptionService::new().await?.active_plans().await?;
    Ok(ApiResponse::success(plans.iter().map(Plan::to_json).collect()))
}
