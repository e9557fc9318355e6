// Storefront handlers: require a storefront token issued by
// POST /api/users-public/login. The authenticated customer arrives as an
// `Extension<StorefrontUser>`.
use axum::{extract::Path, Extension, Json};
use serde_json::{json, Value};

use crate::database::models::StorefrontUser;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::storefront_service::{PedidoPublicoView, StorefrontService};

/// GET /api/users-public/profile/:id
pub async fn profile_get(
    Extension(customer): Extension<StorefrontUser>,
    Path(id): Path<i64>,
) -> ApiResult<StorefrontUser> {
    Ok(ApiResponse::success(StorefrontService::new().await?.profile(&customer, id).await?))
}

/// PATCH /api/users-public/profile/:id
pub async fn profile_patch(
    Extension(customer): Extension<StorefrontUser>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<StorefrontUser> {
    let updated = StorefrontService::new().await?.update_profile(&customer, id, &body).await?;
    Ok(ApiResponse::success(updated))
}

/// POST /api/guardar - checkout
pub async fn save_purchase(
    Extension(customer): Extension<StorefrontUser>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    let pedido_id = StorefrontService::new().await?.save_purchase(&customer, &body).await?;
    Ok(ApiResponse::created(json!({
        "message": "Compra guardada con éxito",
        "pedido_id": pedido_id,
    })))
}

/// GET /api/pedidos-publicos/mis-pedidos
pub async fn my_orders(Extension(customer): Extension<StorefrontUser>) -> ApiResult<Vec<PedidoPublicoView>> {
    Ok(ApiResponse::success(StorefrontService::new().await?.my_orders(&customer).await?))
}
