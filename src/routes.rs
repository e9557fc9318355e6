// Paths are written out in full so path-aware middleware such as the
// subscription guard sees the real request path.
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config;
use crate::database::manager::DatabaseManager;
use crate::handlers::{elevated, protected, public, storefront};
use crate::middleware::{
    jwt_auth_middleware, request_audit_middleware, storefront_auth_middleware, subscription_guard,
    tenant_context_middleware,
};

pub fn app() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_routes())
        .merge(storefront_routes())
        .merge(protected_routes())
        .layer(DefaultBodyLimit::max(config::config().api.max_request_size_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// No token required
pub fn public_routes() -> Router {
    use public::{auth, catalogue, customers};

    Router::new()
        // Staff accounts
        .route("/api/login", post(auth::login))
        .route("/api/users/login", post(auth::login))
        .route("/api/register", post(auth::register))
        .route("/api/token/refresh", post(auth::refresh))
        .route("/api/users/token/refresh", post(auth::refresh))
        .route("/api/users/password-reset", post(auth::password_reset))
        .route("/api/users/password-reset/confirm", post(auth::password_reset_confirm))
        // Storefront customers
        .route("/api/users-public/register", post(customers::register))
        .route("/api/users-public/login", post(customers::login))
        // Published stores
        .route("/api/tiendas/tiendas/:tienda/public_store", get(catalogue::public_store))
        .route("/api/tiendas/tiendas/:tienda/public_products", get(catalogue::public_products))
        .route("/api/tiendas/tiendas/:tienda/public_categories", get(catalogue::public_categories))
        .route(
            "/api/store-style/estilo-publico/:slug",
            get(catalogue::style_get).patch(catalogue::style_patch),
        )
        .route("/api/store-style/tiendas/:slug/public_store", get(catalogue::styled_store))
        .route("/api/payments/public/:slug", get(catalogue::payment_methods))
        .route("/api/subscriptions/plans/public", get(catalogue::plans))
        .route("/api/subscriptions/plans/base", get(catalogue::plans))
}

/// Storefront customer token
pub fn storefront_routes() -> Router {
    Router::new()
        .route(
            "/api/users-public/profile/:id",
            get(storefront::profile_get).patch(storefront::profile_patch),
        )
        .route("/api/guardar", post(storefront::save_purchase))
        .route("/api/pedidos-publicos/mis-pedidos", get(storefront::my_orders))
        .route_layer(from_fn(storefront_auth_middleware))
}

/// Staff access token. Layers run bottom-up: jwt, tenant context, audit.
pub fn protected_routes() -> Router {
    Router::new()
        .merge(user_routes())
        .merge(tienda_routes())
        .merge(pedido_routes())
        .merge(category_routes())
        .merge(public_order_routes())
        .merge(lead_routes())
        .merge(payment_routes())
        .merge(subscription_routes())
        .merge(audit_routes())
        .merge(backup_routes())
        .merge(store_style_routes())
        .merge(elevated_routes())
        .route_layer(from_fn(request_audit_middleware))
        .route_layer(from_fn(tenant_context_middleware))
        .route_layer(from_fn(jwt_auth_middleware))
}

fn user_routes() -> Router {
    use protected::users;

    Router::new()
        .route("/api/users/profile", get(users::profile))
        .route(
            "/api/users/profile/update",
            axum::routing::put(users::update_profile).patch(users::update_profile),
        )
        .route("/api/users/profile/picture", post(users::profile_picture))
        .route("/api/users/profile/password", post(users::change_password))
        .route("/api/users/company/customize", post(users::customize_company))
        .route("/api/users/crear-usuario-interno", post(users::create_internal_user))
        .route("/api/users/logout", post(users::logout))
}

fn tienda_routes() -> Router {
    use protected::tiendas;

    Router::new()
        .route("/api/tiendas/tiendas", get(tiendas::tienda_list).post(tiendas::tienda_create))
        .route("/api/tiendas/tiendas/tienda-por-usuario", get(tiendas::tienda_por_usuario))
        .route(
            "/api/tiendas/tiendas/config",
            get(tiendas::config_get).patch(tiendas::config_patch),
        )
        .route(
            "/api/tiendas/tiendas/:tienda",
            get(tiendas::tienda_get)
                .put(tiendas::tienda_update)
                .patch(tiendas::tienda_update)
                .delete(tiendas::tienda_delete),
        )
        .route(
            "/api/tiendas/categorias",
            get(tiendas::categoria_list).post(tiendas::categoria_create),
        )
        .route(
            "/api/tiendas/categorias/:id",
            get(tiendas::categoria_get)
                .put(tiendas::categoria_update)
                .patch(tiendas::categoria_update)
                .delete(tiendas::categoria_delete),
        )
        .route(
            "/api/tiendas/productos",
            get(tiendas::producto_list).post(tiendas::producto_create),
        )
        .route("/api/tiendas/productos/low-stock", get(tiendas::producto_low_stock))
        .route(
            "/api/tiendas/productos/:id",
            get(tiendas::producto_get)
                .put(tiendas::producto_update)
                .patch(tiendas::producto_update)
                .delete(tiendas::producto_delete),
        )
}

fn pedido_routes() -> Router {
    use protected::pedidos;

    Router::new()
        .route("/api/tiendas/pedidos", get(pedidos::list).post(pedidos::create))
        .route(
            "/api/tiendas/pedidos/:id",
            get(pedidos::get)
                .put(pedidos::update)
                .patch(pedidos::update)
                .delete(pedidos::delete),
        )
        .route("/api/tiendas/pedidos/:id/actualizar_estado", post(pedidos::update_status))
        .route(
            "/api/tiendas/pedidos/:id/agregar_codigo_seguimiento",
            post(pedidos::add_tracking_code),
        )
        .route("/api/tiendas/notificaciones-pedido", get(pedidos::notification_list))
        .route("/api/tiendas/notificaciones-pedido/:id", get(pedidos::notification_get))
        .route(
            "/api/tiendas/notificaciones-pedido/:id/marcar_como_leido",
            post(pedidos::notification_mark_read),
        )
}

fn category_routes() -> Router {
    use protected::categories;

    Router::new()
        .route("/api/categories", get(categories::list).post(categories::create))
        .route(
            "/api/categories/:id",
            get(categories::get)
                .put(categories::update)
                .patch(categories::update)
                .delete(categories::delete),
        )
}

fn public_order_routes() -> Router {
    use protected::public_orders;

    Router::new()
        .route("/api/pedidos-publicos", get(public_orders::list))
        .route("/api/pedidos-publicos/por_tienda", get(public_orders::by_store))
        .route("/api/pedidos-publicos/:id", get(public_orders::get))
        .route(
            "/api/pedidos-publicos/:id/actualizar_estado",
            post(public_orders::update_status),
        )
        .route(
            "/api/pedidos-publicos/:id/agregar_codigo_seguimiento",
            post(public_orders::add_tracking_code),
        )
}

fn lead_routes() -> Router {
    use protected::leads;

    Router::new()
        .route("/api/leads", get(leads::list).post(leads::create))
        .route("/api/leads/metricas", get(leads::metrics))
        .route("/api/leads/leads_recientes", get(leads::recent))
        .route("/api/leads/leads_activos", get(leads::active))
        .route("/api/leads/emails", get(leads::emails))
        .route(
            "/api/leads/:id",
            get(leads::get).put(leads::update).patch(leads::update).delete(leads::delete),
        )
        .route("/api/leads/:id/actualizar_estado", post(leads::update_status))
        .route(
            "/api/leads/:id/interacciones",
            get(leads::interactions).post(leads::add_interaction),
        )
}

fn payment_routes() -> Router {
    use protected::payments;

    Router::new()
        .route(
            "/api/payments/methods",
            get(payments::method_list).post(payments::method_create),
        )
        .route(
            "/api/payments/methods/:id",
            get(payments::method_get)
                .put(payments::method_update)
                .patch(payments::method_update)
                .delete(payments::method_delete),
        )
        .route(
            "/api/payments/transactions",
            get(payments::transaction_list).post(payments::transaction_create),
        )
        .route(
            "/api/payments/transactions/:id",
            get(payments::transaction_get)
                .put(payments::transaction_update)
                .patch(payments::transaction_update)
                .delete(payments::transaction_delete),
        )
}

/// Guarded by an active subscription, see `subscription::is_exempt`
fn subscription_routes() -> Router {
    use protected::subscriptions as subs;

    Router::new()
        .route("/api/subscriptions/plans", get(subs::plan_list).post(subs::plan_create))
        .route(
            "/api/subscriptions/plans/:id",
            get(subs::plan_get)
                .put(subs::plan_update)
                .patch(subs::plan_update)
                .delete(subs::plan_delete),
        )
        .route("/api/subscriptions/subscriptions", get(subs::list).post(subs::create))
        .route("/api/subscriptions/subscriptions/current", get(subs::current))
        .route("/api/subscriptions/subscriptions/cancel", post(subs::cancel_current))
        .route("/api/subscriptions/subscriptions/usage", get(subs::current_usage))
        .route(
            "/api/subscriptions/subscriptions/:id",
            get(subs::get).put(subs::update).patch(subs::update).delete(subs::delete),
        )
        .route("/api/subscriptions/subscriptions/:id/cancel", post(subs::cancel))
        .route("/api/subscriptions/subscriptions/:id/renew", post(subs::renew))
        .route("/api/subscriptions/subscriptions/:id/usage", get(subs::usage))
        .route("/api/subscriptions/simulate-payment", post(subs::simulate_payment))
        .route_layer(from_fn(subscription_guard))
}

fn audit_routes() -> Router {
    use protected::audit;

    Router::new()
        .route("/api/audit-logs", get(audit::list).post(audit::create))
        .route("/api/audit-logs/actions", get(audit::actions))
        .route("/api/audit-logs/report", get(audit::report))
        .route("/api/audit-logs/user_activity", get(audit::user_activity))
        .route("/api/audit-logs/:id", get(audit::get))
}

fn backup_routes() -> Router {
    use protected::backups;

    Router::new()
        .route("/api/backups", get(backups::list).post(backups::create))
        .route("/api/backups/restore_from_file", post(backups::restore_from_file))
        .route("/api/backups/:id", get(backups::get).delete(backups::delete))
        .route("/api/backups/:id/restore", post(backups::restore))
        .route("/api/backups/:id/download", get(backups::download))
}

fn store_style_routes() -> Router {
    use protected::store_style as style;

    Router::new()
        .route("/api/store-style", get(style::list).post(style::create))
        .route(
            "/api/store-style/mi-estilo",
            get(style::my_style).patch(style::update_my_style),
        )
        .route("/api/store-style/bloques", get(style::bloque_list).post(style::bloque_create))
        .route("/api/store-style/bloques/crear-multiples", post(style::bloque_create_many))
        .route(
            "/api/store-style/bloques/:id",
            get(style::bloque_get)
                .put(style::bloque_update)
                .patch(style::bloque_update)
                .delete(style::bloque_delete),
        )
        .route(
            "/api/store-style/:id",
            get(style::get)
                .put(style::update)
                .patch(style::update)
                .delete(style::delete),
        )
}

/// Admin only; the permission check happens in each handler
fn elevated_routes() -> Router {
    Router::new()
        .route(
            "/api/root/tenants",
            get(elevated::tenant_list).post(elevated::tenant_create),
        )
        .route("/api/root/tenants/:id", get(elevated::tenant_get))
        .route("/api/root/tenants/:id/activate", post(elevated::tenant_activate))
        .route("/api/root/tenants/:id/deactivate", post(elevated::tenant_deactivate))
        .route("/api/admin/users", get(elevated::active_users))
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Tienda CRM API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Multi-tenant store and CRM backend",
            "endpoints": {
                "auth": "/api/login, /api/register, /api/token/refresh (public)",
                "users": "/api/users/* (protected)",
                "stores": "/api/tiendas/* (protected; public_store etc. public)",
                "storefront": "/api/users-public/*, /api/guardar, /api/pedidos-publicos/mis-pedidos (customer token)",
                "leads": "/api/leads/* (protected)",
                "payments": "/api/payments/* (protected; /public/:slug public)",
                "subscriptions": "/api/subscriptions/* (protected, active subscription)",
                "audit": "/api/audit-logs (protected)",
                "backups": "/api/backups (protected)",
                "store_style": "/api/store-style/* (protected; estilo-publico public)",
                "root": "/api/root/tenants, /api/admin/users (admin)",
            }
        }
    }))
}

async fn health() -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": { "status": "degraded", "timestamp": now, "database_error": e.to_string() }
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    async fn call(method: Method, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {}", token));
        }
        let response = app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn root_describes_the_service() {
        let (status, body) = call(Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Tienda CRM API");
    }

    #[tokio::test]
    async fn protected_routes_require_a_bearer_token() {
        for uri in [
            "/api/users/profile",
            "/api/leads",
            "/api/backups",
            "/api/subscriptions/subscriptions",
            "/api/root/tenants",
        ] {
            let (status, body) = call(Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(body["error"], true);
        }
    }

    #[tokio::test]
    async fn garbage_tokens_are_rejected_before_any_lookup() {
        let (status, _) = call(Method::GET, "/api/tiendas/tiendas", Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(Method::GET, "/api/pedidos-publicos/mis-pedidos", Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let (status, _) = call(Method::GET, "/api/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
