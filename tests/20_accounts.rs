mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn registered_user_reads_and_updates_profile() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = reqwest::Client::new();
    let username = common::unique("perfil");
    let token = common::register(server, &client, &username).await?;

    let profile: Value = client
        .get(format!("{}/api/users/profile", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(profile["data"]["username"], username.as_str());

    let res = client
        .patch(format!("{}/api/users/profile/update", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "first_name": "Ana" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await?;
    assert_eq!(updated["data"]["first_name"], "Ana");
    Ok(())
}

#[tokio::test]
async fn login_accepts_username_and_rejects_bad_passwords() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = reqwest::Client::new();
    let username = common::unique("login");
    common::register(server, &client, &username).await?;

    let ok = client
        .post(format!("{}/api/login", server.base_url))
        .json(&json!({ "username": username, "password": "contraseña-segura" }))
        .send()
        .await?;
    assert_eq!(ok.status(), StatusCode::OK);
    let body: Value = ok.json().await?;
    assert!(body["data"]["refresh"].is_string());

    let refreshed = client
        .post(format!("{}/api/token/refresh", server.base_url))
        .json(&json!({ "refresh": body["data"]["refresh"] }))
        .send()
        .await?;
    assert_eq!(refreshed.status(), StatusCode::OK);

    let bad = client
        .post(format!("{}/api/login", server.base_url))
        .json(&json!({ "username": username, "password": "incorrecta" }))
        .send()
        .await?;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn subscription_routes_need_an_active_plan() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = reqwest::Client::new();
    let token = common::register(server, &client, &common::unique("plan")).await?;

    // Fresh tenants have no subscription yet
    let res = client
        .get(format!("{}/api/subscriptions/subscriptions", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "Se requiere una suscripción activa");

    // Plan catalogue stays reachable for onboarding
    let res = client
        .get(format!("{}/api/subscriptions/plans/public", server.base_url))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn staff_can_open_a_single_store() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = reqwest::Client::new();
    let username = common::unique("tienda");
    let token = common::register(server, &client, &username).await?;

    let url = format!("{}/api/tiendas/tiendas", server.base_url);
    let first = client
        .post(&url)
        .bearer_auth(&token)
        .json(&json!({ "nombre": format!("Tienda {}", username) }))
        .send()
        .await?;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = client
        .post(&url)
        .bearer_auth(&token)
        .json(&json!({ "nombre": "Otra tienda" }))
        .send()
        .await?;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);

    let mine = client
        .get(format!("{}/api/tiendas/tiendas/tienda-por-usuario", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(mine.status(), StatusCode::OK);
    Ok(())
}
