mod common;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use common::TestServer;

async fn post(client: &Client, server: &TestServer, token: &str, path: &str, body: Value) -> Result<(StatusCode, Value)> {
    let res = client
        .post(format!("{}{}", server.base_url, path))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await?;
    let status = res.status();
    let body = res.json().await.unwrap_or(Value::Null);
    Ok((status, body))
}

async fn get(client: &Client, server: &TestServer, token: &str, path: &str) -> Result<Value> {
    let res = client
        .get(format!("{}{}", server.base_url, path))
        .bearer_auth(token)
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::OK, "GET {} returned {}", path, res.status());
    Ok(res.json::<Value>().await?["data"].clone())
}

async fn create_product(client: &Client, server: &TestServer, token: &str, nombre: &str, precio: &str) -> Result<i64> {
    let (status, body) = post(
        client,
        server,
        token,
        "/api/tiendas/productos",
        json!({ "nombre": nombre, "precio": precio, "stock": 10 }),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "product create returned {}: {}", status, body);
    body["data"]["id"].as_i64().context("product without id")
}

/// Leads are written by background observers, so poll for them
async fn wait_for_lead(client: &Client, server: &TestServer, token: &str, email: &str, compras: i64) -> Result<Value> {
    for _ in 0..40 {
        let leads = get(client, server, token, "/api/leads").await?;
        let found = leads
            .as_array()
            .into_iter()
            .flatten()
            .find(|l| l["email"] == email && l["total_compras"].as_i64().unwrap_or(0) >= compras);
        if let Some(lead) = found {
            return Ok(lead.clone());
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    anyhow::bail!("no lead for {} with {} purchases", email, compras)
}

#[tokio::test]
async fn staff_orders_total_their_lines() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = Client::new();
    let username = common::unique("pedido");
    let token = common::register(server, &client, &username).await?;
    common::create_store(server, &client, &token, &format!("Tienda {}", username)).await?;

    let taza = create_product(&client, server, &token, "Taza", "10.50").await?;
    let plato = create_product(&client, server, &token, "Plato", "7.00").await?;

    let (status, body) = post(
        &client,
        server,
        &token,
        "/api/tiendas/pedidos",
        json!({
            "direccion_entrega": "Av. Siempre Viva 742",
            "detalles": [
                { "producto": taza, "cantidad": 2 },
                { "producto": plato, "cantidad": 1, "precio_unitario": "3.00" },
            ],
        }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let pedido = &body["data"];
    let lines: f64 = pedido["detalles"]
        .as_array()
        .context("order without lines")?
        .iter()
        .map(|d| common::money(&d["subtotal"]))
        .sum();
    assert_eq!(common::money(&pedido["total"]), 24.0);
    assert_eq!(lines, 24.0);
    assert_eq!(pedido["estado"], "pendiente");
    Ok(())
}

#[tokio::test]
async fn second_store_is_refused_with_message() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = Client::new();
    let username = common::unique("unica");
    let token = common::register(server, &client, &username).await?;
    common::create_store(server, &client, &token, &format!("Tienda {}", username)).await?;

    let (status, body) = post(&client, server, &token, "/api/tiendas/tiendas", json!({ "nombre": "Segunda" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.to_string().contains("Ya tienes una tienda creada"), "{}", body);
    Ok(())
}

#[tokio::test]
async fn storefront_checkout_mirrors_order_and_records_purchases() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = Client::new();
    let username = common::unique("vitrina");
    let token = common::register(server, &client, &username).await?;
    let tienda = common::create_store(server, &client, &token, &format!("Vitrina {}", username)).await?;
    let slug = tienda["slug"].as_str().context("store without slug")?.to_string();
    create_product(&client, server, &token, "Mate", "12.00").await?;

    let email = format!("{}@cliente.test", username);
    let res = client
        .post(format!("{}/api/users-public/register", server.base_url))
        .json(&json!({ "email": email, "password": "clave-cliente", "tienda_slug": slug, "first_name": "Lu" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    // The customer's own lead is created in the background first
    wait_for_lead(&client, server, &token, &email, 0).await?;

    let login: Value = client
        .post(format!("{}/api/users-public/login", server.base_url))
        .json(&json!({ "email": email, "password": "clave-cliente", "slug": slug }))
        .send()
        .await?
        .json()
        .await?;
    let customer_token = login["data"]["token"].as_str().context("storefront login without token")?.to_string();
    let customer_id = login["data"]["user_id"].as_i64().context("storefront login without user id")?;

    let purchase = |cantidad: i64| {
        json!({
            "slug": slug,
            "usuario": customer_id,
            "nombre": "Lu",
            "apellido": "Pérez",
            "direccion": "Calle 1",
            "metodo_pago": "efectivo",
            "detalles": [
                { "nombre_producto": "Mate", "cantidad": cantidad, "precio_unitario": "12.00" },
                { "nombre_producto": "Bombilla", "cantidad": 1, "precio_unitario": "4.50" },
            ],
        })
    };

    let (status, body) = post(&client, server, &customer_token, "/api/guardar", purchase(2)).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let pedido_id = body["data"]["pedido_id"].as_i64().context("checkout without order id")?;
    wait_for_lead(&client, server, &token, &email, 1).await?;

    let (status, _) = post(&client, server, &customer_token, "/api/guardar", purchase(1)).await?;
    assert_eq!(status, StatusCode::CREATED);
    let lead = wait_for_lead(&client, server, &token, &email, 2).await?;
    assert_eq!(lead["total_compras"], 2);
    assert_eq!(common::money(&lead["valor_total_compras"]), 28.5 + 16.5);
    assert_eq!(lead["frecuencia_compra"], 0);

    // The internal mirror links lines to live products by name
    let pedido = get(&client, server, &token, &format!("/api/tiendas/pedidos/{}", pedido_id)).await?;
    assert_eq!(common::money(&pedido["total"]), 28.5);
    assert_eq!(pedido["cliente_tienda_publica_id"], customer_id);
    let detalles = pedido["detalles"].as_array().context("mirror without lines")?;
    let mate = detalles.iter().find(|d| d["nombre_producto"] == "Mate").context("missing Mate line")?;
    assert!(mate["producto_id"].is_i64());
    let bombilla = detalles.iter().find(|d| d["nombre_producto"] == "Bombilla").context("missing Bombilla line")?;
    assert!(bombilla["producto_id"].is_null());

    // Someone else's account id is refused
    let mut other = purchase(1);
    other["usuario"] = json!(customer_id + 1_000_000);
    let (status, _) = post(&client, server, &customer_token, "/api/guardar", other).await?;
    assert!(status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn my_style_patch_syncs_welcome_blocks() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = Client::new();
    let username = common::unique("estilo");
    let token = common::register(server, &client, &username).await?;
    common::create_store(server, &client, &token, &format!("Estilo {}", username)).await?;

    let style = get(&client, server, &token, "/api/store-style/mi-estilo").await?;
    assert_eq!(style["bloques"], json!([]));

    let patch = |body: Value| {
        client
            .patch(format!("{}/api/store-style/mi-estilo", server.base_url))
            .bearer_auth(&token)
            .json(&body)
            .send()
    };

    let res = patch(json!({
        "color_primario": "#112233",
        "bloques_bienvenida": [
            { "tipo": "apilado", "titulo": "Hola" },
            { "tipo": "en_linea", "titulo": "Ofertas" },
        ],
    }))
    .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let style: Value = res.json::<Value>().await?["data"].clone();
    assert_eq!(style["color_primario"], "#112233");
    let bloques = style["bloques"].as_array().context("style without bloques")?;
    assert_eq!(bloques.len(), 2);
    let hola = bloques.iter().find(|b| b["titulo"] == "Hola").context("missing Hola")?["id"].clone();

    // Listed blocks are updated, unlisted ones removed, new ones added
    let res = patch(json!({
        "bloques_bienvenida": [
            { "id": hola, "titulo": "Bienvenidos" },
            { "tipo": "apilado", "titulo": "Nuevo" },
            { "id": 999_999_999, "titulo": "Ajeno" },
        ],
    }))
    .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let style: Value = res.json::<Value>().await?["data"].clone();
    let mut titulos: Vec<String> = style["bloques"]
        .as_array()
        .context("style without bloques")?
        .iter()
        .filter_map(|b| b["titulo"].as_str().map(str::to_string))
        .collect();
    titulos.sort();
    assert_eq!(titulos, vec!["Bienvenidos", "Nuevo"]);
    assert_eq!(style["color_primario"], "#112233");
    Ok(())
}

#[tokio::test]
async fn backup_round_trip_restores_store_with_new_ids() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = Client::new();
    let username = common::unique("respaldo");
    let token = common::register(server, &client, &username).await?;
    let tienda = common::create_store(server, &client, &token, &format!("Respaldo {}", username)).await?;
    let slug = tienda["slug"].clone();

    let kept = create_product(&client, server, &token, "Guardado", "5.00").await?;
    let (status, _) = post(
        &client,
        server,
        &token,
        "/api/payments/methods",
        json!({ "name": "Caja", "payment_type": "cash", "status": "active" }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let res = client
        .patch(format!("{}/api/store-style/mi-estilo", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "color_primario": "#abcdef", "bloques_bienvenida": [{ "tipo": "apilado", "titulo": "Hola" }] }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let (status, backup) = post(&client, server, &token, "/api/backups", json!({ "description": "antes" })).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", backup);
    let backup_id = backup["data"]["id"].as_i64().context("backup without id")?;
    assert_eq!(backup["data"]["status"], "completed");

    // A second backup in the same second gets its own archive
    let (status, second) = post(&client, server, &token, "/api/backups", json!({})).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(backup["data"]["file"], second["data"]["file"]);

    create_product(&client, server, &token, "Posterior", "1.00").await?;

    let (status, body) = post(&client, server, &token, &format!("/api/backups/{}/restore", backup_id), json!({})).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let restored = get(&client, server, &token, "/api/tiendas/tiendas/tienda-por-usuario").await?;
    assert_ne!(restored["id"], tienda["id"]);
    assert_eq!(restored["slug"], slug);

    let productos = get(&client, server, &token, "/api/tiendas/productos").await?;
    let nombres: Vec<&str> = productos
        .as_array()
        .context("product list")?
        .iter()
        .filter_map(|p| p["nombre"].as_str())
        .collect();
    assert_eq!(nombres, vec!["Guardado"]);
    assert_ne!(productos[0]["id"], kept);
    assert_eq!(productos[0]["tienda_id"], restored["id"]);

    // Payment setup and styling come back with the store
    let methods = get(&client, server, &token, "/api/payments/methods").await?;
    assert_eq!(methods.as_array().map(Vec::len), Some(1));
    assert_eq!(methods[0]["name"], "Caja");
    let style = get(&client, server, &token, "/api/store-style/mi-estilo").await?;
    assert_eq!(style["color_primario"], "#abcdef");
    assert_eq!(style["bloques"][0]["titulo"], "Hola");
    Ok(())
}

#[tokio::test]
async fn concurrent_creates_respect_the_plan_product_limit() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    common::seed_plans()?;
    let client = Client::new();
    let username = common::unique("limite");
    let token = common::register_as(server, &client, &username, "admin").await?;

    let plans = client
        .get(format!("{}/api/subscriptions/plans/public", server.base_url))
        .send()
        .await?
        .json::<Value>()
        .await?;
    let base_plan = plans["data"][0]["id"].as_i64().context("no public plan")?;
    let (status, subscription) =
        post(&client, server, &token, "/api/subscriptions/subscriptions", json!({ "plan": base_plan })).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", subscription);
    let subscription_id = subscription["data"]["id"].as_i64().context("subscription without id")?;

    let (status, plan) = post(
        &client,
        server,
        &token,
        "/api/subscriptions/plans",
        json!({ "name": format!("Limite {}", username), "price": "1.00", "max_products": 2 }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", plan);
    let res = client
        .put(format!("{}/api/subscriptions/subscriptions/{}", server.base_url, subscription_id))
        .bearer_auth(&token)
        .json(&json!({ "plan": plan["data"]["id"] }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    common::create_store(server, &client, &token, &format!("Limite {}", username)).await?;

    let attempts = (0..6).map(|n| {
        post(
            &client,
            server,
            &token,
            "/api/tiendas/productos",
            json!({ "nombre": format!("Producto {}", n), "precio": "1.00" }),
        )
    });
    let results = futures::future::join_all(attempts).await;
    let mut created = 0;
    for result in results {
        let (status, body) = result?;
        match status {
            StatusCode::CREATED => created += 1,
            StatusCode::PAYMENT_REQUIRED => {}
            other => panic!("unexpected {}: {}", other, body),
        }
    }
    assert_eq!(created, 2);

    let usage = get(&client, server, &token, "/api/subscriptions/subscriptions/usage").await?;
    assert_eq!(usage["products"]["used"], 2);
    Ok(())
}
