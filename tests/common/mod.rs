use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use reqwest::StatusCode;

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Cargo builds the server binary before integration tests run
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_tienda-crm-api"));
        cmd.env("TIENDA_API_PORT", port.to_string())
            .env("RUN_MIGRATIONS", "true")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Inherit environment so the server can see DATABASE_URL and JWT_SECRET from .env (loaded by the server)
        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline { break; }
            let url = format!("{}/health", self.base_url);
            match client.get(&url).send().await {
                Ok(resp) => {
                    // Consider server ready on any non-404 response
                    if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                        return Ok(());
                    }
                }
                Err(_) => {}
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    // Use stable get_or_init and convert init errors into a panic with context.
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}


/// Whether the spawned server reached its database. Tests that need rows
/// return early when it did not.
pub async fn database_available(server: &TestServer) -> Result<bool> {
    let res = reqwest::Client::new()
        .get(format!("{}/health", server.base_url))
        .send()
        .await?;
    Ok(res.status() == StatusCode::OK)
}

/// Unique suffix so repeated runs do not collide on usernames and slugs
pub fn unique(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("{}_{}_{}", prefix, std::process::id(), nanos)
}

/// Registers a fresh staff account and returns its access token
pub async fn register(server: &TestServer, client: &reqwest::Client, username: &str) -> Result<String> {
    register_as(server, client, username, "cliente").await
}

pub async fn register_as(server: &TestServer, client: &reqwest::Client, username: &str, role: &str) -> Result<String> {
    let res = client
        .post(format!("{}/api/register", server.base_url))
        .json(&serde_json::json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "contraseña-segura",
            "company_name": format!("Empresa {}", username),
            "role": role,
        }))
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::CREATED, "register failed: {}", res.status());
    let body: serde_json::Value = res.json().await?;
    body["data"]["access"]
        .as_str()
        .map(str::to_string)
        .context("register response without access token")
}

/// Opens the caller's store and returns it
pub async fn create_store(server: &TestServer, client: &reqwest::Client, token: &str, nombre: &str) -> Result<serde_json::Value> {
    let res = client
        .post(format!("{}/api/tiendas/tiendas", server.base_url))
        .bearer_auth(token)
        .json(&serde_json::json!({ "nombre": nombre }))
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::CREATED, "store create failed: {}", res.status());
    let body: serde_json::Value = res.json().await?;
    Ok(body["data"].clone())
}

/// Seeds the plan catalogue through the admin CLI; seeding is idempotent
pub fn seed_plans() -> Result<()> {
    let status = Command::new(env!("CARGO_BIN_EXE_tienda"))
        .args(["plans", "seed"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .context("failed to run tienda CLI")?;
    anyhow::ensure!(status.success(), "tienda plans seed exited with {}", status);
    Ok(())
}

/// Decimal columns serialize as strings
pub fn money(value: &serde_json::Value) -> f64 {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value.as_f64())
        .unwrap_or(f64::NAN)
}
