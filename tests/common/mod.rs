use std::net::SocketAddr;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tempfile::TempDir;
use uuid::Uuid;

use workforce::auth::password;
use workforce::config::Config;

pub const ADMIN: &str = "test_super_user";
pub const NORMAL: &str = "test_normal_user";
pub const PASSWORD: &str = "password123";

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
    pub media: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Insert a user directly; the API has no sign-up route.
    pub async fn create_user(&self, username: &str, password: &str, superuser: bool) -> i64 {
        let hash = password::hash(password).unwrap();
        workforce::db::users::create(&self.pool, username, &hash, "", superuser)
            .await
            .expect("create user failed")
            .id
    }

    /// Request a token, return body + status.
    pub async fn request_token(&self, username: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/users/token/"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("token request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Create a user and return a token for it.
    pub async fn token_for(&self, username: &str, superuser: bool) -> String {
        self.create_user(username, PASSWORD, superuser).await;
        let (body, status) = self.request_token(username, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "token request failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// Admin token (superuser).
    pub async fn admin(&self) -> String {
        self.token_for(ADMIN, true).await
    }

    /// Authenticated but unprivileged token.
    pub async fn normal(&self) -> String {
        self.token_for(NORMAL, false).await
    }

    /// Create a department, return the department JSON.
    pub async fn create_department(&self, token: &str, name: &str, description: &str) -> Value {
        let (body, status) = self
            .post_auth(
                "/departments/",
                token,
                &json!({ "name": name, "description": description }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create department failed: {body}");
        body
    }

    /// Create an employee in a department, return the employee JSON.
    pub async fn create_employee(
        &self,
        token: &str,
        department_id: i64,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Value {
        let (body, status) = self
            .post_auth(
                "/employees/",
                token,
                &json!({
                    "first_name": first_name,
                    "last_name": last_name,
                    "email": email,
                    "salary": 7500.0,
                    "hired_at": "2021-10-14T19:39:00Z",
                    "department": department_id,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create employee failed: {body}");
        body
    }

    /// Make an unauthenticated request.
    pub async fn send(&self, method: reqwest::Method, path: &str, body: Option<&Value>) -> (Value, StatusCode) {
        let mut req = self.client.request(method, self.url(path));
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.expect("request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated request with an optional JSON body.
    pub async fn send_auth(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
        body: Option<&Value>,
    ) -> (Value, StatusCode) {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header("authorization", format!("Token {token}"));
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.expect("request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        self.send_auth(reqwest::Method::GET, path, token, None).await
    }

    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        self.send_auth(reqwest::Method::POST, path, token, Some(body)).await
    }

    pub async fn put_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        self.send_auth(reqwest::Method::PUT, path, token, Some(body)).await
    }

    pub async fn patch_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        self.send_auth(reqwest::Method::PATCH, path, token, Some(body)).await
    }

    pub async fn delete_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        self.send_auth(reqwest::Method::DELETE, path, token, None).await
    }

    /// PATCH a multipart body.
    pub async fn patch_multipart(
        &self,
        path: &str,
        token: &str,
        form: reqwest::multipart::Form,
    ) -> (Value, StatusCode) {
        let resp = self
            .client
            .patch(self.url(path))
            .header("authorization", format!("Token {token}"))
            .multipart(form)
            .send()
            .await
            .expect("multipart request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

/// Spawn a test app with a fresh temporary database and media root.
pub async fn spawn_app() -> TestApp {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    // Create a unique test database
    let db_name = format!("workforce_test_{}", Uuid::now_v7().simple());

    // Connect to default postgres DB to create test DB
    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    // Connect to test DB and run migrations
    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let media = tempfile::tempdir().expect("Failed to create media dir");

    let config = Config {
        database_url: test_url,
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        media_root: media.path().to_path_buf(),
        max_body_size: 5 * 1024 * 1024,
        token_ttl_hours: 1,
        log_level: "warn".to_string(),
    };

    let app = workforce::build_app(pool.clone(), config);

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    // Spawn server in background
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        addr,
        pool,
        client: Client::new(),
        db_name,
        media,
    }
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let db_name = app.db_name.clone();
    app.pool.close().await;

    let base_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");
    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}
