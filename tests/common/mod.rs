#![allow(dead_code)]

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;
use uuid::Uuid;

use clinic_api::create_app;
use clinic_api::db::seed::{self, NewUser};

pub const PASSWORD: &str = "senha-segura";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    _dir: TempDir,
}

/// Fresh file-backed database with migrations and the catalogue applied.
pub async fn setup() -> Result<TestApp> {
    let dir = tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;
    seed::seed_catalogue(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok(TestApp { app, pool, _dir: dir })
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let (status, _, value) = self.send_full(method, uri, token, body).await?;
        Ok((status, value))
    }

    pub async fn send_full(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, axum::http::HeaderMap, Value)> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))?,
            None => req.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, headers, value))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/token",
                None,
                Some(serde_json::json!({ "username": username, "password": password })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "login for {username} failed: {status} {body}");
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("no access_token in {body}"))
    }

    pub async fn insert_clinic(&self, name: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO clinics (id, name, address, created_at, updated_at) VALUES (?, ?, 'Rua A, 1', ?, ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Creates an identity and returns a bearer token for it.
    pub async fn user_with(
        &self,
        username: &str,
        profile: Option<&str>,
        clinic_id: Option<Uuid>,
        super_user: bool,
    ) -> Result<String> {
        let profile_id = match profile {
            Some(name) => seed::profile_id_by_name(&self.pool, name).await?,
            None => None,
        };
        seed::create_user(
            &self.pool,
            NewUser {
                profile_id,
                clinic_id,
                is_superuser: super_user,
                ..NewUser::new(username, PASSWORD)
            },
        )
        .await?;
        self.login(username, PASSWORD).await
    }

    pub async fn root(&self) -> Result<String> {
        self.user_with("root", Some("ADMIN"), None, true).await
    }
}

pub fn patient_body(name: &str, cpf: &str, clinic_id: Option<Uuid>) -> Value {
    serde_json::json!({
        "name": name,
        "cpf": cpf,
        "birth_date": "1990-05-17",
        "email": format!("{}@example.com", cpf),
        "clinic_id": clinic_id,
    })
}
