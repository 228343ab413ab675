//! Key lifecycle integration tests against a real Postgres.
//!
//! Gated on `CHIAVI_TEST_DSN`, an admin connection string with permission to
//! create databases (for example `postgres://postgres@localhost/postgres`).
//! When unset, every test is a no-op skip. Each test provisions its own
//! throwaway database, applies the schema, and drives the full router.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, SET_COOKIE},
        Request, Response, StatusCode,
    },
    Router,
};
use chiavi::api::{
    self,
    email::{EmailMessage, EmailSender},
    handlers::account::AccountConfig,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, Connection, PgConnection, PgPool};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("../migrations/0001_init.sql");

fn admin_dsn() -> Option<String> {
    match std::env::var("CHIAVI_TEST_DSN") {
        Ok(dsn) => Some(dsn),
        Err(_) => {
            eprintln!("CHIAVI_TEST_DSN not set; skipping");
            None
        }
    }
}

struct TestDb {
    admin_dsn: String,
    name: String,
    pool: PgPool,
}

impl TestDb {
    async fn create(admin_dsn: &str) -> Result<Self> {
        let name = format!("chiavi_it_{}", Uuid::new_v4().simple());

        let mut admin = PgConnection::connect(admin_dsn)
            .await
            .context("failed to connect to admin database")?;
        sqlx::query(&format!("CREATE DATABASE {name}"))
            .execute(&mut admin)
            .await
            .context("failed to create test database")?;

        let mut dsn = url::Url::parse(admin_dsn)?;
        dsn.set_path(&name);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(dsn.as_str())
            .await
            .context("failed to connect to test database")?;

        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to apply schema")?;

        Ok(Self {
            admin_dsn: admin_dsn.to_string(),
            name,
            pool,
        })
    }

    async fn drop(self) -> Result<()> {
        self.pool.close().await;
        let mut admin = PgConnection::connect(&self.admin_dsn).await?;
        sqlx::query(&format!("DROP DATABASE {}", self.name))
            .execute(&mut admin)
            .await?;
        Ok(())
    }
}

/// Captures outbound email so tests can pull tokens out of the links.
#[derive(Clone, Default)]
struct Mailbox(Arc<Mutex<Vec<EmailMessage>>>);

impl Mailbox {
    fn last_token(&self) -> String {
        let messages = self.0.lock().unwrap();
        let body = &messages.last().expect("no email captured").body;
        body.lines()
            .find(|line| line.starts_with("http"))
            .and_then(|link| link.rsplit('/').next())
            .expect("no key link in email body")
            .to_string()
    }
}

impl EmailSender for Mailbox {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        self.0.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn test_config() -> AccountConfig {
    AccountConfig::new(
        "http://accounts.test".to_string(),
        SecretString::from("sea-salt"),
    )
}

fn app(pool: PgPool, config: AccountConfig, mailbox: &Mailbox) -> Router {
    api::router(pool, config, Arc::new(mailbox.clone()))
}

async fn post_json(app: &Router, path: &str, body: &Value) -> Result<Response<Body>> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?;
    Ok(app.clone().oneshot(request).await?)
}

async fn get(app: &Router, path: &str) -> Result<Response<Body>> {
    let request = Request::builder().method("GET").uri(path).body(Body::empty())?;
    Ok(app.clone().oneshot(request).await?)
}

fn register_payload(username: &str, email: &str, password: &str) -> Value {
    json!({
        "username": username,
        "email": email,
        "password1": password,
        "password2": password,
    })
}

fn login_payload(username: &str, password: &str) -> Value {
    json!({ "username": username, "password": password })
}

#[tokio::test]
async fn register_activate_login_flow() -> Result<()> {
    let Some(admin) = admin_dsn() else {
        return Ok(());
    };
    let db = TestDb::create(&admin).await?;
    let mailbox = Mailbox::default();
    let app = app(db.pool.clone(), test_config(), &mailbox);

    let response = post_json(
        &app,
        "/register",
        &register_payload("alice", "alice@example.com", "correct horse"),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Inactive until the key is redeemed.
    let response = post_json(&app, "/login", &login_payload("alice", "correct horse")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = mailbox.last_token();
    let response = get(&app, &format!("/activate/alice/{token}")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Second redemption of the same key loses.
    let response = get(&app, &format!("/activate/alice/{token}")).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = post_json(&app, "/login", &login_payload("alice", "correct horse")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(SET_COOKIE));

    db.drop().await
}

#[tokio::test]
async fn key_never_redeems_for_another_purpose() -> Result<()> {
    let Some(admin) = admin_dsn() else {
        return Ok(());
    };
    let db = TestDb::create(&admin).await?;
    let mailbox = Mailbox::default();
    let app = app(db.pool.clone(), test_config(), &mailbox);

    let response = post_json(
        &app,
        "/register",
        &register_payload("bob", "bob@example.com", "correct horse"),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let activation_token = mailbox.last_token();

    let response = post_json(&app, "/recover", &json!({ "email": "bob@example.com" })).await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let recovery_token = mailbox.last_token();
    assert_ne!(activation_token, recovery_token);

    // A recovery key does not activate, an activation key does not recover.
    let response = get(&app, &format!("/activate/bob/{recovery_token}")).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let response = get(&app, &format!("/recover/bob/{activation_token}")).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // Both keys still redeem for their own purpose.
    let response = get(&app, &format!("/recover/bob/{recovery_token}")).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = get(&app, &format!("/activate/bob/{activation_token}")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    db.drop().await
}

#[tokio::test]
async fn expired_key_never_redeems() -> Result<()> {
    let Some(admin) = admin_dsn() else {
        return Ok(());
    };
    let db = TestDb::create(&admin).await?;
    let mailbox = Mailbox::default();
    let config = test_config().with_activation_key_ttl_seconds(-1);
    let app = app(db.pool.clone(), config, &mailbox);

    let response = post_json(
        &app,
        "/register",
        &register_payload("carol", "carol@example.com", "correct horse"),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let token = mailbox.last_token();
    let response = get(&app, &format!("/activate/carol/{token}")).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    db.drop().await
}

#[tokio::test]
async fn outstanding_keys_redeem_independently() -> Result<()> {
    let Some(admin) = admin_dsn() else {
        return Ok(());
    };
    let db = TestDb::create(&admin).await?;
    let mailbox = Mailbox::default();
    let app = app(db.pool.clone(), test_config(), &mailbox);

    let response = post_json(
        &app,
        "/register",
        &register_payload("dave", "dave@example.com", "correct horse"),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let activation_token = mailbox.last_token();
    let response = get(&app, &format!("/activate/dave/{activation_token}")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let recover_request = json!({ "email": "dave@example.com" });
    let response = post_json(&app, "/recover", &recover_request).await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let first = mailbox.last_token();
    let response = post_json(&app, "/recover", &recover_request).await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let second = mailbox.last_token();
    assert_ne!(first, second);

    let response = post_json(
        &app,
        &format!("/recover/dave/{first}"),
        &json!({ "password1": "battery staple", "password2": "battery staple" }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Consuming the first key leaves the second one live.
    let response = get(&app, &format!("/recover/dave/{second}")).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = post_json(
        &app,
        &format!("/recover/dave/{second}"),
        &json!({ "password1": "staple battery", "password2": "staple battery" }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(&app, "/login", &login_payload("dave", "staple battery")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    db.drop().await
}
