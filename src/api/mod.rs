use crate::api::handlers::{account, health};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod email;
pub mod handlers;

use account::AccountConfig;
use email::EmailSender;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        account::register::register,
        account::login::login,
        account::login::logout,
        account::password::change_password,
        account::recover::request_recovery,
        account::recover::recovery_form,
        account::recover::recover,
        account::activate::activate,
        account::deactivate::request_deactivation,
        account::deactivate::deactivate,
    ),
    components(schemas(
        account::types::RegisterRequest,
        account::types::LoginRequest,
        account::types::RecoveryRequest,
        account::types::ResetPasswordRequest,
        account::types::ChangePasswordRequest,
        account::types::DeactivationRequest,
        account::error::FieldError,
    )),
    tags(
        (name = "chiavi", description = "Account lifecycle and authentication keys API")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    config: AccountConfig,
    sender: Arc<dyn EmailSender>,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let app = router(pool, config, sender);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Build the application router over an existing pool.
#[must_use]
pub fn router(
    pool: sqlx::PgPool,
    config: AccountConfig,
    sender: Arc<dyn EmailSender>,
) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, COOKIE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    Router::new()
        .route("/", get(|| async { "🗝️" }))
        .route(
            "/openapi.json",
            get(|| async { axum::Json(openapi()) }),
        )
        .route("/register", post(account::register))
        .route("/login", post(account::login))
        .route("/logout", post(account::logout))
        .route("/recover", post(account::request_recovery))
        .route(
            "/recover/:username/:token",
            get(account::recovery_form).post(account::recover),
        )
        .route("/activate/:username/:token", get(account::activate))
        .route("/manage/password", post(account::change_password))
        .route("/manage/deactivate", post(account::request_deactivation))
        .route(
            "/manage/deactivate/:username/:token",
            get(account::deactivate),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(config))
                .layer(Extension(sender))
                .layer(Extension(pool.clone())),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(Extension(pool))
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
