//! # groupwatch: WhatsApp group monitoring
//!
//! `groupwatch` is a multi-tenant service that watches WhatsApp groups on behalf of its users.
//! A user connects their WhatsApp number through a messaging gateway, picks the groups they
//! care about, pays a per-group subscription through a payment gateway, and gets digests of
//! what happened in each group, on demand or on a schedule, posted back into the group.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses PostgreSQL for all persistence. Two external gateways sit behind traits so they can be
//! swapped for in-process dummies during development and tests:
//!
//! - [`messaging::MessagingGateway`]: an Evolution-API style WhatsApp gateway. Instances are
//!   created and paired through it; group messages come back as webhooks.
//! - [`payment_providers::PaymentProvider`]: an Asaas-style recurring billing gateway.
//!   Subscriptions are created through it; payment state comes back as webhooks.
//!
//! ### Request Flow
//!
//! Requests to `/api/v1/*` authenticate with a session JWT (cookie or bearer header), which
//! the [`CurrentUser`](api::models::users::CurrentUser) extractor resolves against the
//! database. Handlers check ownership, call the gateways, and persist through the repositories
//! in [`db::handlers`].
//!
//! Requests to `/webhooks/*` come from the gateways and authenticate with shared tokens.
//! Payment events are applied idempotently by [`billing`]; a received payment activates the
//! subscription and starts monitoring its group. Message events are stored for monitored
//! groups only, and [`digest`] turns a window of stored messages into a summary.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use groupwatch::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = groupwatch::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     groupwatch::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod digest;
pub mod errors;
pub mod gateway;
pub mod messaging;
mod openapi;
pub mod payment_providers;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    http::{self, HeaderValue, Method},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers,
    auth::password,
    config::CorsOrigin,
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    messaging::MessagingGateway,
    openapi::ApiDoc,
    payment_providers::PaymentProvider,
};

pub use types::{GroupSelectionId, InstanceId, PlanId, SubscriptionId, UserId};

/// Application state shared across all request handlers.
///
/// - `db`: PostgreSQL connection pool
/// - `config`: Application configuration loaded from file and environment
/// - `messaging`: The WhatsApp gateway
/// - `payments`: The billing gateway; `None` disables subscription and payment routes (501)
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .messaging(Arc::new(DummyGateway))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub messaging: Arc<dyn MessagingGateway>,
    pub payments: Option<Arc<dyn PaymentProvider>>,
}

/// Get the groupwatch database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the bootstrap admin user if it doesn't exist.
///
/// Idempotent: an existing account with this email is promoted to admin and, when a password
/// is given, gets that password.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> anyhow::Result<UserId> {
    let password_hash = password.map(password::hash_string).transpose()?;

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing_user) = user_repo.get_user_by_email(email).await? {
        let update = UserUpdateDBRequest {
            is_admin: Some(true),
            password_hash,
            ..Default::default()
        };
        user_repo.update(existing_user.id, &update).await?;
        tx.commit().await?;
        return Ok(existing_user.id);
    }

    let created_user = user_repo
        .create(&UserCreateDBRequest {
            email: email.to_string(),
            name: None,
            is_admin: true,
            first_user_is_admin: false,
            auth_source: "system".to_string(),
            password_hash,
        })
        .await?;

    tx.commit().await?;
    info!("Created initial admin user {email}");
    Ok(created_user.id)
}

async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let optional = |secs: u64| (secs > 0).then(|| std::time::Duration::from_secs(secs));

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(optional(settings.idle_timeout_secs))
        .max_lifetime(optional(settings.max_lifetime_secs))
        .connect(&config.database.url)
        .await?;

    migrator().run(&pool).await?;

    if let Some(email) = config.admin_email.as_deref() {
        create_initial_admin_user(email, config.admin_password.as_deref(), &pool).await?;
    }

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed = &config.auth.security.cors.allowed_origins;
    let allow_origin = if allowed.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in allowed {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry the trailing slash Url adds
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// - `/authentication/*`: registration, login, logout, password change
/// - `/api/v1/*`: the authenticated application API
/// - `/webhooks/*`: gateway callbacks
/// - `/healthz`, `/api-docs/openapi.json`, `/docs`
/// - `/internal/metrics` when `enable_metrics` is set
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route(
            "/authentication/register",
            get(handlers::auth::get_registration_info).post(handlers::auth::register),
        )
        .route("/authentication/login", get(handlers::auth::get_login_info).post(handlers::auth::login))
        .route("/authentication/logout", post(handlers::auth::logout))
        .route("/authentication/password-change", post(handlers::auth::change_password));

    let api_routes = Router::new()
        // Users
        .route("/users", get(handlers::users::list_users))
        .route(
            "/users/{user_id}",
            get(handlers::users::get_user)
                .patch(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        // Plans
        .route("/plans", get(handlers::plans::list_plans).post(handlers::plans::create_plan))
        .route(
            "/plans/{plan_id}",
            get(handlers::plans::get_plan)
                .patch(handlers::plans::update_plan)
                .delete(handlers::plans::delete_plan),
        )
        // Instances
        .route(
            "/instances",
            get(handlers::instances::list_instances).post(handlers::instances::create_instance),
        )
        .route(
            "/instances/{instance_id}",
            get(handlers::instances::get_instance).delete(handlers::instances::delete_instance),
        )
        .route("/instances/{instance_id}/connect", get(handlers::instances::connect_instance))
        .route("/instances/{instance_id}/status", get(handlers::instances::instance_status))
        .route("/instances/{instance_id}/groups", get(handlers::instances::list_gateway_groups))
        // Group selections and their activity
        .route("/groups", get(handlers::groups::list_groups).post(handlers::groups::select_group))
        .route(
            "/groups/{group_id}",
            get(handlers::groups::get_group)
                .patch(handlers::groups::update_group)
                .delete(handlers::groups::delete_group),
        )
        .route(
            "/groups/{group_id}/schedule",
            get(handlers::schedules::get_schedule)
                .put(handlers::schedules::upsert_schedule)
                .delete(handlers::schedules::delete_schedule),
        )
        .route("/groups/{group_id}/messages", get(handlers::messages::list_messages))
        .route(
            "/groups/{group_id}/summaries",
            get(handlers::summaries::list_summaries).post(handlers::summaries::generate_summary),
        )
        .route("/summaries/{summary_id}", get(handlers::summaries::get_summary))
        .route("/summaries/{summary_id}/send", post(handlers::summaries::send_summary))
        // Subscriptions and payments
        .route(
            "/subscriptions",
            get(handlers::subscriptions::list_subscriptions).post(handlers::subscriptions::create_subscription),
        )
        .route("/subscriptions/{subscription_id}", get(handlers::subscriptions::get_subscription))
        .route(
            "/subscriptions/{subscription_id}/cancel",
            post(handlers::subscriptions::cancel_subscription),
        )
        .route("/subscriptions/{subscription_id}/payments", get(handlers::subscriptions::list_payments))
        .route(
            "/subscriptions/{subscription_id}/payments/sync",
            post(handlers::subscriptions::sync_payments),
        );

    // Gateway callbacks, not part of the client API
    let webhook_routes = Router::new()
        .route("/webhooks/payments", post(handlers::webhooks::payment_webhook))
        .route("/webhooks/messaging", post(handlers::webhooks::messaging_webhook));

    let cors_layer = create_cors_layer(&state.config)?;
    let enable_metrics = state.config.enable_metrics;

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .merge(webhook_routes)
        .nest("/api/v1", api_routes)
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .route("/api-docs/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .layer(cors_layer);

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The configured server: database pool, gateways and router.
///
/// 1. **Create**: [`Application::new`] connects, runs migrations, bootstraps the admin user
///    and builds the gateways
/// 2. **Serve**: [`Application::serve`] binds and handles requests until the shutdown signal,
///    then closes the pool
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting groupwatch with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;

        let messaging: Arc<dyn MessagingGateway> = Arc::from(messaging::create_messaging_gateway(&config.messaging)?);
        let payments: Option<Arc<dyn PaymentProvider>> = match &config.payment {
            Some(payment_config) => Some(Arc::from(payment_providers::create_provider(payment_config)?)),
            None => {
                info!("No payment gateway configured; billing endpoints are disabled");
                None
            }
        };

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .messaging(messaging)
            .maybe_payments(payments)
            .build();

        let router = build_router(app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("groupwatch listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
