//! Test utilities: configuration, application state and row fixtures.

use std::sync::Arc;

use axum_test::TestServer;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    config::{Config, DummyMessagingConfig, DummyPaymentConfig, MessagingConfig, PasswordConfig, PaymentConfig},
    db::{
        handlers::{GroupSelections, Instances, Plans, Repository, Subscriptions, Users},
        models::{
            group_selections::{GroupSelectionCreateDBRequest, GroupSelectionDBResponse},
            instances::{InstanceCreateDBRequest, InstanceDBResponse, InstanceStatus},
            plans::{BillingCycle, PlanCreateDBRequest, PlanDBResponse},
            subscriptions::{BillingType, SubscriptionCreateDBRequest, SubscriptionDBResponse},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    messaging::dummy::DummyGateway,
    payment_providers::create_provider,
};

/// Token the dummy payment provider expects in `asaas-access-token`
pub const TEST_WEBHOOK_TOKEN: &str = "test-webhook-token";

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        messaging: MessagingConfig::Dummy(DummyMessagingConfig::default()),
        payment: Some(PaymentConfig::Dummy(DummyPaymentConfig {
            webhook_token: TEST_WEBHOOK_TOKEN.to_string(),
        })),
        enable_metrics: false,
        ..Default::default()
    };
    // Hashing at production cost makes auth tests crawl
    config.auth.native.password = PasswordConfig {
        argon2_memory_kib: 1024,
        argon2_iterations: 1,
        ..Default::default()
    };
    config.auth.native.session.cookie_secure = false;
    config
}

/// Application state over `pool` with the dummy gateways from [`create_test_config`].
pub fn create_test_state(pool: PgPool) -> AppState {
    let config = create_test_config();
    let payments = config
        .payment
        .as_ref()
        .map(|payment| Arc::from(create_provider(payment).expect("Failed to create test payment provider")));

    AppState::builder()
        .db(pool)
        .messaging(Arc::new(DummyGateway))
        .maybe_payments(payments)
        .config(config)
        .build()
}

pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_state(create_test_state(pool)).await
}

/// Serve the full router over a state the test has tweaked (no payments, failing gateway, ...).
pub async fn create_test_app_with_state(state: AppState) -> TestServer {
    let router = crate::build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

async fn insert_user(pool: &PgPool, is_admin: bool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let email = format!("user_{}@example.com", Uuid::new_v4().simple());

    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email,
            name: Some(if is_admin { "Test Admin" } else { "Test User" }.to_string()),
            is_admin,
            first_user_is_admin: false,
            auth_source: "test".to_string(),
            password_hash: None,
        })
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_user(pool: &PgPool) -> UserDBResponse {
    insert_user(pool, false).await
}

pub async fn create_test_admin_user(pool: &PgPool) -> UserDBResponse {
    insert_user(pool, true).await
}

/// An `Authorization: Bearer` header carrying a session token for `user`.
pub fn auth_header(user: &UserDBResponse) -> (String, String) {
    let token = session::create_session_token(&CurrentUser::from(user.clone()), &create_test_config())
        .expect("Failed to create session token");
    ("authorization".to_string(), format!("Bearer {token}"))
}

pub async fn create_test_instance(pool: &PgPool, user_id: Uuid) -> InstanceDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let instance_name = format!("gw-{}", Uuid::new_v4().simple());

    Instances::new(&mut conn)
        .create(&InstanceCreateDBRequest {
            user_id,
            gateway_instance_id: Some(format!("dummy-{instance_name}")),
            instance_name,
            status: InstanceStatus::Created,
        })
        .await
        .expect("Failed to create test instance")
}

/// A fresh instance with one inactive group selection on it.
pub async fn create_test_group_selection(pool: &PgPool, user_id: Uuid) -> GroupSelectionDBResponse {
    let instance = create_test_instance(pool, user_id).await;
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    GroupSelections::new(&mut conn)
        .create(&GroupSelectionCreateDBRequest {
            user_id,
            instance_id: instance.id,
            group_jid: format!("{}@g.us", Uuid::new_v4().as_u128() % 1_000_000_000_000_000_000),
            group_name: "Test Group".to_string(),
        })
        .await
        .expect("Failed to create test group selection")
}

pub async fn create_test_plan(pool: &PgPool) -> PlanDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    Plans::new(&mut conn)
        .create(&PlanCreateDBRequest {
            name: format!("Plan {}", Uuid::new_v4().simple()),
            description: Some("Test plan".to_string()),
            price: Decimal::new(2990, 2),
            cycle: BillingCycle::Monthly,
            is_active: true,
        })
        .await
        .expect("Failed to create test plan")
}

/// A PENDING subscription on a new group selection, as if just created through the dummy provider.
pub async fn create_test_subscription(pool: &PgPool, user_id: Uuid) -> SubscriptionDBResponse {
    let selection = create_test_group_selection(pool, user_id).await;
    let plan = create_test_plan(pool).await;
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    Subscriptions::new(&mut conn)
        .create(&SubscriptionCreateDBRequest {
            user_id,
            group_selection_id: selection.id,
            plan_id: plan.id,
            gateway_subscription_id: format!("sub_test_{}", Uuid::new_v4().simple()),
            gateway_customer_id: format!("dummy_cus_{user_id}"),
            billing_type: BillingType::Pix,
            value: plan.price,
            next_due_date: None,
        })
        .await
        .expect("Failed to create test subscription")
}
