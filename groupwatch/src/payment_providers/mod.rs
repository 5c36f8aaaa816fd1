//! Payment provider abstraction layer
//!
//! This module defines the [`PaymentProvider`] trait, which abstracts the recurring-billing
//! API of a payment gateway: customers, subscriptions, the payments a subscription
//! generates, and the webhooks the gateway sends when any of those change.
//!
//! Providers only speak the gateway protocol. Applying webhook events to local rows is the
//! job of [`crate::billing`].

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::{
    config::PaymentConfig,
    db::models::{
        payments::PaymentStatus,
        plans::BillingCycle,
        subscriptions::{BillingType, SubscriptionStatus},
    },
    gateway::{GatewayError, Result},
};

pub mod asaas;
pub mod dummy;

/// Create a payment provider from configuration
///
/// This is the single point where config turns into provider instances.
pub fn create_provider(config: &PaymentConfig) -> std::result::Result<Box<dyn PaymentProvider>, GatewayError> {
    Ok(match config {
        PaymentConfig::Asaas(asaas_config) => Box::new(asaas::AsaasProvider::new(asaas_config)?),
        PaymentConfig::Dummy(dummy_config) => Box::new(dummy::DummyProvider::from(dummy_config.clone())),
    })
}

/// Why an inbound webhook was rejected
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing or invalid webhook token")]
    Unauthorized,

    #[error("malformed webhook payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct NewCustomer<'a> {
    pub name: &'a str,
    pub email: &'a str,
    /// Our user id, so gateway records can be traced back
    pub external_reference: String,
}

#[derive(Debug, Clone)]
pub struct NewSubscription<'a> {
    pub customer_id: &'a str,
    pub billing_type: BillingType,
    pub value: Decimal,
    pub cycle: BillingCycle,
    pub next_due_date: NaiveDate,
    pub description: String,
    /// Our group selection id
    pub external_reference: String,
}

/// A subscription as the gateway reports it
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySubscription {
    pub id: String,
    /// `None` when the gateway reported a status we do not track
    pub status: Option<SubscriptionStatus>,
    pub value: Option<Decimal>,
    pub next_due_date: Option<NaiveDate>,
}

/// A single charge generated by a subscription
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPayment {
    pub id: String,
    pub subscription_id: Option<String>,
    pub value: Decimal,
    pub status: PaymentStatus,
    pub billing_type: BillingType,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
}

/// An authenticated, decoded webhook delivery
#[derive(Debug, Clone)]
pub struct PaymentWebhook {
    /// Unique id of the delivery, used for replay detection
    pub event_id: String,
    /// Gateway event name, e.g. `PAYMENT_RECEIVED`
    pub event_type: String,
    pub payment: Option<GatewayPayment>,
    pub subscription: Option<GatewaySubscription>,
    /// The raw body, kept for the audit ledger
    pub payload: serde_json::Value,
}

/// Abstract payment provider interface
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short provider name, recorded alongside processed webhook events
    fn name(&self) -> &'static str;

    /// Register a paying customer. Returns the gateway's customer id.
    async fn create_customer(&self, customer: &NewCustomer<'_>) -> Result<String>;

    async fn create_subscription(&self, subscription: &NewSubscription<'_>) -> Result<GatewaySubscription>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()>;

    async fn list_subscription_payments(&self, subscription_id: &str) -> Result<Vec<GatewayPayment>>;

    /// Authenticate and decode a webhook delivery.
    fn validate_webhook(&self, headers: &HeaderMap, body: &[u8]) -> std::result::Result<PaymentWebhook, WebhookError>;
}
