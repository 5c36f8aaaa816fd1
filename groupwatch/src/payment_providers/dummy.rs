//! Dummy payment provider implementation
//!
//! Accepts every customer and subscription without contacting anyone. Webhooks use the Asaas
//! wire format and token header, so local development can drive the full billing flow by
//! posting events by hand.

use async_trait::async_trait;
use axum::http::HeaderMap;
use tracing::info;

use crate::{
    config::DummyPaymentConfig,
    gateway::Result,
    payment_providers::{
        GatewayPayment, GatewaySubscription, NewCustomer, NewSubscription, PaymentProvider, PaymentWebhook, WebhookError,
        asaas::{check_webhook_token, decode_webhook},
    },
};

pub struct DummyProvider {
    webhook_token: String,
}

impl From<DummyPaymentConfig> for DummyProvider {
    fn from(config: DummyPaymentConfig) -> Self {
        Self {
            webhook_token: config.webhook_token,
        }
    }
}

#[async_trait]
impl PaymentProvider for DummyProvider {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn create_customer(&self, customer: &NewCustomer<'_>) -> Result<String> {
        Ok(format!("dummy_cus_{}", customer.external_reference))
    }

    async fn create_subscription(&self, subscription: &NewSubscription<'_>) -> Result<GatewaySubscription> {
        let id = format!("dummy_sub_{}", uuid::Uuid::new_v4().simple());
        info!("Dummy provider created subscription {id} for {}", subscription.external_reference);
        Ok(GatewaySubscription {
            id,
            status: None,
            value: Some(subscription.value),
            next_due_date: Some(subscription.next_due_date),
        })
    }

    async fn cancel_subscription(&self, _subscription_id: &str) -> Result<()> {
        Ok(())
    }

    async fn list_subscription_payments(&self, _subscription_id: &str) -> Result<Vec<GatewayPayment>> {
        Ok(Vec::new())
    }

    fn validate_webhook(&self, headers: &HeaderMap, body: &[u8]) -> std::result::Result<PaymentWebhook, WebhookError> {
        check_webhook_token(headers, &self.webhook_token)?;
        decode_webhook(body)
    }
}
