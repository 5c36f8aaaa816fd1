//! Asaas payment provider implementation

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    config::AsaasConfig,
    db::models::{
        payments::PaymentStatus,
        subscriptions::{BillingType, SubscriptionStatus},
    },
    gateway::{GatewayClient, Result, tokens_match},
    payment_providers::{GatewayPayment, GatewaySubscription, NewCustomer, NewSubscription, PaymentProvider, PaymentWebhook, WebhookError},
};

/// Header Asaas puts the configured webhook token in
pub const WEBHOOK_TOKEN_HEADER: &str = "asaas-access-token";

pub struct AsaasProvider {
    client: GatewayClient,
    webhook_token: String,
}

impl AsaasProvider {
    pub fn new(config: &AsaasConfig) -> Result<Self> {
        Ok(Self {
            client: GatewayClient::new("payment", &config.base_url, "access_token", &config.api_key, config.timeout)?,
            webhook_token: config.webhook_token.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerRequest<'a> {
    name: &'a str,
    email: &'a str,
    external_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionRequest<'a> {
    customer: &'a str,
    billing_type: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    value: Decimal,
    next_due_date: NaiveDate,
    cycle: &'a str,
    description: &'a str,
    external_reference: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AsaasSubscription {
    id: String,
    status: Option<String>,
    value: Option<Decimal>,
    next_due_date: Option<NaiveDate>,
    #[serde(default)]
    deleted: bool,
}

impl From<AsaasSubscription> for GatewaySubscription {
    fn from(sub: AsaasSubscription) -> Self {
        let status = if sub.deleted {
            Some(SubscriptionStatus::Canceled)
        } else {
            match sub.status.as_deref() {
                Some("ACTIVE") => Some(SubscriptionStatus::Active),
                Some("INACTIVE") => Some(SubscriptionStatus::Canceled),
                Some("EXPIRED") => Some(SubscriptionStatus::Expired),
                _ => None,
            }
        };

        Self {
            id: sub.id,
            status,
            value: sub.value,
            next_due_date: sub.next_due_date,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AsaasPayment {
    id: String,
    subscription: Option<String>,
    value: Decimal,
    status: String,
    billing_type: Option<String>,
    due_date: Option<NaiveDate>,
    payment_date: Option<NaiveDate>,
    client_payment_date: Option<NaiveDate>,
    confirmed_date: Option<NaiveDate>,
    invoice_url: Option<String>,
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl From<AsaasPayment> for GatewayPayment {
    fn from(payment: AsaasPayment) -> Self {
        let status = PaymentStatus::from_gateway_str(&payment.status);
        let paid_at = if status.is_paid() {
            payment
                .payment_date
                .or(payment.client_payment_date)
                .or(payment.confirmed_date)
                .map(start_of_day)
        } else {
            None
        };

        Self {
            id: payment.id,
            subscription_id: payment.subscription,
            value: payment.value,
            status,
            billing_type: payment
                .billing_type
                .as_deref()
                .map(BillingType::from_gateway_str)
                .unwrap_or(BillingType::Undefined),
            due_date: payment.due_date,
            paid_at,
            invoice_url: payment.invoice_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaymentList {
    data: Vec<AsaasPayment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookBody {
    id: Option<String>,
    event: String,
    date_created: Option<String>,
    payment: Option<AsaasPayment>,
    subscription: Option<AsaasSubscription>,
}

#[async_trait]
impl PaymentProvider for AsaasProvider {
    fn name(&self) -> &'static str {
        "asaas"
    }

    #[instrument(skip(self, customer), fields(reference = %customer.external_reference), err)]
    async fn create_customer(&self, customer: &NewCustomer<'_>) -> Result<String> {
        let request = CustomerRequest {
            name: customer.name,
            email: customer.email,
            external_reference: &customer.external_reference,
        };
        let created: CreatedObject = self.client.post("customers", &request).await?;
        debug!("Created Asaas customer {}", created.id);
        Ok(created.id)
    }

    #[instrument(skip(self, subscription), fields(reference = %subscription.external_reference), err)]
    async fn create_subscription(&self, subscription: &NewSubscription<'_>) -> Result<GatewaySubscription> {
        let request = SubscriptionRequest {
            customer: subscription.customer_id,
            billing_type: subscription.billing_type.as_gateway_str(),
            value: subscription.value,
            next_due_date: subscription.next_due_date,
            cycle: subscription.cycle.as_gateway_str(),
            description: &subscription.description,
            external_reference: &subscription.external_reference,
        };
        let created: AsaasSubscription = self.client.post("subscriptions", &request).await?;
        Ok(created.into())
    }

    #[instrument(skip(self), err)]
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        let _: serde_json::Value = self.client.delete(&format!("subscriptions/{subscription_id}")).await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_subscription_payments(&self, subscription_id: &str) -> Result<Vec<GatewayPayment>> {
        let list: PaymentList = self.client.get(&format!("subscriptions/{subscription_id}/payments")).await?;
        Ok(list.data.into_iter().map(GatewayPayment::from).collect())
    }

    fn validate_webhook(&self, headers: &HeaderMap, body: &[u8]) -> std::result::Result<PaymentWebhook, WebhookError> {
        check_webhook_token(headers, &self.webhook_token)?;
        decode_webhook(body)
    }
}

pub(super) fn check_webhook_token(headers: &HeaderMap, expected: &str) -> std::result::Result<(), WebhookError> {
    let presented = headers
        .get(WEBHOOK_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::Unauthorized)?;
    if !tokens_match(expected, presented) {
        warn!("Rejected payment webhook with a wrong token");
        return Err(WebhookError::Unauthorized);
    }
    Ok(())
}

/// Decode an Asaas-format webhook body. Authentication is the caller's job.
pub(super) fn decode_webhook(body: &[u8]) -> std::result::Result<PaymentWebhook, WebhookError> {
    let payload: serde_json::Value = serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;
    let decoded: WebhookBody = serde_json::from_value(payload.clone()).map_err(|e| WebhookError::Malformed(e.to_string()))?;

    // Older deliveries carry no id; derive a stable one from the object and timestamp
    let event_id = match decoded.id {
        Some(id) => id,
        None => {
            let object_id = decoded
                .payment
                .as_ref()
                .map(|p| p.id.as_str())
                .or(decoded.subscription.as_ref().map(|s| s.id.as_str()))
                .unwrap_or("none");
            format!("{}:{}:{}", decoded.event, object_id, decoded.date_created.as_deref().unwrap_or(""))
        }
    };

    Ok(PaymentWebhook {
        event_id,
        event_type: decoded.event,
        payment: decoded.payment.map(GatewayPayment::from),
        subscription: decoded.subscription.map(GatewaySubscription::from),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::plans::BillingCycle;
    use serde_json::json;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn provider(base_url: &str) -> AsaasProvider {
        AsaasProvider::new(&AsaasConfig {
            base_url: Url::parse(base_url).unwrap(),
            api_key: "asaas-key".to_string(),
            timeout: Duration::from_secs(5),
            webhook_token: "whk-token".to_string(),
        })
        .unwrap()
    }

    fn headers_with_token(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(WEBHOOK_TOKEN_HEADER, token.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_create_customer_and_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/customers"))
            .and(header("access_token", "asaas-key"))
            .and(body_partial_json(json!({"email": "owner@example.com", "externalReference": "user-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "customer", "id": "cus_0001"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v3/subscriptions"))
            .and(body_partial_json(json!({
                "customer": "cus_0001",
                "billingType": "PIX",
                "value": 49.9,
                "cycle": "MONTHLY",
                "nextDueDate": "2025-03-01",
                "externalReference": "selection-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "subscription",
                "id": "sub_0001",
                "status": "ACTIVE",
                "value": 49.9,
                "nextDueDate": "2025-03-01",
                "deleted": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&format!("{}/api/v3", server.uri()));
        let customer_id = provider
            .create_customer(&NewCustomer {
                name: "Owner",
                email: "owner@example.com",
                external_reference: "user-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(customer_id, "cus_0001");

        let subscription = provider
            .create_subscription(&NewSubscription {
                customer_id: &customer_id,
                billing_type: BillingType::Pix,
                value: dec("49.90"),
                cycle: BillingCycle::Monthly,
                next_due_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                description: "Family group".to_string(),
                external_reference: "selection-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(subscription.id, "sub_0001");
        assert_eq!(subscription.status, Some(SubscriptionStatus::Active));
        assert_eq!(subscription.value, Some(dec("49.9")));
    }

    #[tokio::test]
    async fn test_list_subscription_payments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/subscriptions/sub_0001/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "hasMore": false,
                "totalCount": 2,
                "data": [
                    {"id": "pay_1", "subscription": "sub_0001", "value": 49.9, "status": "RECEIVED",
                     "billingType": "PIX", "dueDate": "2025-03-01", "paymentDate": "2025-03-01",
                     "invoiceUrl": "https://sandbox.asaas.com/i/1"},
                    {"id": "pay_2", "subscription": "sub_0001", "value": 49.9, "status": "PENDING",
                     "billingType": "PIX", "dueDate": "2025-04-01"}
                ]
            })))
            .mount(&server)
            .await;

        let payments = provider(&format!("{}/api/v3/", server.uri()))
            .list_subscription_payments("sub_0001")
            .await
            .unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].status, PaymentStatus::Received);
        assert_eq!(payments[0].paid_at.unwrap().date_naive(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(payments[1].status, PaymentStatus::Pending);
        assert!(payments[1].paid_at.is_none());
    }

    #[test]
    fn test_webhook_requires_token() {
        let provider = provider("https://sandbox.asaas.com/api/v3/");
        let body = br#"{"id":"evt_1","event":"PAYMENT_RECEIVED"}"#;

        assert_eq!(
            provider.validate_webhook(&HeaderMap::new(), body).unwrap_err(),
            WebhookError::Unauthorized
        );
        assert_eq!(
            provider.validate_webhook(&headers_with_token("nope"), body).unwrap_err(),
            WebhookError::Unauthorized
        );
    }

    #[test]
    fn test_webhook_decodes_payment_event() {
        let provider = provider("https://sandbox.asaas.com/api/v3/");
        let body = json!({
            "id": "evt_05b708f961d739ea7eba7e4db318f621",
            "event": "PAYMENT_RECEIVED",
            "dateCreated": "2025-03-01 10:00:00",
            "payment": {
                "object": "payment", "id": "pay_1", "subscription": "sub_0001", "value": 49.9,
                "status": "RECEIVED", "billingType": "PIX", "dueDate": "2025-03-01", "paymentDate": "2025-03-01"
            }
        });

        let webhook = provider
            .validate_webhook(&headers_with_token("whk-token"), body.to_string().as_bytes())
            .unwrap();
        assert_eq!(webhook.event_id, "evt_05b708f961d739ea7eba7e4db318f621");
        assert_eq!(webhook.event_type, "PAYMENT_RECEIVED");
        let payment = webhook.payment.unwrap();
        assert_eq!(payment.subscription_id.as_deref(), Some("sub_0001"));
        assert_eq!(payment.billing_type, BillingType::Pix);
        assert!(payment.paid_at.is_some());
    }

    #[test]
    fn test_webhook_without_id_gets_stable_id() {
        let provider = provider("https://sandbox.asaas.com/api/v3/");
        let body = json!({
            "event": "SUBSCRIPTION_DELETED",
            "dateCreated": "2025-03-01 10:00:00",
            "subscription": {"id": "sub_0001", "status": "INACTIVE", "deleted": true}
        })
        .to_string();

        let first = provider.validate_webhook(&headers_with_token("whk-token"), body.as_bytes()).unwrap();
        let second = provider.validate_webhook(&headers_with_token("whk-token"), body.as_bytes()).unwrap();
        assert_eq!(first.event_id, second.event_id);
        assert_eq!(first.subscription.unwrap().status, Some(SubscriptionStatus::Canceled));
    }

    #[test]
    fn test_webhook_malformed_body() {
        let provider = provider("https://sandbox.asaas.com/api/v3/");
        let err = provider
            .validate_webhook(&headers_with_token("whk-token"), b"{not json")
            .unwrap_err();
        assert!(matches!(err, WebhookError::Malformed(_)));
    }
}
