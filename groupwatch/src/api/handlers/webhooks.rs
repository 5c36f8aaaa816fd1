//! Inbound webhooks from the payment and messaging gateways.
//!
//! Both endpoints authenticate the gateway with a shared token instead of a user session.
//! Once a delivery is authenticated and decoded it is always acknowledged with 200, even if
//! applying it fails: gateways retry non-2xx deliveries aggressively, and a failure here is
//! not something a retry of the same payload would fix.

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use tracing::{debug, error, info, warn};

use crate::{
    AppState,
    api::{handlers::groups::GROUP_JID_SUFFIX, models::webhooks::WebhookAck},
    billing::{self, WebhookOutcome},
    db::{
        handlers::{GroupSelections, Instances, Messages},
        models::{instances::InstanceDBResponse, messages::MessageCreateDBRequest},
    },
    errors::{Error, Result},
    gateway::tokens_match,
    messaging::events::{IncomingMessage, MessagingEvent, WEBHOOK_TOKEN_HEADER, decode_event},
    payment_providers::WebhookError,
};

impl From<WebhookError> for Error {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Unauthorized => Error::Unauthenticated {
                message: Some("Invalid webhook token".to_string()),
            },
            WebhookError::Malformed(message) => Error::BadRequest {
                message: format!("Malformed webhook payload: {message}"),
            },
        }
    }
}

#[utoipa::path(
    post,
    path = "/webhooks/payments",
    tag = "webhooks",
    summary = "Payment gateway webhook",
    description = "Receives subscription and payment events. Authenticated with the `asaas-access-token` header. Replayed event ids are acknowledged and skipped.",
    request_body(content = serde_json::Value, content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Missing or wrong webhook token"),
        (status = 501, description = "Payments are not configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn payment_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookAck>> {
    let provider = state.payments.as_ref().ok_or_else(|| Error::NotImplemented {
        message: "Payments are not configured on this server".to_string(),
    })?;

    let webhook = provider.validate_webhook(&headers, &body)?;

    match billing::apply_webhook(&state.db, provider.name(), &webhook).await {
        Ok(WebhookOutcome::Applied) => info!("Applied {} ({})", webhook.event_type, webhook.event_id),
        Ok(WebhookOutcome::Duplicate) => debug!("Duplicate delivery of {}", webhook.event_id),
        Ok(WebhookOutcome::Ignored) => debug!("Ignored {} ({})", webhook.event_type, webhook.event_id),
        Err(e) => error!("Failed to apply payment webhook {} ({}): {e}", webhook.event_type, webhook.event_id),
    }

    Ok(Json(WebhookAck::received()))
}

fn check_messaging_token(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = state.config.messaging.webhook_token() else {
        return Ok(());
    };
    let presented = headers.get(WEBHOOK_TOKEN_HEADER).and_then(|value| value.to_str().ok()).unwrap_or("");
    if tokens_match(expected, presented) {
        Ok(())
    } else {
        warn!("Rejected messaging webhook with a missing or wrong token");
        Err(WebhookError::Unauthorized.into())
    }
}

/// Store the text messages of monitored groups. Returns how many were new.
async fn ingest_messages(state: &AppState, instance: &InstanceDBResponse, messages: &[IncomingMessage]) -> Result<usize> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    // Selection lookups per group, so a batch hits the database once per group
    let mut selections = HashMap::new();
    let mut inserted = 0;

    for message in messages {
        // Our own sends include the digests posted back into the group
        if message.from_me || !message.remote_jid.ends_with(GROUP_JID_SUFFIX) {
            continue;
        }
        let Some(text) = message.text.as_ref() else {
            continue;
        };

        if !selections.contains_key(&message.remote_jid) {
            let selection = GroupSelections::new(&mut conn)
                .get_active_for_group(instance.id, &message.remote_jid)
                .await?;
            selections.insert(message.remote_jid.clone(), selection.map(|s| s.id));
        }
        let Some(Some(selection_id)) = selections.get(&message.remote_jid).copied() else {
            continue;
        };

        let stored = Messages::new(&mut conn)
            .insert(&MessageCreateDBRequest {
                group_selection_id: selection_id,
                gateway_message_id: message.id.clone(),
                sender_jid: message.sender_jid.clone(),
                sender_name: message.sender_name.clone(),
                content: text.clone(),
                sent_at: message.sent_at,
            })
            .await?;
        if stored.is_some() {
            inserted += 1;
        }
    }

    Ok(inserted)
}

async fn apply_messaging_event(state: &AppState, event: MessagingEvent) -> Result<()> {
    match event {
        MessagingEvent::Messages { instance, messages } => {
            let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let Some(instance) = Instances::new(&mut conn).get_by_name(&instance).await? else {
                debug!("Messages for unknown instance {instance}, ignoring");
                return Ok(());
            };
            drop(conn);

            let inserted = ingest_messages(state, &instance, &messages).await?;
            debug!("Stored {inserted} of {} messages from {}", messages.len(), instance.instance_name);
        }
        MessagingEvent::Connection { instance, status } => {
            let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            if Instances::new(&mut conn).set_status_by_name(&instance, status).await? {
                info!("Instance {instance} is now {status:?}");
            } else {
                debug!("Connection update for unknown instance {instance}, ignoring");
            }
        }
        MessagingEvent::Other { event } => {
            debug!("Ignoring messaging webhook event: {event}");
        }
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/webhooks/messaging",
    tag = "webhooks",
    summary = "Messaging gateway webhook",
    description = "Receives `messages.upsert` and `connection.update` events. When a webhook token is configured it must be sent in `x-webhook-token`.",
    request_body(content = serde_json::Value, content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Missing or wrong webhook token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn messaging_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookAck>> {
    check_messaging_token(&state, &headers)?;
    let event = decode_event(&body).map_err(|e| WebhookError::Malformed(e.to_string()))?;

    if let Err(e) = apply_messaging_event(&state, event).await {
        error!("Failed to apply messaging webhook: {e}");
    }

    Ok(Json(WebhookAck::received()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::webhooks::WebhookAck;
    use crate::config::{DummyMessagingConfig, MessagingConfig};
    use crate::db::{
        handlers::{GroupSelections, Instances, Repository, Subscriptions},
        models::{instances::InstanceStatus, subscriptions::SubscriptionStatus},
    };
    use crate::payment_providers::asaas::WEBHOOK_TOKEN_HEADER as PAYMENT_TOKEN_HEADER;
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use sqlx::PgPool;

    fn payment_event(event_id: &str, event: &str, gateway_subscription_id: &str) -> Value {
        json!({
            "id": event_id,
            "event": event,
            "dateCreated": "2025-03-01 10:00:00",
            "payment": {
                "id": "pay_001",
                "subscription": gateway_subscription_id,
                "value": "29.90",
                "status": "RECEIVED",
                "billingType": "PIX",
                "dueDate": "2025-03-01",
                "paymentDate": "2025-03-01"
            }
        })
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_payment_received_activates_and_replay_is_noop(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let subscription = create_test_subscription(&pool, user.id).await;
        let body = payment_event("evt_1", "PAYMENT_RECEIVED", &subscription.gateway_subscription_id);

        for _ in 0..2 {
            let response = server
                .post("/webhooks/payments")
                .add_header(PAYMENT_TOKEN_HEADER, TEST_WEBHOOK_TOKEN)
                .json(&body)
                .await;
            response.assert_status_ok();
            assert!(response.json::<WebhookAck>().received);
        }

        let mut conn = pool.acquire().await.unwrap();
        let stored = Subscriptions::new(&mut conn).get_by_id(subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
        let selection = GroupSelections::new(&mut conn)
            .get_by_id(subscription.group_selection_id)
            .await
            .unwrap()
            .unwrap();
        assert!(selection.is_active);

        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events WHERE event_id = 'evt_1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(events, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_payment_webhook_rejects_bad_token_and_body(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let body = payment_event("evt_2", "PAYMENT_RECEIVED", "sub_unknown");

        server.post("/webhooks/payments").json(&body).await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/webhooks/payments")
            .add_header(PAYMENT_TOKEN_HEADER, "wrong-token")
            .json(&body)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/webhooks/payments")
            .add_header(PAYMENT_TOKEN_HEADER, TEST_WEBHOOK_TOKEN)
            .text("{not json")
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        // Unknown subscriptions are acknowledged
        server
            .post("/webhooks/payments")
            .add_header(PAYMENT_TOKEN_HEADER, TEST_WEBHOOK_TOKEN)
            .json(&body)
            .await
            .assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_payment_webhook_without_provider(pool: PgPool) {
        let mut state = create_test_state(pool.clone());
        state.config.payment = None;
        state.payments = None;
        let server = create_test_app_with_state(state).await;

        server
            .post("/webhooks/payments")
            .add_header(PAYMENT_TOKEN_HEADER, TEST_WEBHOOK_TOKEN)
            .json(&payment_event("evt_3", "PAYMENT_RECEIVED", "sub_x"))
            .await
            .assert_status(StatusCode::NOT_IMPLEMENTED);
    }

    fn group_message(instance: &str, group_jid: &str, id: &str, text: &str) -> Value {
        json!({
            "event": "messages.upsert",
            "instance": instance,
            "data": {
                "key": {"remoteJid": group_jid, "fromMe": false, "id": id, "participant": "5511988887777@s.whatsapp.net"},
                "pushName": "Bob",
                "message": {"conversation": text},
                "messageTimestamp": 1735689600
            }
        })
    }

    async fn message_count(pool: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages").fetch_one(pool).await.unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_messages_stored_only_for_active_groups(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;
        let mut conn = pool.acquire().await.unwrap();
        let instance = Instances::new(&mut conn).get_by_id(selection.instance_id).await.unwrap().unwrap();

        let body = group_message(&instance.instance_name, &selection.group_jid, "MSG1", "hello");
        server.post("/webhooks/messaging").json(&body).await.assert_status_ok();
        assert_eq!(message_count(&pool).await, 0, "inactive group must not be recorded");

        GroupSelections::new(&mut conn).set_active(selection.id, true).await.unwrap();
        server.post("/webhooks/messaging").json(&body).await.assert_status_ok();
        server.post("/webhooks/messaging").json(&body).await.assert_status_ok();
        assert_eq!(message_count(&pool).await, 1, "redelivery must not duplicate");

        let other_group = group_message(&instance.instance_name, "999@g.us", "MSG2", "elsewhere");
        server.post("/webhooks/messaging").json(&other_group).await.assert_status_ok();
        let unknown_instance = group_message("gw-unknown", &selection.group_jid, "MSG3", "ghost");
        server.post("/webhooks/messaging").json(&unknown_instance).await.assert_status_ok();
        assert_eq!(message_count(&pool).await, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_connection_update_sets_status(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let instance = create_test_instance(&pool, user.id).await;

        server
            .post("/webhooks/messaging")
            .json(&json!({"event": "connection.update", "instance": instance.instance_name, "data": {"state": "open"}}))
            .await
            .assert_status_ok();

        let mut conn = pool.acquire().await.unwrap();
        let stored = Instances::new(&mut conn).get_by_id(instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::Open);

        server.post("/webhooks/messaging").text("[]").await.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_messaging_token_enforced_when_configured(pool: PgPool) {
        let mut state = create_test_state(pool.clone());
        state.config.messaging = MessagingConfig::Dummy(DummyMessagingConfig {
            webhook_token: Some("msg-secret".to_string()),
        });
        let server = create_test_app_with_state(state).await;
        let body = json!({"event": "presence.update", "instance": "gw-any", "data": {}});

        server.post("/webhooks/messaging").json(&body).await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/webhooks/messaging")
            .add_header("x-webhook-token", "msg-secret")
            .json(&body)
            .await
            .assert_status_ok();
    }
}
