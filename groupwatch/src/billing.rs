//! Reconciliation of payment gateway events against local subscriptions.
//!
//! The payment gateway is the source of truth for money; this module turns its webhook
//! deliveries into local state. Each delivery is applied inside one transaction that also
//! records the event id in `webhook_events`, so a replayed delivery is a no-op and a failed
//! one leaves nothing behind.
//!
//! | Event | Effect |
//! |---|---|
//! | `PAYMENT_CREATED`, `PAYMENT_UPDATED` | upsert payment with the gateway status |
//! | `PAYMENT_RECEIVED`, `PAYMENT_CONFIRMED` | payment paid, subscription ACTIVE, group active |
//! | `PAYMENT_OVERDUE` | payment and subscription OVERDUE, group inactive |
//! | `PAYMENT_REFUNDED`, `PAYMENT_DELETED` | payment status only |
//! | `SUBSCRIPTION_CREATED`, `SUBSCRIPTION_UPDATED` | value, due date and terminal statuses |
//! | `SUBSCRIPTION_DELETED`, `SUBSCRIPTION_INACTIVATED` | subscription CANCELED, group inactive |

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, instrument, warn};

use crate::{
    db::{
        errors::Result,
        handlers::{GroupSelections, Payments, Repository, Subscriptions, WebhookEvents},
        models::{
            payments::{PaymentDBResponse, PaymentStatus, PaymentUpsertDBRequest},
            subscriptions::{SubscriptionDBResponse, SubscriptionStatus, SubscriptionUpdateDBRequest},
        },
    },
    payment_providers::{GatewayPayment, GatewaySubscription, PaymentWebhook},
    types::abbrev_uuid,
};

/// What happened to a webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State was changed
    Applied,
    /// The event id was seen before
    Duplicate,
    /// Unknown event type, or it refers to something we do not track
    Ignored,
}

/// Apply one authenticated webhook delivery.
#[instrument(skip(pool, webhook), fields(event_id = %webhook.event_id, event_type = %webhook.event_type), err)]
pub async fn apply_webhook(pool: &PgPool, provider: &str, webhook: &PaymentWebhook) -> Result<WebhookOutcome> {
    let mut tx = pool.begin().await?;

    let is_new = WebhookEvents::new(&mut tx)
        .record(provider, &webhook.event_id, &webhook.event_type, &webhook.payload)
        .await?;
    if !is_new {
        info!("Webhook event {} already processed, skipping", webhook.event_id);
        return Ok(WebhookOutcome::Duplicate);
    }

    let outcome = match webhook.event_type.as_str() {
        "PAYMENT_CREATED" | "PAYMENT_UPDATED" => apply_payment_event(&mut tx, webhook, None).await?,
        "PAYMENT_RECEIVED" => apply_payment_event(&mut tx, webhook, Some(PaymentStatus::Received)).await?,
        "PAYMENT_CONFIRMED" => apply_payment_event(&mut tx, webhook, Some(PaymentStatus::Confirmed)).await?,
        "PAYMENT_OVERDUE" => apply_payment_event(&mut tx, webhook, Some(PaymentStatus::Overdue)).await?,
        "PAYMENT_REFUNDED" => apply_payment_event(&mut tx, webhook, Some(PaymentStatus::Refunded)).await?,
        "PAYMENT_DELETED" => apply_payment_event(&mut tx, webhook, Some(PaymentStatus::Deleted)).await?,
        "SUBSCRIPTION_CREATED" | "SUBSCRIPTION_UPDATED" => apply_subscription_update(&mut tx, webhook).await?,
        "SUBSCRIPTION_DELETED" | "SUBSCRIPTION_INACTIVATED" => apply_subscription_end(&mut tx, webhook).await?,
        other => {
            debug!("Ignoring payment webhook event type: {other}");
            WebhookOutcome::Ignored
        }
    };

    // The event stays recorded even when ignored, so replays of it are cheap
    tx.commit().await?;
    Ok(outcome)
}

/// Upsert payments fetched from the gateway for a subscription we own.
///
/// Payments belonging to another gateway subscription are skipped.
#[instrument(skip(conn, subscription, payments), fields(subscription_id = %abbrev_uuid(&subscription.id), count = payments.len()), err)]
pub async fn sync_payments(
    conn: &mut PgConnection,
    subscription: &SubscriptionDBResponse,
    payments: &[GatewayPayment],
) -> Result<Vec<PaymentDBResponse>> {
    let mut repo = Payments::new(conn);
    for payment in payments {
        if payment.subscription_id.as_deref().is_some_and(|id| id != subscription.gateway_subscription_id) {
            warn!("Gateway returned payment {} for another subscription", payment.id);
            continue;
        }
        repo.upsert(&upsert_request(subscription, payment, payment.status)).await?;
    }
    repo.list_for_subscription(subscription.id).await
}

fn upsert_request(subscription: &SubscriptionDBResponse, payment: &GatewayPayment, status: PaymentStatus) -> PaymentUpsertDBRequest {
    let paid_at = match (status.is_paid(), payment.paid_at) {
        (true, Some(at)) => Some(at),
        (true, None) => Some(Utc::now()),
        (false, _) => None,
    };

    PaymentUpsertDBRequest {
        subscription_id: subscription.id,
        gateway_payment_id: payment.id.clone(),
        value: payment.value,
        status,
        billing_type: payment.billing_type,
        due_date: payment.due_date,
        paid_at,
        invoice_url: payment.invoice_url.clone(),
    }
}

async fn subscription_for_payment(conn: &mut PgConnection, payment: &GatewayPayment) -> Result<Option<SubscriptionDBResponse>> {
    let Some(gateway_subscription_id) = payment.subscription_id.as_deref() else {
        warn!("Payment {} is not attached to a subscription, ignoring", payment.id);
        return Ok(None);
    };

    let subscription = Subscriptions::new(conn).get_by_gateway_id(gateway_subscription_id).await?;
    if subscription.is_none() {
        warn!("Payment {} refers to unknown subscription {gateway_subscription_id}, ignoring", payment.id);
    }
    Ok(subscription)
}

/// `forced_status` is the status implied by the event name; `None` trusts the payload.
async fn apply_payment_event(conn: &mut PgConnection, webhook: &PaymentWebhook, forced_status: Option<PaymentStatus>) -> Result<WebhookOutcome> {
    let Some(payment) = webhook.payment.as_ref() else {
        warn!("{} event without a payment object", webhook.event_type);
        return Ok(WebhookOutcome::Ignored);
    };
    let Some(subscription) = subscription_for_payment(conn, payment).await? else {
        return Ok(WebhookOutcome::Ignored);
    };

    let status = forced_status.unwrap_or(payment.status);
    Payments::new(conn).upsert(&upsert_request(&subscription, payment, status)).await?;

    // A late payment on a canceled or expired subscription does not revive it
    if !subscription.status.is_live() {
        debug!(
            "Subscription {} is {:?}, payment recorded without activation",
            abbrev_uuid(&subscription.id),
            subscription.status
        );
        return Ok(WebhookOutcome::Applied);
    }

    match (forced_status, status.is_paid()) {
        (Some(_), true) => {
            set_subscription_status(conn, &subscription, SubscriptionStatus::Active).await?;
            GroupSelections::new(conn).set_active(subscription.group_selection_id, true).await?;
            info!("Subscription {} activated by payment {}", abbrev_uuid(&subscription.id), payment.id);
        }
        (Some(PaymentStatus::Overdue), _) => {
            set_subscription_status(conn, &subscription, SubscriptionStatus::Overdue).await?;
            GroupSelections::new(conn).set_active(subscription.group_selection_id, false).await?;
            info!("Subscription {} overdue, group paused", abbrev_uuid(&subscription.id));
        }
        _ => {}
    }

    Ok(WebhookOutcome::Applied)
}

async fn set_subscription_status(conn: &mut PgConnection, subscription: &SubscriptionDBResponse, status: SubscriptionStatus) -> Result<()> {
    if subscription.status == status {
        return Ok(());
    }
    Subscriptions::new(conn)
        .update(
            subscription.id,
            &SubscriptionUpdateDBRequest {
                status: Some(status),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

async fn local_subscription(conn: &mut PgConnection, webhook: &PaymentWebhook) -> Result<Option<(GatewaySubscription, SubscriptionDBResponse)>> {
    let Some(remote) = webhook.subscription.as_ref() else {
        warn!("{} event without a subscription object", webhook.event_type);
        return Ok(None);
    };
    let Some(local) = Subscriptions::new(conn).get_by_gateway_id(&remote.id).await? else {
        warn!("Webhook refers to unknown subscription {}, ignoring", remote.id);
        return Ok(None);
    };
    Ok(Some((remote.clone(), local)))
}

/// Value and due date follow the gateway. Of the statuses only the terminal ones are
/// taken over: ACTIVE and OVERDUE are driven by payment events, so a gateway reporting
/// a fresh subscription as ACTIVE does not unlock an unpaid group.
///
/// A subscription that already ended keeps its status and never touches the group, which
/// may be paid for by a newer subscription.
async fn apply_subscription_update(conn: &mut PgConnection, webhook: &PaymentWebhook) -> Result<WebhookOutcome> {
    let Some((remote, local)) = local_subscription(conn, webhook).await? else {
        return Ok(WebhookOutcome::Ignored);
    };

    let status = remote
        .status
        .filter(|status| matches!(status, SubscriptionStatus::Canceled | SubscriptionStatus::Expired))
        .filter(|_| local.status.is_live());

    Subscriptions::new(conn)
        .update(
            local.id,
            &SubscriptionUpdateDBRequest {
                status,
                value: remote.value,
                next_due_date: remote.next_due_date,
            },
        )
        .await?;

    if status.is_some() {
        GroupSelections::new(conn).set_active(local.group_selection_id, false).await?;
        info!("Subscription {} ended by gateway ({:?})", abbrev_uuid(&local.id), status);
    }

    Ok(WebhookOutcome::Applied)
}

async fn apply_subscription_end(conn: &mut PgConnection, webhook: &PaymentWebhook) -> Result<WebhookOutcome> {
    let Some((_, local)) = local_subscription(conn, webhook).await? else {
        return Ok(WebhookOutcome::Ignored);
    };

    if !local.status.is_live() {
        debug!(
            "Subscription {} already {:?}, group left untouched",
            abbrev_uuid(&local.id),
            local.status
        );
        return Ok(WebhookOutcome::Applied);
    }

    Subscriptions::new(conn).cancel(local.id).await?;
    GroupSelections::new(conn).set_active(local.group_selection_id, false).await?;
    info!("Subscription {} canceled by gateway", abbrev_uuid(&local.id));

    Ok(WebhookOutcome::Applied)
}
