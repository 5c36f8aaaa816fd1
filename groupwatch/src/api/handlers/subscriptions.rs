use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};

use crate::{
    AppState,
    api::{
        handlers::groups::owned_selection,
        models::{
            subscriptions::{PaymentResponse, SubscriptionCreate, SubscriptionResponse},
            users::CurrentUser,
        },
    },
    auth::permissions::check_owner,
    billing,
    db::{
        handlers::{GroupSelections, Payments, Plans, Repository, Subscriptions, Users, subscriptions::SubscriptionFilter},
        models::{
            subscriptions::{SubscriptionCreateDBRequest, SubscriptionDBResponse},
            users::UserDBResponse,
        },
    },
    errors::{Error, Result},
    payment_providers::{NewCustomer, NewSubscription, PaymentProvider},
    types::{GroupSelectionId, SubscriptionId},
};

fn require_provider(state: &AppState) -> Result<Arc<dyn PaymentProvider>> {
    state.payments.clone().ok_or_else(|| Error::NotImplemented {
        message: "Payments are not configured on this server".to_string(),
    })
}

async fn owned_subscription(conn: &mut PgConnection, current_user: &CurrentUser, id: SubscriptionId) -> Result<SubscriptionDBResponse> {
    let subscription = Subscriptions::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Subscription".to_string(),
        id: id.to_string(),
    })?;
    check_owner(current_user, subscription.user_id, "Subscription", id)?;
    Ok(subscription)
}

/// Cancel the open gateway subscription of a group that is about to be deleted.
///
/// Gateway failures are logged and swallowed; the local rows go away with the group.
/// No connection is held while the gateway is called.
pub(crate) async fn cancel_live_subscription(state: &AppState, group_selection_id: GroupSelectionId) -> Result<()> {
    let Some(provider) = state.payments.as_ref() else {
        return Ok(());
    };
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let Some(subscription) = Subscriptions::new(&mut conn).get_live_for_group(group_selection_id).await? else {
        return Ok(());
    };
    drop(conn);

    if let Err(e) = provider.cancel_subscription(&subscription.gateway_subscription_id).await {
        warn!(
            "Could not cancel gateway subscription {} of a deleted group: {e}",
            subscription.gateway_subscription_id
        );
    }
    Ok(())
}

/// The user's gateway customer id, registering them with the gateway on first use.
async fn ensure_customer(db: &PgPool, provider: &dyn PaymentProvider, user: &UserDBResponse) -> Result<String> {
    if let Some(customer_id) = &user.payment_customer_id {
        return Ok(customer_id.clone());
    }

    let customer_id = provider
        .create_customer(&NewCustomer {
            name: user.name.as_deref().unwrap_or(&user.email),
            email: &user.email,
            external_reference: user.id.to_string(),
        })
        .await?;
    let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn).set_payment_customer_id(user.id, &customer_id).await?;

    info!("Registered user {} as payment customer {customer_id}", user.id);
    Ok(customer_id)
}

#[utoipa::path(
    get,
    path = "/subscriptions",
    tag = "subscriptions",
    summary = "List subscriptions",
    responses(
        (status = 200, description = "The caller's subscriptions", body = Vec<SubscriptionResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_subscriptions(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<Vec<SubscriptionResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let subscriptions = Subscriptions::new(&mut conn)
        .list(&SubscriptionFilter {
            user_id: Some(current_user.id),
            group_selection_id: None,
        })
        .await?;

    Ok(Json(subscriptions.into_iter().map(SubscriptionResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/subscriptions",
    tag = "subscriptions",
    summary = "Subscribe a group to a plan",
    description = "Creates a recurring charge on the payment gateway for one monitored group. The first charge is due today; the group is activated once it is paid.",
    request_body = SubscriptionCreate,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionResponse),
        (status = 400, description = "Plan is not available"),
        (status = 404, description = "Group or plan not found"),
        (status = 409, description = "The group already has an open subscription"),
        (status = 501, description = "Payments are not configured"),
        (status = 502, description = "Payment gateway failure"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_subscription(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<SubscriptionCreate>,
) -> Result<(StatusCode, Json<SubscriptionResponse>)> {
    let provider = require_provider(&state)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let plan = Plans::new(&mut conn).get_by_id(create.plan_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Plan".to_string(),
        id: create.plan_id.to_string(),
    })?;
    if !plan.is_active {
        return Err(Error::BadRequest {
            message: "This plan is no longer available".to_string(),
        });
    }

    let selection = owned_selection(&mut conn, &current_user, create.group_selection_id).await?;
    if Subscriptions::new(&mut conn).get_live_for_group(selection.id).await?.is_some() {
        return Err(Error::Conflict {
            message: "This group already has an open subscription".to_string(),
        });
    }

    // Subscriptions are billed to the group's owner, even when an admin sets them up
    let owner = Users::new(&mut conn).get_by_id(selection.user_id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: selection.user_id.to_string(),
    })?;
    drop(conn);

    let customer_id = ensure_customer(&state.db, provider.as_ref(), &owner).await?;

    let today = Utc::now().date_naive();
    let gateway_subscription = provider
        .create_subscription(&NewSubscription {
            customer_id: &customer_id,
            billing_type: create.billing_type,
            value: plan.price,
            cycle: plan.cycle,
            next_due_date: today,
            description: format!("{} - {}", plan.name, selection.group_name),
            external_reference: selection.id.to_string(),
        })
        .await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let created = Subscriptions::new(&mut conn)
        .create(&SubscriptionCreateDBRequest {
            user_id: owner.id,
            group_selection_id: selection.id,
            plan_id: plan.id,
            gateway_subscription_id: gateway_subscription.id.clone(),
            gateway_customer_id: customer_id,
            billing_type: create.billing_type,
            value: gateway_subscription.value.unwrap_or(plan.price),
            next_due_date: gateway_subscription.next_due_date.or(Some(today)),
        })
        .await;

    let subscription = match created {
        Ok(subscription) => subscription,
        Err(e) => {
            // A concurrent request won the group's slot; do not leave a charge behind
            if let Err(cancel_err) = provider.cancel_subscription(&gateway_subscription.id).await {
                warn!("Could not cancel orphaned gateway subscription {}: {cancel_err}", gateway_subscription.id);
            }
            return Err(e.into());
        }
    };

    info!(
        "Group {} subscribed to plan {} as {}",
        selection.id, plan.name, subscription.gateway_subscription_id
    );
    Ok((StatusCode::CREATED, Json(SubscriptionResponse::from(subscription))))
}

#[utoipa::path(
    get,
    path = "/subscriptions/{subscription_id}",
    tag = "subscriptions",
    summary = "Get subscription",
    params(("subscription_id" = uuid::Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription", body = SubscriptionResponse),
        (status = 404, description = "Subscription not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<SubscriptionId>,
    current_user: CurrentUser,
) -> Result<Json<SubscriptionResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let subscription = owned_subscription(&mut conn, &current_user, subscription_id).await?;
    Ok(Json(SubscriptionResponse::from(subscription)))
}

#[utoipa::path(
    post,
    path = "/subscriptions/{subscription_id}/cancel",
    tag = "subscriptions",
    summary = "Cancel subscription",
    description = "Cancels the subscription on the payment gateway and stops monitoring its group.",
    params(("subscription_id" = uuid::Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription canceled", body = SubscriptionResponse),
        (status = 400, description = "Subscription is already closed"),
        (status = 404, description = "Subscription not found"),
        (status = 501, description = "Payments are not configured"),
        (status = 502, description = "Payment gateway failure"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<SubscriptionId>,
    current_user: CurrentUser,
) -> Result<Json<SubscriptionResponse>> {
    let provider = require_provider(&state)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let subscription = owned_subscription(&mut conn, &current_user, subscription_id).await?;
    if !subscription.status.is_live() {
        return Err(Error::BadRequest {
            message: "Subscription is already canceled".to_string(),
        });
    }
    drop(conn);

    provider.cancel_subscription(&subscription.gateway_subscription_id).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let canceled = Subscriptions::new(&mut tx).cancel(subscription.id).await?;
    GroupSelections::new(&mut tx).set_active(subscription.group_selection_id, false).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!("Subscription {} canceled by {}", subscription.id, current_user.id);
    Ok(Json(SubscriptionResponse::from(canceled)))
}

#[utoipa::path(
    get,
    path = "/subscriptions/{subscription_id}/payments",
    tag = "subscriptions",
    summary = "List payments",
    params(("subscription_id" = uuid::Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Payments recorded for the subscription", body = Vec<PaymentResponse>),
        (status = 404, description = "Subscription not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_payments(
    State(state): State<AppState>,
    Path(subscription_id): Path<SubscriptionId>,
    current_user: CurrentUser,
) -> Result<Json<Vec<PaymentResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let subscription = owned_subscription(&mut conn, &current_user, subscription_id).await?;

    let payments = Payments::new(&mut conn).list_for_subscription(subscription.id).await?;
    Ok(Json(payments.into_iter().map(PaymentResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/subscriptions/{subscription_id}/payments/sync",
    tag = "subscriptions",
    summary = "Sync payments from the gateway",
    description = "Fetches the subscription's charges from the payment gateway and stores them locally. Subscription status is left to webhooks.",
    params(("subscription_id" = uuid::Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Payments after the sync", body = Vec<PaymentResponse>),
        (status = 404, description = "Subscription not found"),
        (status = 501, description = "Payments are not configured"),
        (status = 502, description = "Payment gateway failure"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn sync_payments(
    State(state): State<AppState>,
    Path(subscription_id): Path<SubscriptionId>,
    current_user: CurrentUser,
) -> Result<Json<Vec<PaymentResponse>>> {
    let provider = require_provider(&state)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let subscription = owned_subscription(&mut conn, &current_user, subscription_id).await?;
    drop(conn);

    let gateway_payments = provider.list_subscription_payments(&subscription.gateway_subscription_id).await?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let payments = billing::sync_payments(&mut conn, &subscription, &gateway_payments).await?;

    Ok(Json(payments.into_iter().map(PaymentResponse::from).collect()))
}
