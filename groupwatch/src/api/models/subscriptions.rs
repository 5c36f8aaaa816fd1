//! API request/response models for subscriptions and their payments.

use crate::db::models::{
    payments::{PaymentDBResponse, PaymentStatus},
    subscriptions::{BillingType, SubscriptionDBResponse, SubscriptionStatus},
};
use crate::types::{GroupSelectionId, PaymentId, PlanId, SubscriptionId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionCreate {
    #[schema(value_type = String, format = "uuid")]
    pub group_selection_id: GroupSelectionId,
    #[schema(value_type = String, format = "uuid")]
    pub plan_id: PlanId,
    #[serde(default = "default_billing_type")]
    pub billing_type: BillingType,
}

fn default_billing_type() -> BillingType {
    BillingType::Undefined
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: SubscriptionId,
    #[schema(value_type = String, format = "uuid")]
    pub group_selection_id: GroupSelectionId,
    #[schema(value_type = String, format = "uuid")]
    pub plan_id: PlanId,
    pub gateway_subscription_id: String,
    pub status: SubscriptionStatus,
    pub billing_type: BillingType,
    #[schema(value_type = String)]
    pub value: Decimal,
    pub next_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionDBResponse> for SubscriptionResponse {
    fn from(db: SubscriptionDBResponse) -> Self {
        Self {
            id: db.id,
            group_selection_id: db.group_selection_id,
            plan_id: db.plan_id,
            gateway_subscription_id: db.gateway_subscription_id,
            status: db.status,
            billing_type: db.billing_type,
            value: db.value,
            next_due_date: db.next_due_date,
            created_at: db.created_at,
            updated_at: db.updated_at,
            canceled_at: db.canceled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PaymentId,
    #[schema(value_type = String, format = "uuid")]
    pub subscription_id: SubscriptionId,
    pub gateway_payment_id: String,
    #[schema(value_type = String)]
    pub value: Decimal,
    pub status: PaymentStatus,
    pub billing_type: BillingType,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentDBResponse> for PaymentResponse {
    fn from(db: PaymentDBResponse) -> Self {
        Self {
            id: db.id,
            subscription_id: db.subscription_id,
            gateway_payment_id: db.gateway_payment_id,
            value: db.value,
            status: db.status,
            billing_type: db.billing_type,
            due_date: db.due_date,
            paid_at: db.paid_at,
            invoice_url: db.invoice_url,
            created_at: db.created_at,
        }
    }
}
