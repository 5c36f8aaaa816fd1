//! Database models for per-group subscriptions.

use crate::types::{GroupSelectionId, PlanId, SubscriptionId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "subscription_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Overdue,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    /// Statuses that still hold the group's billing slot.
    pub const LIVE: [SubscriptionStatus; 3] = [SubscriptionStatus::Pending, SubscriptionStatus::Active, SubscriptionStatus::Overdue];

    pub fn is_live(&self) -> bool {
        Self::LIVE.contains(self)
    }
}

/// How the customer pays. Shared by subscriptions and payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "billing_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingType {
    Boleto,
    CreditCard,
    Pix,
    Undefined,
}

impl BillingType {
    pub fn as_gateway_str(&self) -> &'static str {
        match self {
            BillingType::Boleto => "BOLETO",
            BillingType::CreditCard => "CREDIT_CARD",
            BillingType::Pix => "PIX",
            BillingType::Undefined => "UNDEFINED",
        }
    }

    /// Lenient parse of gateway billing types; anything unknown is `Undefined`.
    pub fn from_gateway_str(value: &str) -> Self {
        match value {
            "BOLETO" => BillingType::Boleto,
            "CREDIT_CARD" => BillingType::CreditCard,
            "PIX" => BillingType::Pix,
            _ => BillingType::Undefined,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscriptionDBResponse {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub group_selection_id: GroupSelectionId,
    pub plan_id: PlanId,
    pub gateway_subscription_id: String,
    pub gateway_customer_id: String,
    pub status: SubscriptionStatus,
    pub billing_type: BillingType,
    pub value: Decimal,
    pub next_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionCreateDBRequest {
    pub user_id: UserId,
    pub group_selection_id: GroupSelectionId,
    pub plan_id: PlanId,
    pub gateway_subscription_id: String,
    pub gateway_customer_id: String,
    pub billing_type: BillingType,
    pub value: Decimal,
    pub next_due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdateDBRequest {
    pub status: Option<SubscriptionStatus>,
    pub value: Option<Decimal>,
    pub next_due_date: Option<NaiveDate>,
}
