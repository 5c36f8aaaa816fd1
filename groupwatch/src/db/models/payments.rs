//! Database models for subscription payments.

use crate::db::models::subscriptions::BillingType;
use crate::types::{PaymentId, SubscriptionId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Received,
    Confirmed,
    Overdue,
    Refunded,
    Deleted,
}

impl PaymentStatus {
    /// Map a payment gateway status string onto ours.
    ///
    /// The gateway has more granular states (e.g. `RECEIVED_IN_CASH`, `REFUND_REQUESTED`);
    /// they are folded into the closest local status.
    pub fn from_gateway_str(value: &str) -> Self {
        match value {
            "RECEIVED" | "RECEIVED_IN_CASH" => PaymentStatus::Received,
            "CONFIRMED" => PaymentStatus::Confirmed,
            "OVERDUE" => PaymentStatus::Overdue,
            "REFUNDED" | "REFUND_REQUESTED" | "REFUND_IN_PROGRESS" | "CHARGEBACK_REQUESTED" => PaymentStatus::Refunded,
            "DELETED" => PaymentStatus::Deleted,
            _ => PaymentStatus::Pending,
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Received | PaymentStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentDBResponse {
    pub id: PaymentId,
    pub subscription_id: SubscriptionId,
    pub gateway_payment_id: String,
    pub value: Decimal,
    pub status: PaymentStatus,
    pub billing_type: BillingType,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert-or-update keyed on `gateway_payment_id`.
#[derive(Debug, Clone)]
pub struct PaymentUpsertDBRequest {
    pub subscription_id: SubscriptionId,
    pub gateway_payment_id: String,
    pub value: Decimal,
    pub status: PaymentStatus,
    pub billing_type: BillingType,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
}
