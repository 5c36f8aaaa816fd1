//! Database models for billing plans.

use crate::types::PlanId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How often a plan bills. Mirrors the payment gateway's cycle names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "billing_cycle", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCycle {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    /// Wire name used by the payment gateway
    pub fn as_gateway_str(&self) -> &'static str {
        match self {
            BillingCycle::Weekly => "WEEKLY",
            BillingCycle::Monthly => "MONTHLY",
            BillingCycle::Quarterly => "QUARTERLY",
            BillingCycle::Yearly => "YEARLY",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlanDBResponse {
    pub id: PlanId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub cycle: BillingCycle,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PlanCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub cycle: BillingCycle,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PlanUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub cycle: Option<BillingCycle>,
    pub is_active: Option<bool>,
}
