//! Database models for messaging-gateway instances.

use crate::types::{InstanceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Connection state of a WhatsApp instance as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "instance_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Created,
    Connecting,
    Open,
    Closed,
}

impl InstanceStatus {
    /// Map a gateway connection state (`open`, `connecting`, `close`) onto our status.
    ///
    /// Unknown states are treated as closed.
    pub fn from_gateway_state(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "open" => InstanceStatus::Open,
            "connecting" => InstanceStatus::Connecting,
            "created" => InstanceStatus::Created,
            _ => InstanceStatus::Closed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InstanceDBResponse {
    pub id: InstanceId,
    pub user_id: UserId,
    pub instance_name: String,
    pub gateway_instance_id: Option<String>,
    pub status: InstanceStatus,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InstanceCreateDBRequest {
    pub user_id: UserId,
    pub instance_name: String,
    pub gateway_instance_id: Option<String>,
    pub status: InstanceStatus,
}

#[derive(Debug, Clone, Default)]
pub struct InstanceUpdateDBRequest {
    pub status: Option<InstanceStatus>,
    pub phone_number: Option<String>,
    pub gateway_instance_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_state_mapping() {
        assert_eq!(InstanceStatus::from_gateway_state("open"), InstanceStatus::Open);
        assert_eq!(InstanceStatus::from_gateway_state("CONNECTING"), InstanceStatus::Connecting);
        assert_eq!(InstanceStatus::from_gateway_state("close"), InstanceStatus::Closed);
        assert_eq!(InstanceStatus::from_gateway_state("refused"), InstanceStatus::Closed);
    }
}
