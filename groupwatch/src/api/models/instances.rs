//! API request/response models for messaging-gateway instances.

use crate::db::models::instances::{InstanceDBResponse, InstanceStatus};
use crate::messaging::QrCode;
use crate::types::InstanceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct InstanceCreate {
    /// Gateway instance name. Generated as `gw-<uuid>` when omitted.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InstanceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: InstanceId,
    pub instance_name: String,
    pub gateway_instance_id: Option<String>,
    pub status: InstanceStatus,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Present right after creation when the gateway returned a pairing code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<QrCode>,
}

impl From<InstanceDBResponse> for InstanceResponse {
    fn from(db: InstanceDBResponse) -> Self {
        Self {
            id: db.id,
            instance_name: db.instance_name,
            gateway_instance_id: db.gateway_instance_id,
            status: db.status,
            phone_number: db.phone_number,
            created_at: db.created_at,
            updated_at: db.updated_at,
            qr_code: None,
        }
    }
}

impl InstanceResponse {
    pub fn with_qr_code(mut self, qr_code: Option<QrCode>) -> Self {
        self.qr_code = qr_code;
        self
    }
}
