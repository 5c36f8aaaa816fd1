//! API response models for captured group messages.

use crate::db::models::messages::MessageDBResponse;
use crate::types::{GroupSelectionId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: MessageId,
    #[schema(value_type = String, format = "uuid")]
    pub group_selection_id: GroupSelectionId,
    pub gateway_message_id: String,
    pub sender_jid: Option<String>,
    pub sender_name: Option<String>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl From<MessageDBResponse> for MessageResponse {
    fn from(db: MessageDBResponse) -> Self {
        Self {
            id: db.id,
            group_selection_id: db.group_selection_id,
            gateway_message_id: db.gateway_message_id,
            sender_jid: db.sender_jid,
            sender_name: db.sender_name,
            content: db.content,
            sent_at: db.sent_at,
        }
    }
}
