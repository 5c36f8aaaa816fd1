//! Database models for captured group messages.

use crate::types::{GroupSelectionId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageDBResponse {
    pub id: MessageId,
    pub group_selection_id: GroupSelectionId,
    pub gateway_message_id: String,
    pub sender_jid: Option<String>,
    pub sender_name: Option<String>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessageCreateDBRequest {
    pub group_selection_id: GroupSelectionId,
    pub gateway_message_id: String,
    pub sender_jid: Option<String>,
    pub sender_name: Option<String>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}
