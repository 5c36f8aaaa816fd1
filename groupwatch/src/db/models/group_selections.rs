//! Database models for monitored group selections.

use crate::types::{GroupSelectionId, InstanceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupSelectionDBResponse {
    pub id: GroupSelectionId,
    pub user_id: UserId,
    pub instance_id: InstanceId,
    pub group_jid: String,
    pub group_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GroupSelectionCreateDBRequest {
    pub user_id: UserId,
    pub instance_id: InstanceId,
    pub group_jid: String,
    pub group_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct GroupSelectionUpdateDBRequest {
    pub group_name: Option<String>,
    pub is_active: Option<bool>,
}
