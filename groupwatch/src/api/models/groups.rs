//! API request/response models for group selections and gateway group listings.

use crate::db::models::group_selections::GroupSelectionDBResponse;
use crate::messaging::GatewayGroup;
use crate::types::{GroupSelectionId, InstanceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct GroupSelectionCreate {
    #[schema(value_type = String, format = "uuid")]
    pub instance_id: InstanceId,
    /// Group JID, ending in `@g.us`
    pub group_jid: String,
    pub group_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct GroupSelectionUpdate {
    pub group_name: Option<String>,
    /// Turning monitoring on requires an active subscription (admins excepted)
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupSelectionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GroupSelectionId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub instance_id: InstanceId,
    pub group_jid: String,
    pub group_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupSelectionDBResponse> for GroupSelectionResponse {
    fn from(db: GroupSelectionDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            instance_id: db.instance_id,
            group_jid: db.group_jid,
            group_name: db.group_name,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListGroupSelectionsQuery {
    /// Only selections made through this instance
    #[param(value_type = Option<String>, format = "uuid")]
    pub instance_id: Option<InstanceId>,
}

/// A group as the messaging gateway lists it, annotated with the caller's selection state
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewayGroupListItem {
    #[serde(flatten)]
    pub group: GatewayGroup,
    pub is_selected: bool,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub selection_id: Option<GroupSelectionId>,
}
