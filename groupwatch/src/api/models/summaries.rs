//! API request/response models for generated summaries.

use crate::db::models::summaries::{SummaryDBResponse, SummaryStatus};
use crate::types::{GroupSelectionId, SummaryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Window to summarise. Both ends default relative to now.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SummaryCreate {
    /// Inclusive start (default: now minus the configured window)
    pub period_start: Option<DateTime<Utc>>,
    /// Exclusive end (default: now)
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SummaryResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: SummaryId,
    #[schema(value_type = String, format = "uuid")]
    pub group_selection_id: GroupSelectionId,
    pub content: String,
    pub message_count: i32,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub status: SummaryStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<SummaryDBResponse> for SummaryResponse {
    fn from(db: SummaryDBResponse) -> Self {
        Self {
            id: db.id,
            group_selection_id: db.group_selection_id,
            content: db.content,
            message_count: db.message_count,
            period_start: db.period_start,
            period_end: db.period_end,
            status: db.status,
            sent_at: db.sent_at,
            error: db.error,
            created_at: db.created_at,
        }
    }
}
