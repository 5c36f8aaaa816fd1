//! Database models for generated summaries.

use crate::types::{GroupSelectionId, SummaryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "summary_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SummaryStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SummaryDBResponse {
    pub id: SummaryId,
    pub group_selection_id: GroupSelectionId,
    pub content: String,
    pub message_count: i32,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub status: SummaryStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SummaryCreateDBRequest {
    pub group_selection_id: GroupSelectionId,
    pub content: String,
    pub message_count: i32,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}
