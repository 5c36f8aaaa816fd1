//! Database models for summary delivery schedules.

use crate::types::{GroupSelectionId, ScheduleId};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "schedule_frequency", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleFrequency {
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleDBResponse {
    pub id: ScheduleId,
    pub group_selection_id: GroupSelectionId,
    pub frequency: ScheduleFrequency,
    pub send_time: NaiveTime,
    /// 0 = Sunday .. 6 = Saturday; set only for weekly schedules
    pub day_of_week: Option<i16>,
    pub timezone: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ScheduleUpsertDBRequest {
    pub group_selection_id: GroupSelectionId,
    pub frequency: ScheduleFrequency,
    pub send_time: NaiveTime,
    pub day_of_week: Option<i16>,
    pub timezone: String,
    pub is_active: bool,
}
