//! API request/response models for summary delivery schedules.

use crate::db::models::schedules::{ScheduleDBResponse, ScheduleFrequency};
use crate::errors::Error;
use crate::types::{GroupSelectionId, ScheduleId};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ScheduleUpsert {
    pub frequency: ScheduleFrequency,
    /// Local time of day, `HH:MM[:SS]`
    #[schema(value_type = String, example = "18:00:00")]
    pub send_time: NaiveTime,
    /// 0 = Sunday .. 6 = Saturday. Required for weekly schedules, rejected for daily ones.
    pub day_of_week: Option<i16>,
    /// IANA timezone name (default `UTC`)
    pub timezone: Option<String>,
    pub is_active: Option<bool>,
}

impl ScheduleUpsert {
    /// Check the frequency/day combination.
    pub fn validate(&self) -> Result<(), Error> {
        match (self.frequency, self.day_of_week) {
            (ScheduleFrequency::Weekly, None) => Err(Error::BadRequest {
                message: "Weekly schedules require day_of_week".to_string(),
            }),
            (ScheduleFrequency::Weekly, Some(day)) if !(0..=6).contains(&day) => Err(Error::BadRequest {
                message: "day_of_week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            }),
            (ScheduleFrequency::Daily, Some(_)) => Err(Error::BadRequest {
                message: "Daily schedules must not set day_of_week".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduleResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ScheduleId,
    #[schema(value_type = String, format = "uuid")]
    pub group_selection_id: GroupSelectionId,
    pub frequency: ScheduleFrequency,
    #[schema(value_type = String)]
    pub send_time: NaiveTime,
    pub day_of_week: Option<i16>,
    pub timezone: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ScheduleDBResponse> for ScheduleResponse {
    fn from(db: ScheduleDBResponse) -> Self {
        Self {
            id: db.id,
            group_selection_id: db.group_selection_id,
            frequency: db.frequency,
            send_time: db.send_time,
            day_of_week: db.day_of_week,
            timezone: db.timezone,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
