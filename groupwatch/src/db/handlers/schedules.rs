//! Database repository for summary schedules (one per group selection).

use crate::db::{
    errors::Result,
    models::schedules::{ScheduleDBResponse, ScheduleUpsertDBRequest},
};
use crate::types::{GroupSelectionId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Schedules<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Schedules<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&group_selection_id)), err)]
    pub async fn get_for_group(&mut self, group_selection_id: GroupSelectionId) -> Result<Option<ScheduleDBResponse>> {
        let schedule = sqlx::query_as::<_, ScheduleDBResponse>("SELECT * FROM schedules WHERE group_selection_id = $1")
            .bind(group_selection_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(schedule)
    }

    #[instrument(skip(self, request), fields(selection_id = %abbrev_uuid(&request.group_selection_id), frequency = ?request.frequency), err)]
    pub async fn upsert(&mut self, request: &ScheduleUpsertDBRequest) -> Result<ScheduleDBResponse> {
        let schedule = sqlx::query_as::<_, ScheduleDBResponse>(
            r#"
            INSERT INTO schedules (id, group_selection_id, frequency, send_time, day_of_week, timezone, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT ON CONSTRAINT schedules_group_selection_unique DO UPDATE SET
                frequency = EXCLUDED.frequency,
                send_time = EXCLUDED.send_time,
                day_of_week = EXCLUDED.day_of_week,
                timezone = EXCLUDED.timezone,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.group_selection_id)
        .bind(request.frequency)
        .bind(request.send_time)
        .bind(request.day_of_week)
        .bind(&request.timezone)
        .bind(request.is_active)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(schedule)
    }

    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&group_selection_id)), err)]
    pub async fn delete_for_group(&mut self, group_selection_id: GroupSelectionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM schedules WHERE group_selection_id = $1")
            .bind(group_selection_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
