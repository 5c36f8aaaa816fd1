//! Database repository for summaries.

use crate::db::{
    errors::{DbError, Result},
    models::summaries::{SummaryCreateDBRequest, SummaryDBResponse, SummaryStatus},
};
use crate::types::{GroupSelectionId, SummaryId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Summaries<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Summaries<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(selection_id = %abbrev_uuid(&request.group_selection_id), message_count = request.message_count), err)]
    pub async fn create(&mut self, request: &SummaryCreateDBRequest) -> Result<SummaryDBResponse> {
        let summary = sqlx::query_as::<_, SummaryDBResponse>(
            r#"
            INSERT INTO summaries (id, group_selection_id, content, message_count, period_start, period_end, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.group_selection_id)
        .bind(&request.content)
        .bind(request.message_count)
        .bind(request.period_start)
        .bind(request.period_end)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(summary)
    }

    #[instrument(skip(self), fields(summary_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: SummaryId) -> Result<Option<SummaryDBResponse>> {
        let summary = sqlx::query_as::<_, SummaryDBResponse>("SELECT * FROM summaries WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(summary)
    }

    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&group_selection_id)), err)]
    pub async fn list_for_group(&mut self, group_selection_id: GroupSelectionId, skip: i64, limit: i64) -> Result<Vec<SummaryDBResponse>> {
        let summaries = sqlx::query_as::<_, SummaryDBResponse>(
            "SELECT * FROM summaries WHERE group_selection_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(group_selection_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(summaries)
    }

    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&group_selection_id)), err)]
    pub async fn count_for_group(&mut self, group_selection_id: GroupSelectionId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM summaries WHERE group_selection_id = $1")
            .bind(group_selection_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Record the outcome of a delivery attempt.
    ///
    /// `Sent` stamps `sent_at` and clears any earlier error; `Failed` stores `error`.
    #[instrument(skip(self, error), fields(summary_id = %abbrev_uuid(&id), status = ?status), err)]
    pub async fn mark_delivery(&mut self, id: SummaryId, status: SummaryStatus, error: Option<&str>) -> Result<SummaryDBResponse> {
        let summary = sqlx::query_as::<_, SummaryDBResponse>(
            r#"
            UPDATE summaries SET
                status = $2,
                sent_at = CASE WHEN $2 = 'SENT'::summary_status THEN NOW() ELSE sent_at END,
                error = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(summary)
    }
}
