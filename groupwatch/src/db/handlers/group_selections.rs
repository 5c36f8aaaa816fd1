//! Database repository for group selections.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::group_selections::{GroupSelectionCreateDBRequest, GroupSelectionDBResponse, GroupSelectionUpdateDBRequest},
};
use crate::types::{GroupSelectionId, InstanceId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct GroupSelectionFilter {
    pub user_id: Option<UserId>,
    pub instance_id: Option<InstanceId>,
}

pub struct GroupSelections<'c> {
    db: &'c mut PgConnection,
}

impl<'c> GroupSelections<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// The active selection monitoring `group_jid` on this instance, if any.
    ///
    /// At most one row can match: an instance has a single owner and a user selects a group once.
    #[instrument(skip(self), fields(instance_id = %abbrev_uuid(&instance_id)), err)]
    pub async fn get_active_for_group(&mut self, instance_id: InstanceId, group_jid: &str) -> Result<Option<GroupSelectionDBResponse>> {
        let selection = sqlx::query_as::<_, GroupSelectionDBResponse>(
            "SELECT * FROM group_selections WHERE instance_id = $1 AND group_jid = $2 AND is_active",
        )
        .bind(instance_id)
        .bind(group_jid)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(selection)
    }

    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&id)), err)]
    pub async fn set_active(&mut self, id: GroupSelectionId, is_active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE group_selections SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for GroupSelections<'c> {
    type CreateRequest = GroupSelectionCreateDBRequest;
    type UpdateRequest = GroupSelectionUpdateDBRequest;
    type Response = GroupSelectionDBResponse;
    type Id = GroupSelectionId;
    type Filter = GroupSelectionFilter;

    /// New selections start inactive; a confirmed payment switches them on.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), group_jid = %request.group_jid), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let selection = sqlx::query_as::<_, GroupSelectionDBResponse>(
            r#"
            INSERT INTO group_selections (id, user_id, instance_id, group_jid, group_name, is_active)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.instance_id)
        .bind(&request.group_jid)
        .bind(&request.group_name)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(selection)
    }

    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let selection = sqlx::query_as::<_, GroupSelectionDBResponse>("SELECT * FROM group_selections WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(selection)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let selections = sqlx::query_as::<_, GroupSelectionDBResponse>("SELECT * FROM group_selections WHERE id = ANY($1)")
            .bind(ids.as_slice())
            .fetch_all(&mut *self.db)
            .await?;

        Ok(selections.into_iter().map(|s| (s.id, s)).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let selections = sqlx::query_as::<_, GroupSelectionDBResponse>(
            r#"
            SELECT * FROM group_selections
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::uuid IS NULL OR instance_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.instance_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(selections)
    }

    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM group_selections WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(selection_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let selection = sqlx::query_as::<_, GroupSelectionDBResponse>(
            r#"
            UPDATE group_selections SET
                group_name = COALESCE($2, group_name),
                is_active = COALESCE($3, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.group_name)
        .bind(request.is_active)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(selection)
    }
}
