//! Database repository for messaging-gateway instances.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::instances::{InstanceCreateDBRequest, InstanceDBResponse, InstanceStatus, InstanceUpdateDBRequest},
};
use crate::types::{InstanceId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing instances
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    /// Restrict to one owner; `None` lists everything
    pub user_id: Option<UserId>,
}

pub struct Instances<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Instances<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Look an instance up by its gateway-facing name, as carried in webhook payloads.
    #[instrument(skip(self), err)]
    pub async fn get_by_name(&mut self, instance_name: &str) -> Result<Option<InstanceDBResponse>> {
        let instance = sqlx::query_as::<_, InstanceDBResponse>("SELECT * FROM instances WHERE instance_name = $1")
            .bind(instance_name)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(instance)
    }

    #[instrument(skip(self), err)]
    pub async fn set_status_by_name(&mut self, instance_name: &str, status: InstanceStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE instances SET status = $2, updated_at = NOW() WHERE instance_name = $1")
            .bind(instance_name)
            .bind(status)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Instances<'c> {
    type CreateRequest = InstanceCreateDBRequest;
    type UpdateRequest = InstanceUpdateDBRequest;
    type Response = InstanceDBResponse;
    type Id = InstanceId;
    type Filter = InstanceFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), instance_name = %request.instance_name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let instance = sqlx::query_as::<_, InstanceDBResponse>(
            r#"
            INSERT INTO instances (id, user_id, instance_name, gateway_instance_id, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.instance_name)
        .bind(&request.gateway_instance_id)
        .bind(request.status)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(instance)
    }

    #[instrument(skip(self), fields(instance_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let instance = sqlx::query_as::<_, InstanceDBResponse>("SELECT * FROM instances WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(instance)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let instances = sqlx::query_as::<_, InstanceDBResponse>("SELECT * FROM instances WHERE id = ANY($1)")
            .bind(ids.as_slice())
            .fetch_all(&mut *self.db)
            .await?;

        Ok(instances.into_iter().map(|i| (i.id, i)).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let instances = sqlx::query_as::<_, InstanceDBResponse>(
            "SELECT * FROM instances WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC",
        )
        .bind(filter.user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(instances)
    }

    #[instrument(skip(self), fields(instance_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM instances WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(instance_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let instance = sqlx::query_as::<_, InstanceDBResponse>(
            r#"
            UPDATE instances SET
                status = COALESCE($2, status),
                phone_number = COALESCE($3, phone_number),
                gateway_instance_id = COALESCE($4, gateway_instance_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.status)
        .bind(&request.phone_number)
        .bind(&request.gateway_instance_id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(instance)
    }
}
