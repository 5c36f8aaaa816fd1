//! Database repository for subscriptions.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::subscriptions::{SubscriptionCreateDBRequest, SubscriptionDBResponse, SubscriptionStatus, SubscriptionUpdateDBRequest},
};
use crate::types::{GroupSelectionId, SubscriptionId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub user_id: Option<UserId>,
    pub group_selection_id: Option<GroupSelectionId>,
}

pub struct Subscriptions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Subscriptions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_gateway_id(&mut self, gateway_subscription_id: &str) -> Result<Option<SubscriptionDBResponse>> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>("SELECT * FROM subscriptions WHERE gateway_subscription_id = $1")
            .bind(gateway_subscription_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(subscription)
    }

    /// The subscription currently holding this group's billing slot (PENDING, ACTIVE or OVERDUE).
    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&group_selection_id)), err)]
    pub async fn get_live_for_group(&mut self, group_selection_id: GroupSelectionId) -> Result<Option<SubscriptionDBResponse>> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>(
            "SELECT * FROM subscriptions WHERE group_selection_id = $1 AND status = ANY($2) ORDER BY created_at DESC LIMIT 1",
        )
        .bind(group_selection_id)
        .bind(SubscriptionStatus::LIVE.as_slice())
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(subscription)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_live_for_user(&mut self, user_id: UserId) -> Result<Vec<SubscriptionDBResponse>> {
        let subscriptions = sqlx::query_as::<_, SubscriptionDBResponse>(
            "SELECT * FROM subscriptions WHERE user_id = $1 AND status = ANY($2) ORDER BY created_at",
        )
        .bind(user_id)
        .bind(SubscriptionStatus::LIVE.as_slice())
        .fetch_all(&mut *self.db)
        .await?;

        Ok(subscriptions)
    }

    /// Mark a subscription canceled. `canceled_at` is stamped by `update`.
    #[instrument(skip(self), fields(subscription_id = %abbrev_uuid(&id)), err)]
    pub async fn cancel(&mut self, id: SubscriptionId) -> Result<SubscriptionDBResponse> {
        self.update(
            id,
            &SubscriptionUpdateDBRequest {
                status: Some(SubscriptionStatus::Canceled),
                ..Default::default()
            },
        )
        .await
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Subscriptions<'c> {
    type CreateRequest = SubscriptionCreateDBRequest;
    type UpdateRequest = SubscriptionUpdateDBRequest;
    type Response = SubscriptionDBResponse;
    type Id = SubscriptionId;
    type Filter = SubscriptionFilter;

    #[instrument(skip(self, request), fields(selection_id = %abbrev_uuid(&request.group_selection_id), gateway_id = %request.gateway_subscription_id), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>(
            r#"
            INSERT INTO subscriptions (
                id, user_id, group_selection_id, plan_id, gateway_subscription_id, gateway_customer_id,
                status, billing_type, value, next_due_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.group_selection_id)
        .bind(request.plan_id)
        .bind(&request.gateway_subscription_id)
        .bind(&request.gateway_customer_id)
        .bind(request.billing_type)
        .bind(request.value)
        .bind(request.next_due_date)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(subscription)
    }

    #[instrument(skip(self), fields(subscription_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>("SELECT * FROM subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(subscription)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let subscriptions = sqlx::query_as::<_, SubscriptionDBResponse>("SELECT * FROM subscriptions WHERE id = ANY($1)")
            .bind(ids.as_slice())
            .fetch_all(&mut *self.db)
            .await?;

        Ok(subscriptions.into_iter().map(|s| (s.id, s)).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let subscriptions = sqlx::query_as::<_, SubscriptionDBResponse>(
            r#"
            SELECT * FROM subscriptions
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::uuid IS NULL OR group_selection_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.group_selection_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(subscriptions)
    }

    #[instrument(skip(self), fields(subscription_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(subscription_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let subscription = sqlx::query_as::<_, SubscriptionDBResponse>(
            r#"
            UPDATE subscriptions SET
                status = COALESCE($2, status),
                value = COALESCE($3, value),
                next_due_date = COALESCE($4, next_due_date),
                canceled_at = CASE
                    WHEN $2 = 'CANCELED'::subscription_status THEN COALESCE(canceled_at, NOW())
                    ELSE canceled_at
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.status)
        .bind(request.value)
        .bind(request.next_due_date)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::subscriptions::BillingType;
    use crate::test_utils::{create_test_group_selection, create_test_plan, create_test_user};
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    fn new_subscription(user_id: UserId, selection_id: GroupSelectionId, plan_id: Uuid, gateway_id: &str) -> SubscriptionCreateDBRequest {
        SubscriptionCreateDBRequest {
            user_id,
            group_selection_id: selection_id,
            plan_id,
            gateway_subscription_id: gateway_id.to_string(),
            gateway_customer_id: "cus_1".to_string(),
            billing_type: BillingType::Pix,
            value: Decimal::new(2990, 2),
            next_due_date: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_one_live_subscription_per_group(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;
        let plan = create_test_plan(&pool).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Subscriptions::new(&mut conn);

        let first = repo.create(&new_subscription(user.id, selection.id, plan.id, "sub_1")).await.unwrap();
        assert_eq!(first.status, SubscriptionStatus::Pending);

        let err = repo
            .create(&new_subscription(user.id, selection.id, plan.id, "sub_2"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_of("subscriptions_one_live_per_group"));

        // Once canceled, the slot frees up
        let canceled = repo.cancel(first.id).await.unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert!(canceled.canceled_at.is_some());

        repo.create(&new_subscription(user.id, selection.id, plan.id, "sub_2")).await.unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_live_lookups(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;
        let plan = create_test_plan(&pool).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Subscriptions::new(&mut conn);

        assert!(repo.get_live_for_group(selection.id).await.unwrap().is_none());

        let created = repo.create(&new_subscription(user.id, selection.id, plan.id, "sub_live")).await.unwrap();
        let live = repo.get_live_for_group(selection.id).await.unwrap().unwrap();
        assert_eq!(live.id, created.id);

        assert_eq!(repo.list_live_for_user(user.id).await.unwrap().len(), 1);
        let by_gateway = repo.get_by_gateway_id("sub_live").await.unwrap().unwrap();
        assert_eq!(by_gateway.id, created.id);

        repo.update(
            created.id,
            &SubscriptionUpdateDBRequest {
                status: Some(SubscriptionStatus::Expired),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(repo.get_live_for_group(selection.id).await.unwrap().is_none());
        assert!(repo.list_live_for_user(user.id).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_referenced_plan_cannot_be_deleted(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;
        let plan = create_test_plan(&pool).await;

        let mut conn = pool.acquire().await.unwrap();
        Subscriptions::new(&mut conn)
            .create(&new_subscription(user.id, selection.id, plan.id, "sub_fk"))
            .await
            .unwrap();

        let err = crate::db::handlers::Plans::new(&mut conn).delete(plan.id).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
