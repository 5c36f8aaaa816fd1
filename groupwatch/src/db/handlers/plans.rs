//! Database repository for billing plans.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::plans::{PlanCreateDBRequest, PlanDBResponse, PlanUpdateDBRequest},
};
use crate::types::{PlanId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    pub include_inactive: bool,
}

pub struct Plans<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Plans<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Plans<'c> {
    type CreateRequest = PlanCreateDBRequest;
    type UpdateRequest = PlanUpdateDBRequest;
    type Response = PlanDBResponse;
    type Id = PlanId;
    type Filter = PlanFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let plan = sqlx::query_as::<_, PlanDBResponse>(
            r#"
            INSERT INTO plans (id, name, description, price, cycle, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.price)
        .bind(request.cycle)
        .bind(request.is_active)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(plan)
    }

    #[instrument(skip(self), fields(plan_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let plan = sqlx::query_as::<_, PlanDBResponse>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(plan)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let plans = sqlx::query_as::<_, PlanDBResponse>("SELECT * FROM plans WHERE id = ANY($1)")
            .bind(ids.as_slice())
            .fetch_all(&mut *self.db)
            .await?;

        Ok(plans.into_iter().map(|p| (p.id, p)).collect())
    }

    #[instrument(skip(self, filter), fields(include_inactive = filter.include_inactive), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let plans = sqlx::query_as::<_, PlanDBResponse>(
            "SELECT * FROM plans WHERE ($1 OR is_active) ORDER BY price ASC, name ASC",
        )
        .bind(filter.include_inactive)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(plans)
    }

    #[instrument(skip(self), fields(plan_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM plans WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(plan_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let plan = sqlx::query_as::<_, PlanDBResponse>(
            r#"
            UPDATE plans SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                cycle = COALESCE($5, cycle),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.price)
        .bind(request.cycle)
        .bind(request.is_active)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::plans::BillingCycle;
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    fn plan(name: &str, price: Decimal, is_active: bool) -> PlanCreateDBRequest {
        PlanCreateDBRequest {
            name: name.to_string(),
            description: None,
            price,
            cycle: BillingCycle::Monthly,
            is_active,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_list_plans(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Plans::new(&mut conn);

        let basic = repo.create(&plan("Basic", Decimal::new(1990, 2), true)).await.unwrap();
        assert_eq!(basic.price, Decimal::new(1990, 2));
        assert_eq!(basic.cycle, BillingCycle::Monthly);
        repo.create(&plan("Legacy", Decimal::new(990, 2), false)).await.unwrap();

        let active = repo.list(&PlanFilter::default()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Basic");

        let all = repo.list(&PlanFilter { include_inactive: true }).await.unwrap();
        assert_eq!(all.len(), 2);
        // Cheapest first
        assert_eq!(all[0].name, "Legacy");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_negative_price_is_check_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Plans::new(&mut conn);

        let err = repo.create(&plan("Broken", Decimal::new(-100, 2), true)).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_plan_name(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Plans::new(&mut conn);

        repo.create(&plan("Pro", Decimal::ONE, true)).await.unwrap();
        let err = repo.create(&plan("Pro", Decimal::TWO, true)).await.unwrap_err();
        assert!(err.is_unique_violation_of("plans_name_unique"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_plan_partial(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Plans::new(&mut conn);

        let created = repo.create(&plan("Starter", Decimal::TEN, true)).await.unwrap();
        let updated = repo
            .update(
                created.id,
                &PlanUpdateDBRequest {
                    is_active: Some(false),
                    cycle: Some(BillingCycle::Yearly),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Starter");
        assert_eq!(updated.price, Decimal::TEN);
        assert_eq!(updated.cycle, BillingCycle::Yearly);
        assert!(!updated.is_active);
    }
}
