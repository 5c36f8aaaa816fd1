use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;

use crate::{
    AppState,
    api::models::{
        plans::{ListPlansQuery, PlanCreate, PlanResponse, PlanUpdate},
        users::CurrentUser,
    },
    auth::permissions::{RequiresAdmin, resource},
    db::{
        handlers::{Plans, Repository, plans::PlanFilter},
        models::plans::{PlanCreateDBRequest, PlanUpdateDBRequest},
    },
    errors::{Error, Result},
    types::PlanId,
};

fn check_price(price: Decimal) -> Result<()> {
    if price.is_sign_negative() {
        return Err(Error::BadRequest {
            message: "Plan price cannot be negative".to_string(),
        });
    }
    Ok(())
}

fn plan_not_found(id: PlanId) -> Error {
    Error::NotFound {
        resource: "Plan".to_string(),
        id: id.to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/plans",
    tag = "plans",
    summary = "List plans",
    params(ListPlansQuery),
    responses(
        (status = 200, description = "Available plans", body = Vec<PlanResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_plans(
    State(state): State<AppState>,
    Query(query): Query<ListPlansQuery>,
    current_user: CurrentUser,
) -> Result<Json<Vec<PlanResponse>>> {
    let filter = PlanFilter {
        include_inactive: query.include_inactive && current_user.is_admin,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let plans = Plans::new(&mut conn).list(&filter).await?;

    Ok(Json(plans.into_iter().map(PlanResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/plans/{plan_id}",
    tag = "plans",
    summary = "Get plan",
    params(("plan_id" = uuid::Uuid, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Plan details", body = PlanResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Plan not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_plan(State(state): State<AppState>, Path(plan_id): Path<PlanId>, current_user: CurrentUser) -> Result<Json<PlanResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let plan = Plans::new(&mut conn)
        .get_by_id(plan_id)
        .await?
        // Retired plans are only visible to admins
        .filter(|plan| plan.is_active || current_user.is_admin)
        .ok_or_else(|| plan_not_found(plan_id))?;

    Ok(Json(PlanResponse::from(plan)))
}

#[utoipa::path(
    post,
    path = "/plans",
    tag = "plans",
    summary = "Create plan",
    request_body = PlanCreate,
    responses(
        (status = 201, description = "Plan created", body = PlanResponse),
        (status = 400, description = "Invalid price"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "A plan with this name already exists"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_plan(
    State(state): State<AppState>,
    _: RequiresAdmin<resource::Plans>,
    Json(create): Json<PlanCreate>,
) -> Result<(StatusCode, Json<PlanResponse>)> {
    check_price(create.price)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let plan = Plans::new(&mut conn)
        .create(&PlanCreateDBRequest {
            name: create.name,
            description: create.description,
            price: create.price,
            cycle: create.cycle,
            is_active: create.is_active,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(PlanResponse::from(plan))))
}

#[utoipa::path(
    patch,
    path = "/plans/{plan_id}",
    tag = "plans",
    summary = "Update plan",
    params(("plan_id" = uuid::Uuid, Path, description = "Plan ID")),
    request_body = PlanUpdate,
    responses(
        (status = 200, description = "Plan updated", body = PlanResponse),
        (status = 400, description = "Invalid price"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Plan not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<PlanId>,
    _: RequiresAdmin<resource::Plans>,
    Json(update): Json<PlanUpdate>,
) -> Result<Json<PlanResponse>> {
    if let Some(price) = update.price {
        check_price(price)?;
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let plan = Plans::new(&mut conn)
        .update(
            plan_id,
            &PlanUpdateDBRequest {
                name: update.name,
                description: update.description,
                price: update.price,
                cycle: update.cycle,
                is_active: update.is_active,
            },
        )
        .await?;

    Ok(Json(PlanResponse::from(plan)))
}

#[utoipa::path(
    delete,
    path = "/plans/{plan_id}",
    tag = "plans",
    summary = "Delete plan",
    params(("plan_id" = uuid::Uuid, Path, description = "Plan ID")),
    responses(
        (status = 204, description = "Plan deleted"),
        (status = 400, description = "Plan is referenced by subscriptions"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Plan not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_plan(State(state): State<AppState>, Path(plan_id): Path<PlanId>, _: RequiresAdmin<resource::Plans>) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Plans::new(&mut conn).delete(plan_id).await? {
        return Err(plan_not_found(plan_id));
    }
    Ok(StatusCode::NO_CONTENT)
}
