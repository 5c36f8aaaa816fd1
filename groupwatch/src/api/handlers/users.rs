use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::{info, warn};

use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        users::{CurrentUser, ListUsersQuery, UserResponse, UserUpdate},
    },
    auth::permissions::{RequiresAdmin, check_user_target, require_admin, resource},
    db::{
        handlers::{Repository, Subscriptions, Users, users::UserFilter},
        models::users::UserUpdateDBRequest,
    },
    errors::{Error, Result},
    types::{Operation, Resource, UserId, UserIdOrCurrent},
};

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Paginated list of users", body = PaginatedResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    _: RequiresAdmin<resource::Users>,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = UserFilter::new(skip, limit).with_search(query.search);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);
    let users = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    let data = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, total_count, skip, limit)))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Get user",
    params(("user_id" = String, Path, description = "User ID, or `current` for the caller")),
    responses(
        (status = 200, description = "User details", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to read other users"),
        (status = 404, description = "User not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    current_user: CurrentUser,
) -> Result<Json<UserResponse>> {
    let target = check_user_target(&current_user, user_id.resolve(current_user.id), Operation::ReadOwn)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn).get_by_id(target).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: target.to_string(),
    })?;

    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    patch,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Update user",
    params(("user_id" = String, Path, description = "User ID, or `current` for the caller")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "User not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    current_user: CurrentUser,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let target = check_user_target(&current_user, user_id.resolve(current_user.id), Operation::UpdateOwn)?;
    if update.is_admin.is_some() {
        require_admin(&current_user, Operation::UpdateAll, Resource::Users)?;
    }
    if update.is_admin == Some(false) && target == current_user.id {
        return Err(Error::BadRequest {
            message: "You cannot remove your own admin rights".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .update(
            target,
            &UserUpdateDBRequest {
                name: update.name,
                is_admin: update.is_admin,
                password_hash: None,
            },
        )
        .await?;

    Ok(Json(UserResponse::from(user)))
}

/// Cancel every live gateway subscription of a user. Failures are logged, not returned.
async fn cancel_gateway_subscriptions(state: &AppState, user_id: UserId) -> Result<()> {
    let Some(provider) = state.payments.as_ref() else {
        return Ok(());
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let live = Subscriptions::new(&mut conn).list_live_for_user(user_id).await?;
    drop(conn);

    for subscription in live {
        if let Err(e) = provider.cancel_subscription(&subscription.gateway_subscription_id).await {
            warn!(
                "Could not cancel gateway subscription {} while deleting user: {e}",
                subscription.gateway_subscription_id
            );
        }
    }
    Ok(())
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Delete user",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User and all of their data deleted"),
        (status = 400, description = "Cannot delete yourself"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: RequiresAdmin<resource::Users>,
) -> Result<StatusCode> {
    if user_id == current_user.id {
        return Err(Error::BadRequest {
            message: "You cannot delete your own account".to_string(),
        });
    }

    cancel_gateway_subscriptions(&state, user_id).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    // Instances, selections, subscriptions, payments and activity go with the user
    if !Users::new(&mut conn).delete(user_id).await? {
        return Err(Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        });
    }

    info!("User {user_id} deleted by {}", current_user.id);
    Ok(StatusCode::NO_CONTENT)
}
