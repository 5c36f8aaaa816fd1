use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;
use tracing::info;

use crate::{
    AppState,
    api::{
        handlers::{instances::owned_instance, subscriptions::cancel_live_subscription},
        models::{
            groups::{GroupSelectionCreate, GroupSelectionResponse, GroupSelectionUpdate, ListGroupSelectionsQuery},
            users::CurrentUser,
        },
    },
    auth::permissions::check_owner,
    db::{
        handlers::{GroupSelections, Repository, Subscriptions, group_selections::GroupSelectionFilter},
        models::{
            group_selections::{GroupSelectionCreateDBRequest, GroupSelectionDBResponse, GroupSelectionUpdateDBRequest},
            subscriptions::SubscriptionStatus,
        },
    },
    errors::{Error, Result},
    types::GroupSelectionId,
};

/// Group JIDs end in this suffix; contacts use `@s.whatsapp.net`
pub const GROUP_JID_SUFFIX: &str = "@g.us";

/// Load a group selection the caller owns. Other users' selections are reported as missing.
pub(crate) async fn owned_selection(
    conn: &mut PgConnection,
    current_user: &CurrentUser,
    id: GroupSelectionId,
) -> Result<GroupSelectionDBResponse> {
    let selection = GroupSelections::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Group".to_string(),
        id: id.to_string(),
    })?;
    check_owner(current_user, selection.user_id, "Group", id)?;
    Ok(selection)
}

#[utoipa::path(
    get,
    path = "/groups",
    tag = "groups",
    summary = "List monitored groups",
    params(ListGroupSelectionsQuery),
    responses(
        (status = 200, description = "The caller's group selections", body = Vec<GroupSelectionResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<ListGroupSelectionsQuery>,
    current_user: CurrentUser,
) -> Result<Json<Vec<GroupSelectionResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selections = GroupSelections::new(&mut conn)
        .list(&GroupSelectionFilter {
            user_id: Some(current_user.id),
            instance_id: query.instance_id,
        })
        .await?;

    Ok(Json(selections.into_iter().map(GroupSelectionResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/groups",
    tag = "groups",
    summary = "Select a group",
    description = "Starts tracking a group seen through one of the caller's instances. Monitoring stays off until the group's subscription is paid.",
    request_body = GroupSelectionCreate,
    responses(
        (status = 201, description = "Group selected", body = GroupSelectionResponse),
        (status = 400, description = "Not a group JID"),
        (status = 404, description = "Instance not found"),
        (status = 409, description = "This group is already selected"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn select_group(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<GroupSelectionCreate>,
) -> Result<(StatusCode, Json<GroupSelectionResponse>)> {
    if !create.group_jid.ends_with(GROUP_JID_SUFFIX) {
        return Err(Error::BadRequest {
            message: format!("group_jid must end in {GROUP_JID_SUFFIX}"),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let instance = owned_instance(&mut conn, &current_user, create.instance_id).await?;

    // The (user, group) unique constraint turns a second selection into 409
    let selection = GroupSelections::new(&mut conn)
        .create(&GroupSelectionCreateDBRequest {
            user_id: instance.user_id,
            instance_id: instance.id,
            group_jid: create.group_jid,
            group_name: create.group_name,
        })
        .await?;

    info!("Group {} selected on instance {}", selection.group_jid, instance.instance_name);
    Ok((StatusCode::CREATED, Json(GroupSelectionResponse::from(selection))))
}

#[utoipa::path(
    get,
    path = "/groups/{group_id}",
    tag = "groups",
    summary = "Get monitored group",
    params(("group_id" = uuid::Uuid, Path, description = "Group selection ID")),
    responses(
        (status = 200, description = "Group selection", body = GroupSelectionResponse),
        (status = 404, description = "Group not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupSelectionId>,
    current_user: CurrentUser,
) -> Result<Json<GroupSelectionResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selection = owned_selection(&mut conn, &current_user, group_id).await?;
    Ok(Json(GroupSelectionResponse::from(selection)))
}

#[utoipa::path(
    patch,
    path = "/groups/{group_id}",
    tag = "groups",
    summary = "Update monitored group",
    params(("group_id" = uuid::Uuid, Path, description = "Group selection ID")),
    request_body = GroupSelectionUpdate,
    responses(
        (status = 200, description = "Group selection updated", body = GroupSelectionResponse),
        (status = 400, description = "Activation requires an active subscription"),
        (status = 404, description = "Group not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupSelectionId>,
    current_user: CurrentUser,
    Json(update): Json<GroupSelectionUpdate>,
) -> Result<Json<GroupSelectionResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selection = owned_selection(&mut conn, &current_user, group_id).await?;

    if update.is_active == Some(true) && !selection.is_active && !current_user.is_admin {
        let paid = Subscriptions::new(&mut conn)
            .get_live_for_group(selection.id)
            .await?
            .is_some_and(|subscription| subscription.status == SubscriptionStatus::Active);
        if !paid {
            return Err(Error::BadRequest {
                message: "Monitoring can only be enabled for groups with an active subscription".to_string(),
            });
        }
    }

    let selection = GroupSelections::new(&mut conn)
        .update(
            selection.id,
            &GroupSelectionUpdateDBRequest {
                group_name: update.group_name,
                is_active: update.is_active,
            },
        )
        .await?;

    Ok(Json(GroupSelectionResponse::from(selection)))
}

#[utoipa::path(
    delete,
    path = "/groups/{group_id}",
    tag = "groups",
    summary = "Stop monitoring a group",
    description = "Cancels the group's open subscription on the payment gateway, then deletes the selection with its schedule, messages and summaries.",
    params(("group_id" = uuid::Uuid, Path, description = "Group selection ID")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 404, description = "Group not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_group(State(state): State<AppState>, Path(group_id): Path<GroupSelectionId>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selection = owned_selection(&mut conn, &current_user, group_id).await?;
    drop(conn);

    cancel_live_subscription(&state, selection.id).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    GroupSelections::new(&mut conn).delete(selection.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::models::groups::GroupSelectionResponse;
    use crate::db::handlers::{Repository, Subscriptions};
    use crate::db::models::subscriptions::{SubscriptionStatus, SubscriptionUpdateDBRequest};
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_selecting_same_group_twice_conflicts(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let instance = create_test_instance(&pool, user.id).await;
        let (name, value) = auth_header(&user);
        let body = json!({"instance_id": instance.id, "group_jid": "42@g.us", "group_name": "Book club"});

        let response = server.post("/api/v1/groups").add_header(&name, &value).json(&body).await;
        response.assert_status(StatusCode::CREATED);
        assert!(!response.json::<GroupSelectionResponse>().is_active);

        let response = server.post("/api/v1/groups").add_header(&name, &value).json(&body).await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(response.json::<serde_json::Value>()["error"], "This group is already selected");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_select_requires_own_instance_and_group_jid(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let owner = create_test_user(&pool).await;
        let stranger = create_test_user(&pool).await;
        let instance = create_test_instance(&pool, owner.id).await;

        let (name, value) = auth_header(&stranger);
        server
            .post("/api/v1/groups")
            .add_header(&name, &value)
            .json(&json!({"instance_id": instance.id, "group_jid": "42@g.us", "group_name": "Book club"}))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let (name, value) = auth_header(&owner);
        server
            .post("/api/v1/groups")
            .add_header(&name, &value)
            .json(&json!({"instance_id": instance.id, "group_jid": "5511999999999@s.whatsapp.net", "group_name": "Not a group"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_activation_requires_active_subscription(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let subscription = create_test_subscription(&pool, user.id).await;
        let (name, value) = auth_header(&user);
        let url = format!("/api/v1/groups/{}", subscription.group_selection_id);

        server
            .patch(&url)
            .add_header(&name, &value)
            .json(&json!({"is_active": true}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let mut conn = pool.acquire().await.unwrap();
        Subscriptions::new(&mut conn)
            .update(
                subscription.id,
                &SubscriptionUpdateDBRequest {
                    status: Some(SubscriptionStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let response = server.patch(&url).add_header(&name, &value).json(&json!({"is_active": true})).await;
        response.assert_status_ok();
        assert!(response.json::<GroupSelectionResponse>().is_active);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_may_activate_without_payment(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;

        let (name, value) = auth_header(&admin);
        let response = server
            .patch(&format!("/api/v1/groups/{}", selection.id))
            .add_header(&name, &value)
            .json(&json!({"is_active": true, "group_name": "Renamed"}))
            .await;
        response.assert_status_ok();
        let updated: GroupSelectionResponse = response.json();
        assert!(updated.is_active);
        assert_eq!(updated.group_name, "Renamed");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_group_removes_subscription(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let subscription = create_test_subscription(&pool, user.id).await;
        let (name, value) = auth_header(&user);

        server
            .delete(&format!("/api/v1/groups/{}", subscription.group_selection_id))
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let listed: Vec<GroupSelectionResponse> = server.get("/api/v1/groups").add_header(&name, &value).await.json();
        assert!(listed.is_empty());

        let mut conn = pool.acquire().await.unwrap();
        assert!(Subscriptions::new(&mut conn).get_by_id(subscription.id).await.unwrap().is_none());
    }
}
