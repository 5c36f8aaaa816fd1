use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use sqlx::PgConnection;
use tracing::{info, warn};

use crate::{
    AppState,
    api::{
        handlers::subscriptions::cancel_live_subscription,
        models::{
            groups::GatewayGroupListItem,
            instances::{InstanceCreate, InstanceResponse},
            users::CurrentUser,
        },
    },
    auth::permissions::check_owner,
    db::{
        handlers::{
            GroupSelections, Instances, Repository,
            group_selections::GroupSelectionFilter,
            instances::InstanceFilter,
        },
        models::instances::{InstanceCreateDBRequest, InstanceDBResponse, InstanceStatus, InstanceUpdateDBRequest},
    },
    errors::{Error, Result},
    messaging::QrCode,
    types::InstanceId,
};

/// Load an instance the caller owns. Other users' instances are reported as missing.
pub(crate) async fn owned_instance(conn: &mut PgConnection, current_user: &CurrentUser, id: InstanceId) -> Result<InstanceDBResponse> {
    let instance = Instances::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Instance".to_string(),
        id: id.to_string(),
    })?;
    check_owner(current_user, instance.user_id, "Instance", id)?;
    Ok(instance)
}

fn generated_instance_name() -> String {
    format!("gw-{}", uuid::Uuid::new_v4().simple())
}

#[utoipa::path(
    get,
    path = "/instances",
    tag = "instances",
    summary = "List instances",
    responses(
        (status = 200, description = "The caller's instances", body = Vec<InstanceResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_instances(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<Vec<InstanceResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let instances = Instances::new(&mut conn)
        .list(&InstanceFilter {
            user_id: Some(current_user.id),
        })
        .await?;

    Ok(Json(instances.into_iter().map(InstanceResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/instances",
    tag = "instances",
    summary = "Create instance",
    description = "Registers a new instance on the messaging gateway. The response carries the pairing QR code when the gateway returned one.",
    request_body = InstanceCreate,
    responses(
        (status = 201, description = "Instance created", body = InstanceResponse),
        (status = 400, description = "Invalid instance name"),
        (status = 409, description = "Instance name already taken"),
        (status = 502, description = "Messaging gateway failure"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_instance(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<InstanceCreate>,
) -> Result<(StatusCode, Json<InstanceResponse>)> {
    let instance_name = match create.name.map(|name| name.trim().to_string()) {
        Some(name) if name.is_empty() => {
            return Err(Error::BadRequest {
                message: "Instance name cannot be empty".to_string(),
            });
        }
        Some(name) => name,
        None => generated_instance_name(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    // Names are a global namespace on the gateway
    if Instances::new(&mut conn).get_by_name(&instance_name).await?.is_some() {
        return Err(Error::Conflict {
            message: "An instance with this name already exists".to_string(),
        });
    }
    drop(conn);

    let created = state.messaging.create_instance(&instance_name).await?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let instance = Instances::new(&mut conn)
        .create(&InstanceCreateDBRequest {
            user_id: current_user.id,
            instance_name: created.instance_name,
            gateway_instance_id: created.gateway_instance_id,
            status: created.status,
        })
        .await?;

    info!("User {} created instance {}", current_user.id, instance.instance_name);
    let response = InstanceResponse::from(instance).with_qr_code(created.qr_code);
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/instances/{instance_id}",
    tag = "instances",
    summary = "Get instance",
    params(("instance_id" = uuid::Uuid, Path, description = "Instance ID")),
    responses(
        (status = 200, description = "Instance details", body = InstanceResponse),
        (status = 404, description = "Instance not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<InstanceId>,
    current_user: CurrentUser,
) -> Result<Json<InstanceResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let instance = owned_instance(&mut conn, &current_user, instance_id).await?;
    Ok(Json(InstanceResponse::from(instance)))
}

#[utoipa::path(
    get,
    path = "/instances/{instance_id}/connect",
    tag = "instances",
    summary = "Start pairing",
    description = "Asks the gateway for a fresh QR code and marks the instance as connecting.",
    params(("instance_id" = uuid::Uuid, Path, description = "Instance ID")),
    responses(
        (status = 200, description = "Pairing material", body = QrCode),
        (status = 404, description = "Instance not found"),
        (status = 502, description = "Messaging gateway failure"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn connect_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<InstanceId>,
    current_user: CurrentUser,
) -> Result<Json<QrCode>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let instance = owned_instance(&mut conn, &current_user, instance_id).await?;
    drop(conn);

    let qr_code = state.messaging.connect(&instance.instance_name).await?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Instances::new(&mut conn)
        .update(
            instance.id,
            &InstanceUpdateDBRequest {
                status: Some(InstanceStatus::Connecting),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(qr_code))
}

#[utoipa::path(
    get,
    path = "/instances/{instance_id}/status",
    tag = "instances",
    summary = "Refresh connection status",
    params(("instance_id" = uuid::Uuid, Path, description = "Instance ID")),
    responses(
        (status = 200, description = "Instance with its current status", body = InstanceResponse),
        (status = 404, description = "Instance not found"),
        (status = 502, description = "Messaging gateway failure"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn instance_status(
    State(state): State<AppState>,
    Path(instance_id): Path<InstanceId>,
    current_user: CurrentUser,
) -> Result<Json<InstanceResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let instance = owned_instance(&mut conn, &current_user, instance_id).await?;
    drop(conn);

    let status = state.messaging.connection_state(&instance.instance_name).await?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let instance = Instances::new(&mut conn)
        .update(
            instance.id,
            &InstanceUpdateDBRequest {
                status: Some(status),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(InstanceResponse::from(instance)))
}

#[utoipa::path(
    delete,
    path = "/instances/{instance_id}",
    tag = "instances",
    summary = "Delete instance",
    description = "Logs the instance out of the gateway, cancels the billing of its groups and deletes it with all of its groups.",
    params(("instance_id" = uuid::Uuid, Path, description = "Instance ID")),
    responses(
        (status = 204, description = "Instance deleted"),
        (status = 404, description = "Instance not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_instance(State(state): State<AppState>, Path(instance_id): Path<InstanceId>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let instance = owned_instance(&mut conn, &current_user, instance_id).await?;
    let selections = GroupSelections::new(&mut conn)
        .list(&GroupSelectionFilter {
            user_id: None,
            instance_id: Some(instance.id),
        })
        .await?;
    drop(conn);

    if let Err(e) = state.messaging.logout(&instance.instance_name).await {
        warn!("Could not log out instance {}: {e}", instance.instance_name);
    }
    if let Err(e) = state.messaging.delete_instance(&instance.instance_name).await {
        warn!("Could not delete instance {} on the gateway: {e}", instance.instance_name);
    }
    for selection in &selections {
        cancel_live_subscription(&state, selection.id).await?;
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Instances::new(&mut conn).delete(instance.id).await?;
    info!("Instance {} deleted with {} group selections", instance.instance_name, selections.len());
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/instances/{instance_id}/groups",
    tag = "instances",
    summary = "List groups on the gateway",
    description = "Lists every group the connected number belongs to, marking the ones the instance owner already selected.",
    params(("instance_id" = uuid::Uuid, Path, description = "Instance ID")),
    responses(
        (status = 200, description = "Groups visible to the instance", body = Vec<GatewayGroupListItem>),
        (status = 404, description = "Instance not found"),
        (status = 502, description = "Messaging gateway failure"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_gateway_groups(
    State(state): State<AppState>,
    Path(instance_id): Path<InstanceId>,
    current_user: CurrentUser,
) -> Result<Json<Vec<GatewayGroupListItem>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let instance = owned_instance(&mut conn, &current_user, instance_id).await?;
    let selected: HashMap<String, _> = GroupSelections::new(&mut conn)
        .list(&GroupSelectionFilter {
            user_id: Some(instance.user_id),
            instance_id: None,
        })
        .await?
        .into_iter()
        .map(|selection| (selection.group_jid, selection.id))
        .collect();
    drop(conn);

    let groups = state.messaging.fetch_groups(&instance.instance_name).await?;

    let items = groups
        .into_iter()
        .map(|group| {
            let selection_id = selected.get(&group.jid).copied();
            GatewayGroupListItem {
                group,
                is_selected: selection_id.is_some(),
                selection_id,
            }
        })
        .collect();

    Ok(Json(items))
}

#[cfg(test)]
mod tests {
    use crate::api::models::groups::GatewayGroupListItem;
    use crate::api::models::instances::InstanceResponse;
    use crate::db::models::instances::InstanceStatus;
    use crate::gateway::{GatewayError, Result as GatewayResult};
    use crate::messaging::{
        CreatedInstance, GatewayGroup, MessagingGateway, QrCode, SentMessage,
        dummy::{DUMMY_GROUPS, DummyGateway},
    };
    use crate::test_utils::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::{PgPool, postgres::PgPoolOptions};
    use std::{sync::Arc, time::Duration};

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_instance_returns_qr_code(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let (name, value) = auth_header(&user);

        let response = server.post("/api/v1/instances").add_header(&name, &value).json(&json!({})).await;
        response.assert_status(StatusCode::CREATED);
        let instance: InstanceResponse = response.json();
        assert!(instance.instance_name.starts_with("gw-"));
        assert_eq!(instance.status, InstanceStatus::Created);
        assert!(instance.qr_code.is_some());

        let listed: Vec<InstanceResponse> = server.get("/api/v1/instances").add_header(&name, &value).await.json();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].qr_code.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_instance_name_conflicts(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let (name, value) = auth_header(&user);

        server
            .post("/api/v1/instances")
            .add_header(&name, &value)
            .json(&json!({"name": "gw-family"}))
            .await
            .assert_status(StatusCode::CREATED);
        server
            .post("/api/v1/instances")
            .add_header(&name, &value)
            .json(&json!({"name": "gw-family"}))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_connect_and_status_persist(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let instance = create_test_instance(&pool, user.id).await;
        let (name, value) = auth_header(&user);

        let response = server
            .get(&format!("/api/v1/instances/{}/connect", instance.id))
            .add_header(&name, &value)
            .await;
        response.assert_status_ok();
        assert!(response.json::<QrCode>().pairing_code.is_some());

        let fetched: InstanceResponse = server
            .get(&format!("/api/v1/instances/{}", instance.id))
            .add_header(&name, &value)
            .await
            .json();
        assert_eq!(fetched.status, InstanceStatus::Connecting);

        // The dummy gateway reports every instance as open
        let refreshed: InstanceResponse = server
            .get(&format!("/api/v1/instances/{}/status", instance.id))
            .add_header(&name, &value)
            .await
            .json();
        assert_eq!(refreshed.status, InstanceStatus::Open);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_other_users_instance_is_not_found(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let owner = create_test_user(&pool).await;
        let stranger = create_test_user(&pool).await;
        let instance = create_test_instance(&pool, owner.id).await;

        let (name, value) = auth_header(&stranger);
        server
            .get(&format!("/api/v1/instances/{}", instance.id))
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .delete(&format!("/api/v1/instances/{}", instance.id))
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_gateway_groups_mark_selected(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let instance = create_test_instance(&pool, user.id).await;
        let (name, value) = auth_header(&user);

        let (selected_jid, selected_name) = DUMMY_GROUPS[0];
        let response = server
            .post("/api/v1/groups")
            .add_header(&name, &value)
            .json(&json!({"instance_id": instance.id, "group_jid": selected_jid, "group_name": selected_name}))
            .await;
        response.assert_status(StatusCode::CREATED);

        let groups: Vec<GatewayGroupListItem> = server
            .get(&format!("/api/v1/instances/{}/groups", instance.id))
            .add_header(&name, &value)
            .await
            .json();
        assert_eq!(groups.len(), DUMMY_GROUPS.len());
        for item in &groups {
            assert_eq!(item.is_selected, item.group.jid == selected_jid);
            assert_eq!(item.selection_id.is_some(), item.is_selected);
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_instance_cascades_to_groups(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let subscription = create_test_subscription(&pool, user.id).await;
        let instance_id: uuid::Uuid = sqlx::query_scalar("SELECT instance_id FROM group_selections WHERE id = $1")
            .bind(subscription.group_selection_id)
            .fetch_one(&pool)
            .await
            .unwrap();

        let (name, value) = auth_header(&user);
        server
            .delete(&format!("/api/v1/instances/{instance_id}"))
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM group_selections WHERE instance_id = $1")
            .bind(instance_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    /// Dummy gateway that needs a database connection of its own to answer.
    struct PoolBoundGateway {
        db: PgPool,
    }

    impl PoolBoundGateway {
        async fn touch_db(&self) -> GatewayResult<()> {
            self.db.acquire().await.map(drop).map_err(|e| GatewayError::Status {
                service: "messaging",
                status: 503,
                body: e.to_string(),
            })
        }
    }

    #[async_trait]
    impl MessagingGateway for PoolBoundGateway {
        async fn create_instance(&self, instance_name: &str) -> GatewayResult<CreatedInstance> {
            self.touch_db().await?;
            DummyGateway.create_instance(instance_name).await
        }

        async fn connect(&self, instance_name: &str) -> GatewayResult<QrCode> {
            self.touch_db().await?;
            DummyGateway.connect(instance_name).await
        }

        async fn connection_state(&self, instance_name: &str) -> GatewayResult<InstanceStatus> {
            self.touch_db().await?;
            DummyGateway.connection_state(instance_name).await
        }

        async fn fetch_groups(&self, instance_name: &str) -> GatewayResult<Vec<GatewayGroup>> {
            self.touch_db().await?;
            DummyGateway.fetch_groups(instance_name).await
        }

        async fn send_text(&self, instance_name: &str, to: &str, text: &str) -> GatewayResult<SentMessage> {
            self.touch_db().await?;
            DummyGateway.send_text(instance_name, to, text).await
        }

        async fn logout(&self, instance_name: &str) -> GatewayResult<()> {
            self.touch_db().await?;
            DummyGateway.logout(instance_name).await
        }

        async fn delete_instance(&self, instance_name: &str) -> GatewayResult<()> {
            self.touch_db().await?;
            DummyGateway.delete_instance(instance_name).await
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_gateway_calls_do_not_hold_a_connection(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let (name, value) = auth_header(&user);

        // With a single connection, a handler holding it across the gateway call starves the gateway
        let single = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(1))
            .connect_with(pool.connect_options().as_ref().clone())
            .await
            .unwrap();
        let mut state = create_test_state(single.clone());
        state.messaging = Arc::new(PoolBoundGateway { db: single });
        let server = create_test_app_with_state(state).await;

        let response = server.post("/api/v1/instances").add_header(&name, &value).json(&json!({})).await;
        response.assert_status(StatusCode::CREATED);
        let instance: InstanceResponse = response.json();
        let base = format!("/api/v1/instances/{}", instance.id);

        server.get(&format!("{base}/connect")).add_header(&name, &value).await.assert_status_ok();
        server.get(&format!("{base}/status")).add_header(&name, &value).await.assert_status_ok();
        server.get(&format!("{base}/groups")).add_header(&name, &value).await.assert_status_ok();
        server
            .delete(&base)
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }
}
