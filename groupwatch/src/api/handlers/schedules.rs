use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::{
        handlers::groups::owned_selection,
        models::{
            schedules::{DEFAULT_TIMEZONE, ScheduleResponse, ScheduleUpsert},
            users::CurrentUser,
        },
    },
    db::{handlers::Schedules, models::schedules::ScheduleUpsertDBRequest},
    errors::{Error, Result},
    types::GroupSelectionId,
};

fn schedule_not_found(group_id: GroupSelectionId) -> Error {
    Error::NotFound {
        resource: "Schedule for group".to_string(),
        id: group_id.to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/groups/{group_id}/schedule",
    tag = "schedules",
    summary = "Get delivery schedule",
    params(("group_id" = uuid::Uuid, Path, description = "Group selection ID")),
    responses(
        (status = 200, description = "The group's schedule", body = ScheduleResponse),
        (status = 404, description = "Group not found or no schedule set"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(group_id): Path<GroupSelectionId>,
    current_user: CurrentUser,
) -> Result<Json<ScheduleResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selection = owned_selection(&mut conn, &current_user, group_id).await?;

    let schedule = Schedules::new(&mut conn)
        .get_for_group(selection.id)
        .await?
        .ok_or_else(|| schedule_not_found(group_id))?;

    Ok(Json(ScheduleResponse::from(schedule)))
}

#[utoipa::path(
    put,
    path = "/groups/{group_id}/schedule",
    tag = "schedules",
    summary = "Set delivery schedule",
    description = "Creates or replaces the group's schedule. Weekly schedules need `day_of_week`; daily ones must omit it.",
    params(("group_id" = uuid::Uuid, Path, description = "Group selection ID")),
    request_body = ScheduleUpsert,
    responses(
        (status = 200, description = "Schedule stored", body = ScheduleResponse),
        (status = 400, description = "Invalid frequency/day combination"),
        (status = 404, description = "Group not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn upsert_schedule(
    State(state): State<AppState>,
    Path(group_id): Path<GroupSelectionId>,
    current_user: CurrentUser,
    Json(upsert): Json<ScheduleUpsert>,
) -> Result<Json<ScheduleResponse>> {
    upsert.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selection = owned_selection(&mut conn, &current_user, group_id).await?;

    let timezone = upsert
        .timezone
        .filter(|tz| !tz.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());

    let schedule = Schedules::new(&mut conn)
        .upsert(&ScheduleUpsertDBRequest {
            group_selection_id: selection.id,
            frequency: upsert.frequency,
            send_time: upsert.send_time,
            day_of_week: upsert.day_of_week,
            timezone,
            is_active: upsert.is_active.unwrap_or(true),
        })
        .await?;

    Ok(Json(ScheduleResponse::from(schedule)))
}

#[utoipa::path(
    delete,
    path = "/groups/{group_id}/schedule",
    tag = "schedules",
    summary = "Delete delivery schedule",
    params(("group_id" = uuid::Uuid, Path, description = "Group selection ID")),
    responses(
        (status = 204, description = "Schedule deleted"),
        (status = 404, description = "Group not found or no schedule set"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(group_id): Path<GroupSelectionId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selection = owned_selection(&mut conn, &current_user, group_id).await?;

    if !Schedules::new(&mut conn).delete_for_group(selection.id).await? {
        return Err(schedule_not_found(group_id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::models::schedules::ScheduleResponse;
    use crate::db::models::schedules::ScheduleFrequency;
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_schedule_lifecycle(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;
        let (name, value) = auth_header(&user);
        let url = format!("/api/v1/groups/{}/schedule", selection.id);

        server.get(&url).add_header(&name, &value).await.assert_status(StatusCode::NOT_FOUND);

        let response = server
            .put(&url)
            .add_header(&name, &value)
            .json(&json!({"frequency": "WEEKLY", "send_time": "18:30:00", "day_of_week": 5}))
            .await;
        response.assert_status_ok();
        let weekly: ScheduleResponse = response.json();
        assert_eq!(weekly.frequency, ScheduleFrequency::Weekly);
        assert_eq!(weekly.timezone, "UTC");
        assert!(weekly.is_active);

        let daily: ScheduleResponse = server
            .put(&url)
            .add_header(&name, &value)
            .json(&json!({"frequency": "DAILY", "send_time": "08:00:00", "timezone": "America/Sao_Paulo"}))
            .await
            .json();
        assert_eq!(daily.id, weekly.id);
        assert_eq!(daily.day_of_week, None);

        server.delete(&url).add_header(&name, &value).await.assert_status(StatusCode::NO_CONTENT);
        server.get(&url).add_header(&name, &value).await.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invalid_day_combinations_rejected(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;
        let (name, value) = auth_header(&user);
        let url = format!("/api/v1/groups/{}/schedule", selection.id);

        for body in [
            json!({"frequency": "WEEKLY", "send_time": "18:30:00"}),
            json!({"frequency": "WEEKLY", "send_time": "18:30:00", "day_of_week": 7}),
            json!({"frequency": "DAILY", "send_time": "18:30:00", "day_of_week": 1}),
        ] {
            server
                .put(&url)
                .add_header(&name, &value)
                .json(&body)
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }
    }
}
