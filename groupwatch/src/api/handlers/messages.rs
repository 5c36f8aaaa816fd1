use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    api::{
        handlers::groups::owned_selection,
        models::{
            messages::MessageResponse,
            pagination::{PaginatedResponse, Pagination},
            users::CurrentUser,
        },
    },
    db::handlers::Messages,
    errors::{Error, Result},
    types::GroupSelectionId,
};

#[utoipa::path(
    get,
    path = "/groups/{group_id}/messages",
    tag = "messages",
    summary = "List captured messages",
    description = "Messages captured from the group, newest first.",
    params(
        ("group_id" = uuid::Uuid, Path, description = "Group selection ID"),
        Pagination
    ),
    responses(
        (status = 200, description = "Paginated messages", body = PaginatedResponse<MessageResponse>),
        (status = 404, description = "Group not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(group_id): Path<GroupSelectionId>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<MessageResponse>>> {
    let (skip, limit) = pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selection = owned_selection(&mut conn, &current_user, group_id).await?;

    let mut repo = Messages::new(&mut conn);
    let messages = repo.list_for_group(selection.id, skip, limit).await?;
    let total_count = repo.count_for_group(selection.id).await?;

    let data = messages.into_iter().map(MessageResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, total_count, skip, limit)))
}

#[cfg(test)]
mod tests {
    use crate::api::models::{messages::MessageResponse, pagination::PaginatedResponse};
    use crate::db::{handlers::Messages, models::messages::MessageCreateDBRequest};
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_messages_newest_first_and_paginated(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;

        let base = Utc::now() - Duration::hours(1);
        let mut conn = pool.acquire().await.unwrap();
        for i in 0..3 {
            Messages::new(&mut conn)
                .insert(&MessageCreateDBRequest {
                    group_selection_id: selection.id,
                    gateway_message_id: format!("MSG{i}"),
                    sender_jid: Some("5511999999999@s.whatsapp.net".to_string()),
                    sender_name: Some("Alice".to_string()),
                    content: format!("message {i}"),
                    sent_at: base + Duration::minutes(i),
                })
                .await
                .unwrap();
        }

        let (name, value) = auth_header(&user);
        let response = server
            .get(&format!("/api/v1/groups/{}/messages", selection.id))
            .add_query_param("limit", 2)
            .add_header(&name, &value)
            .await;
        response.assert_status_ok();
        let page: PaginatedResponse<MessageResponse> = response.json();
        assert_eq!(page.total_count, 3);
        let contents: Vec<&str> = page.data.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 2", "message 1"]);

        let stranger = create_test_user(&pool).await;
        let (name, value) = auth_header(&stranger);
        server
            .get(&format!("/api/v1/groups/{}/messages", selection.id))
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
