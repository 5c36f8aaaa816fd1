use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    AppState,
    api::{
        handlers::groups::owned_selection,
        models::{
            pagination::{PaginatedResponse, Pagination},
            summaries::{SummaryCreate, SummaryResponse},
            users::CurrentUser,
        },
    },
    db::{
        handlers::{Instances, Messages, Repository, Summaries},
        models::summaries::{SummaryCreateDBRequest, SummaryStatus},
    },
    digest::{DigestRequest, build_digest},
    errors::{Error, Result},
    types::{GroupSelectionId, SummaryId},
};

#[utoipa::path(
    get,
    path = "/groups/{group_id}/summaries",
    tag = "summaries",
    summary = "List summaries",
    description = "Summaries generated for the group, newest first.",
    params(
        ("group_id" = uuid::Uuid, Path, description = "Group selection ID"),
        Pagination
    ),
    responses(
        (status = 200, description = "Paginated summaries", body = PaginatedResponse<SummaryResponse>),
        (status = 404, description = "Group not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_summaries(
    State(state): State<AppState>,
    Path(group_id): Path<GroupSelectionId>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<SummaryResponse>>> {
    let (skip, limit) = pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selection = owned_selection(&mut conn, &current_user, group_id).await?;

    let mut repo = Summaries::new(&mut conn);
    let summaries = repo.list_for_group(selection.id, skip, limit).await?;
    let total_count = repo.count_for_group(selection.id).await?;

    let data = summaries.into_iter().map(SummaryResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, total_count, skip, limit)))
}

#[utoipa::path(
    post,
    path = "/groups/{group_id}/summaries",
    tag = "summaries",
    summary = "Generate summary",
    description = "Builds a digest of the messages captured in `[period_start, period_end)` and stores it as pending. The window defaults to the configured length ending now.",
    params(("group_id" = uuid::Uuid, Path, description = "Group selection ID")),
    request_body = SummaryCreate,
    responses(
        (status = 201, description = "Summary generated", body = SummaryResponse),
        (status = 400, description = "Empty or inverted window"),
        (status = 404, description = "Group not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn generate_summary(
    State(state): State<AppState>,
    Path(group_id): Path<GroupSelectionId>,
    current_user: CurrentUser,
    Json(create): Json<SummaryCreate>,
) -> Result<(StatusCode, Json<SummaryResponse>)> {
    let period_end = create.period_end.unwrap_or_else(Utc::now);
    let period_start = match create.period_start {
        Some(start) => start,
        None => {
            let window = chrono::Duration::from_std(state.config.summaries.default_window).map_err(|e| Error::Internal {
                operation: format!("convert summary window: {e}"),
            })?;
            period_end - window
        }
    };
    if period_start >= period_end {
        return Err(Error::BadRequest {
            message: "period_start must be before period_end".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let selection = owned_selection(&mut conn, &current_user, group_id).await?;

    let messages = Messages::new(&mut conn).list_in_window(selection.id, period_start, period_end).await?;
    let content = build_digest(&DigestRequest {
        group_name: &selection.group_name,
        period_start,
        period_end,
        messages: &messages,
        max_excerpts: state.config.summaries.max_excerpts,
    });

    let summary = Summaries::new(&mut conn)
        .create(&SummaryCreateDBRequest {
            group_selection_id: selection.id,
            content,
            message_count: i32::try_from(messages.len()).unwrap_or(i32::MAX),
            period_start,
            period_end,
        })
        .await?;

    info!("Generated summary {} from {} messages", summary.id, summary.message_count);
    Ok((StatusCode::CREATED, Json(SummaryResponse::from(summary))))
}

fn summary_not_found(id: SummaryId) -> Error {
    Error::NotFound {
        resource: "Summary".to_string(),
        id: id.to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/summaries/{summary_id}",
    tag = "summaries",
    summary = "Get summary",
    params(("summary_id" = uuid::Uuid, Path, description = "Summary ID")),
    responses(
        (status = 200, description = "Summary", body = SummaryResponse),
        (status = 404, description = "Summary not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_summary(
    State(state): State<AppState>,
    Path(summary_id): Path<SummaryId>,
    current_user: CurrentUser,
) -> Result<Json<SummaryResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let summary = Summaries::new(&mut conn)
        .get_by_id(summary_id)
        .await?
        .ok_or_else(|| summary_not_found(summary_id))?;
    owned_selection(&mut conn, &current_user, summary.group_selection_id).await?;

    Ok(Json(SummaryResponse::from(summary)))
}

#[utoipa::path(
    post,
    path = "/summaries/{summary_id}/send",
    tag = "summaries",
    summary = "Send summary to the group",
    description = "Posts the digest into the WhatsApp group through the instance that monitors it. A gateway failure is recorded on the summary and reported as 502.",
    params(("summary_id" = uuid::Uuid, Path, description = "Summary ID")),
    responses(
        (status = 200, description = "Summary sent", body = SummaryResponse),
        (status = 404, description = "Summary not found"),
        (status = 502, description = "Messaging gateway failure; the summary is marked FAILED"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn send_summary(
    State(state): State<AppState>,
    Path(summary_id): Path<SummaryId>,
    current_user: CurrentUser,
) -> Result<Json<SummaryResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let summary = Summaries::new(&mut conn)
        .get_by_id(summary_id)
        .await?
        .ok_or_else(|| summary_not_found(summary_id))?;
    let selection = owned_selection(&mut conn, &current_user, summary.group_selection_id).await?;
    let instance = Instances::new(&mut conn)
        .get_by_id(selection.instance_id)
        .await?
        .ok_or_else(|| summary_not_found(summary_id))?;
    drop(conn);

    let sent = state
        .messaging
        .send_text(&instance.instance_name, &selection.group_jid, &summary.content)
        .await;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    match sent {
        Ok(_) => {
            let summary = Summaries::new(&mut conn).mark_delivery(summary.id, SummaryStatus::Sent, None).await?;
            info!("Summary {} sent to {}", summary.id, selection.group_jid);
            Ok(Json(SummaryResponse::from(summary)))
        }
        Err(e) => {
            warn!("Failed to send summary {}: {e}", summary.id);
            Summaries::new(&mut conn)
                .mark_delivery(summary.id, SummaryStatus::Failed, Some(&e.to_string()))
                .await?;
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use crate::api::models::{pagination::PaginatedResponse, summaries::SummaryResponse};
    use crate::config::EvolutionConfig;
    use crate::db::{
        handlers::{Messages, Summaries},
        models::{messages::MessageCreateDBRequest, summaries::SummaryStatus},
    };
    use crate::messaging::evolution::EvolutionGateway;
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use sqlx::PgPool;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[sqlx::test]
    #[test_log::test]
    async fn test_generate_summary_for_window(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;

        let now = Utc::now();
        let mut conn = pool.acquire().await.unwrap();
        for (i, sender) in ["Alice", "Bob", "Alice"].iter().enumerate() {
            Messages::new(&mut conn)
                .insert(&MessageCreateDBRequest {
                    group_selection_id: selection.id,
                    gateway_message_id: format!("MSG{i}"),
                    sender_jid: Some(format!("{}@s.whatsapp.net", sender.to_lowercase())),
                    sender_name: Some(sender.to_string()),
                    content: format!("hello {i}"),
                    sent_at: now - ChronoDuration::minutes(30 - i as i64),
                })
                .await
                .unwrap();
        }

        let (name, value) = auth_header(&user);
        let url = format!("/api/v1/groups/{}/summaries", selection.id);
        let response = server.post(&url).add_header(&name, &value).json(&json!({})).await;
        response.assert_status(StatusCode::CREATED);
        let summary: SummaryResponse = response.json();
        assert_eq!(summary.message_count, 3);
        assert_eq!(summary.status, SummaryStatus::Pending);
        assert!(summary.content.contains("Participants: 2"));
        assert!(summary.content.contains("1. Alice (2)"));

        // A window before any message is empty
        let response = server
            .post(&url)
            .add_header(&name, &value)
            .json(&json!({
                "period_start": now - ChronoDuration::days(3),
                "period_end": now - ChronoDuration::days(2),
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let empty: SummaryResponse = response.json();
        assert_eq!(empty.message_count, 0);
        assert!(empty.content.contains("No activity"));

        let page: PaginatedResponse<SummaryResponse> = server.get(&url).add_header(&name, &value).await.json();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.data[0].id, empty.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_inverted_window_rejected(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;
        let (name, value) = auth_header(&user);

        let now = Utc::now();
        server
            .post(&format!("/api/v1/groups/{}/summaries", selection.id))
            .add_header(&name, &value)
            .json(&json!({"period_start": now, "period_end": now - ChronoDuration::hours(1)}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_send_summary_marks_sent(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;
        let (name, value) = auth_header(&user);

        let created: SummaryResponse = server
            .post(&format!("/api/v1/groups/{}/summaries", selection.id))
            .add_header(&name, &value)
            .json(&json!({}))
            .await
            .json();

        let stranger = create_test_user(&pool).await;
        let (stranger_name, stranger_value) = auth_header(&stranger);
        server
            .post(&format!("/api/v1/summaries/{}/send", created.id))
            .add_header(&stranger_name, &stranger_value)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let response = server
            .post(&format!("/api/v1/summaries/{}/send", created.id))
            .add_header(&name, &value)
            .await;
        response.assert_status_ok();
        let sent: SummaryResponse = response.json();
        assert_eq!(sent.status, SummaryStatus::Sent);
        assert!(sent.sent_at.is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_gateway_failure_marks_summary_failed(pool: PgPool) {
        let gateway = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("instance not connected"))
            .mount(&gateway)
            .await;

        let mut state = create_test_state(pool.clone());
        let evolution = EvolutionConfig {
            base_url: gateway.uri().parse().unwrap(),
            api_key: "test-key".to_string(),
            timeout: Duration::from_secs(5),
            webhook_url: None,
            webhook_token: None,
        };
        state.messaging = Arc::new(EvolutionGateway::new(&evolution).unwrap());
        let server = create_test_app_with_state(state).await;

        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;
        let (name, value) = auth_header(&user);

        let created: SummaryResponse = server
            .post(&format!("/api/v1/groups/{}/summaries", selection.id))
            .add_header(&name, &value)
            .json(&json!({}))
            .await
            .json();

        server
            .post(&format!("/api/v1/summaries/{}/send", created.id))
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::BAD_GATEWAY);

        let mut conn = pool.acquire().await.unwrap();
        let stored = Summaries::new(&mut conn).get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SummaryStatus::Failed);
        assert!(stored.error.is_some());
    }
}
