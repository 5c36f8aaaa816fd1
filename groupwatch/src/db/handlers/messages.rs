//! Database repository for captured group messages.

use crate::db::{
    errors::Result,
    models::messages::{MessageCreateDBRequest, MessageDBResponse},
};
use crate::types::{GroupSelectionId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Messages<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Messages<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Store a message. Returns `None` when the gateway redelivered one we already have.
    #[instrument(skip(self, request), fields(selection_id = %abbrev_uuid(&request.group_selection_id)), err)]
    pub async fn insert(&mut self, request: &MessageCreateDBRequest) -> Result<Option<MessageDBResponse>> {
        let message = sqlx::query_as::<_, MessageDBResponse>(
            r#"
            INSERT INTO messages (id, group_selection_id, gateway_message_id, sender_jid, sender_name, content, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT ON CONSTRAINT messages_gateway_id_unique DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.group_selection_id)
        .bind(&request.gateway_message_id)
        .bind(&request.sender_jid)
        .bind(&request.sender_name)
        .bind(&request.content)
        .bind(request.sent_at)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(message)
    }

    /// Page through a group's messages, newest first.
    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&group_selection_id)), err)]
    pub async fn list_for_group(&mut self, group_selection_id: GroupSelectionId, skip: i64, limit: i64) -> Result<Vec<MessageDBResponse>> {
        let messages = sqlx::query_as::<_, MessageDBResponse>(
            "SELECT * FROM messages WHERE group_selection_id = $1 ORDER BY sent_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(group_selection_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(messages)
    }

    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&group_selection_id)), err)]
    pub async fn count_for_group(&mut self, group_selection_id: GroupSelectionId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE group_selection_id = $1")
            .bind(group_selection_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// All messages sent in `[start, end)`, oldest first.
    #[instrument(skip(self), fields(selection_id = %abbrev_uuid(&group_selection_id)), err)]
    pub async fn list_in_window(
        &mut self,
        group_selection_id: GroupSelectionId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MessageDBResponse>> {
        let messages = sqlx::query_as::<_, MessageDBResponse>(
            r#"
            SELECT * FROM messages
            WHERE group_selection_id = $1 AND sent_at >= $2 AND sent_at < $3
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .bind(group_selection_id)
        .bind(start)
        .bind(end)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_group_selection, create_test_user};
    use chrono::Duration;
    use sqlx::PgPool;

    fn message(group_selection_id: GroupSelectionId, id: &str, sent_at: DateTime<Utc>) -> MessageCreateDBRequest {
        MessageCreateDBRequest {
            group_selection_id,
            gateway_message_id: id.to_string(),
            sender_jid: Some("5511999999999@s.whatsapp.net".to_string()),
            sender_name: Some("Ana".to_string()),
            content: format!("message {id}"),
            sent_at,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_redelivered_message_is_ignored(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Messages::new(&mut conn);

        let now = Utc::now();
        assert!(repo.insert(&message(selection.id, "A1", now)).await.unwrap().is_some());
        assert!(repo.insert(&message(selection.id, "A1", now)).await.unwrap().is_none());
        assert_eq!(repo.count_for_group(selection.id).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_ordering_and_window(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let selection = create_test_group_selection(&pool, user.id).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Messages::new(&mut conn);

        let base = Utc::now() - Duration::hours(10);
        for i in 0..5 {
            repo.insert(&message(selection.id, &format!("M{i}"), base + Duration::hours(i)))
                .await
                .unwrap();
        }

        let newest = repo.list_for_group(selection.id, 0, 2).await.unwrap();
        assert_eq!(newest[0].gateway_message_id, "M4");
        assert_eq!(newest[1].gateway_message_id, "M3");

        // Half-open window [base+1h, base+3h)
        let window = repo
            .list_in_window(selection.id, base + Duration::hours(1), base + Duration::hours(3))
            .await
            .unwrap();
        let ids: Vec<_> = window.iter().map(|m| m.gateway_message_id.as_str()).collect();
        assert_eq!(ids, vec!["M1", "M2"]);
    }
}
