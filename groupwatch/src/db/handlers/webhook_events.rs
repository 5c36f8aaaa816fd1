//! Ledger of processed webhook events, used to make webhook handling idempotent.

use crate::db::{errors::Result, models::webhook_events::WebhookEventDBResponse};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct WebhookEvents<'c> {
    db: &'c mut PgConnection,
}

impl<'c> WebhookEvents<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Record an event. Returns `false` if `(provider, event_id)` was already recorded,
    /// i.e. the delivery is a replay and should be skipped.
    #[instrument(skip(self, payload), err)]
    pub async fn record(&mut self, provider: &str, event_id: &str, event_type: &str, payload: &serde_json::Value) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (id, provider, event_id, event_type, payload)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT webhook_events_provider_event_unique DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider)
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    pub async fn get(&mut self, provider: &str, event_id: &str) -> Result<Option<WebhookEventDBResponse>> {
        let event = sqlx::query_as::<_, WebhookEventDBResponse>("SELECT * FROM webhook_events WHERE provider = $1 AND event_id = $2")
            .bind(provider)
            .bind(event_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(event)
    }
}
