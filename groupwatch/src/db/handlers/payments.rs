//! Database repository for payments.
//!
//! Payments are only ever written from gateway data, so there is no create/update split:
//! everything goes through [`Payments::upsert`], keyed on the gateway payment id.

use crate::db::{
    errors::Result,
    models::payments::{PaymentDBResponse, PaymentUpsertDBRequest},
};
use crate::types::{SubscriptionId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Payments<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Payments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a payment or refresh the stored copy. A known `paid_at` or `invoice_url`
    /// is never cleared by a later event that omits it.
    #[instrument(skip(self, request), fields(gateway_payment_id = %request.gateway_payment_id, status = ?request.status), err)]
    pub async fn upsert(&mut self, request: &PaymentUpsertDBRequest) -> Result<PaymentDBResponse> {
        let payment = sqlx::query_as::<_, PaymentDBResponse>(
            r#"
            INSERT INTO payments (
                id, subscription_id, gateway_payment_id, value, status, billing_type, due_date, paid_at, invoice_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ON CONSTRAINT payments_gateway_id_unique DO UPDATE SET
                value = EXCLUDED.value,
                status = EXCLUDED.status,
                billing_type = EXCLUDED.billing_type,
                due_date = COALESCE(EXCLUDED.due_date, payments.due_date),
                paid_at = COALESCE(EXCLUDED.paid_at, payments.paid_at),
                invoice_url = COALESCE(EXCLUDED.invoice_url, payments.invoice_url),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.subscription_id)
        .bind(&request.gateway_payment_id)
        .bind(request.value)
        .bind(request.status)
        .bind(request.billing_type)
        .bind(request.due_date)
        .bind(request.paid_at)
        .bind(&request.invoice_url)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(payment)
    }

    #[instrument(skip(self), fields(subscription_id = %abbrev_uuid(&subscription_id)), err)]
    pub async fn list_for_subscription(&mut self, subscription_id: SubscriptionId) -> Result<Vec<PaymentDBResponse>> {
        let payments = sqlx::query_as::<_, PaymentDBResponse>(
            "SELECT * FROM payments WHERE subscription_id = $1 ORDER BY due_date DESC NULLS LAST, created_at DESC",
        )
        .bind(subscription_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(payments)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_gateway_id(&mut self, gateway_payment_id: &str) -> Result<Option<PaymentDBResponse>> {
        let payment = sqlx::query_as::<_, PaymentDBResponse>("SELECT * FROM payments WHERE gateway_payment_id = $1")
            .bind(gateway_payment_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(payment)
    }
}
