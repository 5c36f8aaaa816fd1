//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): Registration, login, logout, password change
//! - **Users** (`/api/v1/users/*`): Profiles; admins manage every account
//! - **Plans** (`/api/v1/plans/*`): Billing plans, managed by admins
//! - **Instances** (`/api/v1/instances/*`): WhatsApp connections and their group listings
//! - **Groups** (`/api/v1/groups/*`): Monitored groups, their schedule, messages and summaries
//! - **Summaries** (`/api/v1/summaries/*`): Individual digests and their delivery
//! - **Subscriptions** (`/api/v1/subscriptions/*`): Per-group billing and payments
//! - **Webhooks** (`/webhooks/*`): Callbacks from the payment and messaging gateways
//!
//! # OpenAPI Documentation
//!
//! All endpoints are annotated with `utoipa`. The document is served at
//! `/api-docs/openapi.json` and browsable at `/docs`.

pub mod handlers;
pub mod models;
