//! API request and response data models.
//!
//! These structures define the public HTTP contract. They are kept apart from the database
//! models in [`crate::db::models`] so storage and API shapes can evolve independently, and
//! are annotated with `utoipa` for the generated OpenAPI document.
//!
//! - [`auth`]: Registration, login and password change payloads, plus cookie-setting responses
//! - [`users`]: User profiles and admin updates
//! - [`plans`]: Billing plans
//! - [`instances`]: Messaging-gateway connections
//! - [`groups`]: Group selections and annotated gateway group listings
//! - [`schedules`]: Summary delivery schedules
//! - [`messages`]: Captured group messages
//! - [`summaries`]: Generated digests
//! - [`subscriptions`]: Subscriptions and their payments
//! - [`webhooks`]: Webhook acknowledgements
//! - [`pagination`]: `skip`/`limit` query parameters and the paginated envelope

pub mod auth;
pub mod groups;
pub mod instances;
pub mod messages;
pub mod pagination;
pub mod plans;
pub mod schedules;
pub mod subscriptions;
pub mod summaries;
pub mod users;
pub mod webhooks;
