//! HTTP request handlers for all API endpoints.
//!
//! Each handler validates its input, checks who may act on the resource, calls the gateways
//! where needed and persists through the repositories in [`crate::db::handlers`].
//!
//! # Handler Modules
//!
//! - [`auth`]: Registration, login, logout and password change
//! - [`users`]: Profiles and admin user management
//! - [`plans`]: Billing plan CRUD
//! - [`instances`]: Messaging-gateway instances, pairing and group discovery
//! - [`groups`]: Group selections
//! - [`schedules`]: Per-group summary schedules
//! - [`messages`]: Captured messages
//! - [`summaries`]: Digest generation and delivery
//! - [`subscriptions`]: Subscriptions and payments
//! - [`webhooks`]: Payment and messaging gateway callbacks
//!
//! # Authentication
//!
//! Handlers take a [`CurrentUser`](crate::api::models::users::CurrentUser) (or
//! [`RequiresAdmin`](crate::auth::permissions::RequiresAdmin)) argument; unauthenticated
//! requests never reach the handler body. Resources owned by someone else are reported as
//! missing rather than forbidden.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to the matching status code and
//! a JSON `{"error": ...}` body.

pub mod auth;
pub mod groups;
pub mod instances;
pub mod messages;
pub mod plans;
pub mod schedules;
pub mod subscriptions;
pub mod summaries;
pub mod users;
pub mod webhooks;
