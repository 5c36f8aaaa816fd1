//! Database record models matching table schemas.
//!
//! Each model struct matches a database table schema and derives `sqlx::FromRow` where it
//! is read straight from a query. Database models are distinct from API models so storage
//! and API representations can evolve independently; API models implement `From` the
//! database response types.
//!
//! Postgres enums (`instance_status`, `subscription_status`, ...) are declared next to the
//! model that owns them and derive `sqlx::Type` with `SCREAMING_SNAKE_CASE` variants.
//!
//! # Model Categories
//!
//! ## Accounts
//!
//! - [`users`]: User accounts and authentication
//!
//! ## Messaging
//!
//! - [`instances`]: WhatsApp connections held by the messaging gateway
//! - [`group_selections`]: Groups a user has chosen to monitor
//! - [`messages`]: Captured group messages
//! - [`schedules`]: When a group's summary should go out
//! - [`summaries`]: Generated digests
//!
//! ## Billing
//!
//! - [`plans`]: Priced plans offered to users
//! - [`subscriptions`]: One subscription per paid group
//! - [`payments`]: Charges generated by the payment gateway
//! - [`webhook_events`]: Processed webhook event ids

pub mod group_selections;
pub mod instances;
pub mod messages;
pub mod payments;
pub mod plans;
pub mod schedules;
pub mod subscriptions;
pub mod summaries;
pub mod users;
pub mod webhook_events;
