//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or an open transaction),
//! builds its queries with `sqlx`, and returns models from [`crate::db::models`].
//!
//! # Available Repositories
//!
//! Implementing [`Repository`]:
//!
//! - [`Users`]: Accounts, first-user admin promotion, gateway customer ids
//! - [`Plans`]: Priced billing plans
//! - [`Instances`]: Messaging-gateway connections
//! - [`GroupSelections`]: Monitored groups
//! - [`Subscriptions`]: Per-group subscriptions
//!
//! Table-specific APIs:
//!
//! - [`Payments`]: Upserted from gateway data
//! - [`Schedules`]: One delivery schedule per group
//! - [`Messages`]: Captured group messages
//! - [`Summaries`]: Generated digests and their delivery state
//! - [`WebhookEvents`]: Idempotency ledger for inbound webhooks
//!
//! # Common Pattern
//!
//! ```ignore
//! use groupwatch::db::handlers::{Repository, Users};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let mut repo = Users::new(&mut tx);
//!     let user = repo.get_user_by_email("someone@example.com").await?;
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod group_selections;
pub mod instances;
pub mod messages;
pub mod payments;
pub mod plans;
pub mod repository;
pub mod schedules;
pub mod subscriptions;
pub mod summaries;
pub mod users;
pub mod webhook_events;

pub use group_selections::GroupSelections;
pub use instances::Instances;
pub use messages::Messages;
pub use payments::Payments;
pub use plans::Plans;
pub use repository::Repository;
pub use schedules::Schedules;
pub use subscriptions::Subscriptions;
pub use summaries::Summaries;
pub use users::Users;
pub use webhook_events::WebhookEvents;
