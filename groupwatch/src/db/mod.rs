//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers, webhook reconciliation)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Integrity
//!
//! Ownership invariants live in the schema rather than in handler code:
//!
//! - every user-owned table references `users` with `ON DELETE CASCADE`, so deleting a user
//!   is a single statement;
//! - `group_selections (user_id, group_jid)` is unique, so a group cannot be selected twice;
//! - a partial unique index allows one PENDING/ACTIVE/OVERDUE subscription per group.
//!
//! Constraint violations surface as [`errors::DbError`] variants carrying the constraint
//! name, which the API layer turns into 409/400 responses.
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded with [`crate::migrator`]:
//!
//! ```ignore
//! groupwatch::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
