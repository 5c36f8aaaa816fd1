//! Common type definitions.
//!
//! This module defines:
//! - Type aliases for entity IDs (UserId, InstanceId, etc.)
//! - Resource and operation enums used in authorization errors
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases for readability:
//!
//! - [`UserId`]: User account identifier
//! - [`PlanId`]: Billing plan identifier
//! - [`InstanceId`]: Messaging gateway connection identifier
//! - [`GroupSelectionId`]: Monitored group identifier
//! - [`SubscriptionId`], [`PaymentId`]: Billing records
//! - [`ScheduleId`], [`MessageId`], [`SummaryId`]: Group activity records
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use serde::Deserialize;
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type PlanId = Uuid;
pub type InstanceId = Uuid;
pub type GroupSelectionId = Uuid;
pub type SubscriptionId = Uuid;
pub type PaymentId = Uuid;
pub type ScheduleId = Uuid;
pub type MessageId = Uuid;
pub type SummaryId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// Common types for path parameters
#[derive(Debug, Clone, Deserialize)]
pub enum CurrentKeyword {
    #[serde(rename = "current")]
    Current,
}

/// Allows routes like /users/current and /users/{id} to hit the same handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserIdOrCurrent {
    Current(CurrentKeyword),
    Id(UserId),
}

impl UserIdOrCurrent {
    /// Resolve to a concrete user ID, using the caller for `current`.
    pub fn resolve(&self, current_user_id: UserId) -> UserId {
        match self {
            UserIdOrCurrent::Current(_) => current_user_id,
            UserIdOrCurrent::Id(id) => *id,
        }
    }
}

// *-All means unrestricted access, *-Own means restricted to own resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    CreateOwn,
    ReadAll,
    ReadOwn,
    UpdateAll,
    UpdateOwn,
    DeleteAll,
    DeleteOwn,
}

// Resources that can be operated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Plans,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll | Operation::CreateOwn => write!(f, "Create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "Read"),
            Operation::UpdateAll | Operation::UpdateOwn => write!(f, "Update"),
            Operation::DeleteAll | Operation::DeleteOwn => write!(f, "Delete"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Users => "users",
            Resource::Plans => "plans",
        };
        write!(f, "{name}")
    }
}
