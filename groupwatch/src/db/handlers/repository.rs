//! Base repository trait for database operations.
//!
//! A repository is the data access layer for one postgres table. It creates, reads, updates
//! and deletes rows, and lists them with simple filters. Tables whose access pattern does not
//! fit CRUD (payments, messages, ...) expose their own methods instead.

use std::collections::HashMap;

use crate::db::errors::Result;

/// Base repository trait providing common database operations
///
/// Separate associated types for create requests, update requests, and responses keep the
/// API-facing and storage-facing shapes independent.
#[async_trait::async_trait]
pub trait Repository {
    /// The request type for creating entities
    type CreateRequest;

    /// The request type for updating entities
    type UpdateRequest;

    /// The response/DTO type returned by operations
    type Response;

    /// The identifier type for lookups
    type Id: Send + Sync;

    /// The filter type for list operations
    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    /// Get lots of entities by their IDs, keyed by ID
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Delete an entity by ID. Returns whether a row was removed.
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;

    /// Update an entity by ID; `DbError::NotFound` if it does not exist
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;
}
