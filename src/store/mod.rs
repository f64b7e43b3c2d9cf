//! Resilient access to the partitioned document store.
//!
//! Flow Overview:
//! 1) Callers address documents through a [`Collection`] (name + partition path).
//! 2) [`ResilientStore`] strips store-managed fields, retries throttled calls once
//!    and turns upsert conflicts into reads of the already-stored document.
//! 3) A [`DocumentStore`] backend (in-memory or PostgreSQL) does the actual I/O.

use async_trait::async_trait;

pub mod client;
pub mod document;
pub mod error;
pub mod memory;
pub mod partition;
pub mod postgres;
pub mod query;

pub use client::{ResilientStore, StoreOptions};
pub use document::{from_document, strip_system_fields, to_document, Document};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use partition::{Collection, PartitionPath};
pub use postgres::PgStore;
pub use query::{Filter, Query, SortOrder};

/// Raw backend operations. Implementations report failures with their
/// original classification and never retry on their own.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read; `NotFound` when absent.
    async fn read(&self, collection: &str, id: &str, partition: &str)
        -> Result<Document, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Create-or-replace.
    async fn upsert(
        &self,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError>;

    /// Insert only; `Conflict` when the document already exists.
    async fn create(
        &self,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError>;

    /// Replace only; `NotFound` when the document does not exist.
    async fn replace(
        &self,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
