//! Retrying, conflict-tolerant front for a [`DocumentStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn, Instrument};

use super::{
    document::id_of, strip_system_fields, Collection, Document, DocumentStore, Query, StoreError,
};

const DEFAULT_RETRY_DELAY_MS: u64 = 200;
const DEFAULT_MAX_ATTEMPTS: u32 = 2;

#[derive(Clone, Debug)]
pub struct StoreOptions {
    retry_delay: Duration,
    max_attempts: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl StoreOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Total attempts per call, the first one included. Clamped to at least one.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[derive(Clone)]
pub struct ResilientStore {
    backend: Arc<dyn DocumentStore>,
    options: StoreOptions,
}

impl std::fmt::Debug for ResilientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ResilientStore {
    #[must_use]
    pub fn new(backend: Arc<dyn DocumentStore>, options: StoreOptions) -> Self {
        Self { backend, options }
    }

    /// Point read in an explicit partition. Absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error, after one retry if it was throttled.
    pub async fn get(
        &self,
        collection: &Collection,
        id: &str,
        partition: &str,
    ) -> Result<Option<Document>, StoreError> {
        let backend = &self.backend;
        let name = collection.name();
        let result = self
            .with_retry("read", name, move || backend.read(name, id, partition))
            .await;
        match result {
            Ok(doc) => Ok(Some(doc)),
            Err(StoreError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Point read for collections partitioned by `id`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error, after one retry if it was throttled.
    pub async fn get_by_id(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.get(collection, id, id).await
    }

    /// Cross-partition query, materialized.
    ///
    /// # Errors
    ///
    /// Returns the backend's error, after one retry if it was throttled.
    pub async fn query(
        &self,
        collection: &Collection,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let backend = &self.backend;
        let name = collection.name();
        self.with_retry("query", name, move || backend.query(name, query))
            .await
    }

    /// Create-or-replace, idempotent under retry.
    ///
    /// A throttled write is retried once. A conflict means an earlier attempt
    /// already landed, so the stored document is returned instead.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDocument` without an `id`, `Conflict` when the stored
    /// document cannot be read back, or any other backend error unchanged.
    pub async fn upsert(
        &self,
        collection: &Collection,
        mut doc: Document,
        partition: &str,
    ) -> Result<Document, StoreError> {
        strip_system_fields(&mut doc);
        let id = require_id(&doc)?;
        let backend = &self.backend;
        let name = collection.name();

        let result = self
            .with_retry("upsert", name, move || backend.upsert(name, partition, doc.clone()))
            .await;
        match result {
            Err(StoreError::Conflict) => {
                debug!(collection = name, id = %id, "upsert conflict, reading stored document");
                self.get(collection, &id, partition)
                    .await?
                    .ok_or(StoreError::Conflict)
            }
            other => other,
        }
    }

    /// Insert only. `Conflict` when a document with the same key exists.
    ///
    /// # Errors
    ///
    /// Returns the backend's error, after one retry if it was throttled.
    pub async fn create(
        &self,
        collection: &Collection,
        mut doc: Document,
        partition: &str,
    ) -> Result<Document, StoreError> {
        strip_system_fields(&mut doc);
        require_id(&doc)?;
        let backend = &self.backend;
        let name = collection.name();
        self.with_retry("create", name, move || backend.create(name, partition, doc.clone()))
            .await
    }

    /// Replace only. `NotFound` when nothing is stored under the key.
    ///
    /// # Errors
    ///
    /// Returns the backend's error, after one retry if it was throttled.
    pub async fn replace(
        &self,
        collection: &Collection,
        mut doc: Document,
        partition: &str,
    ) -> Result<Document, StoreError> {
        strip_system_fields(&mut doc);
        require_id(&doc)?;
        let backend = &self.backend;
        let name = collection.name();
        self.with_retry("replace", name, move || backend.replace(name, partition, doc.clone()))
            .await
    }

    /// Upsert with `id` and partition value synthesized when absent, followed
    /// by a best-effort read-back.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDocument` when the partition cannot be inferred, or any
    /// error [`Self::upsert`] returns. A failed read-back is only logged.
    pub async fn upsert_inferred(
        &self,
        collection: &Collection,
        mut doc: Document,
    ) -> Result<Document, StoreError> {
        strip_system_fields(&mut doc);
        let (id, partition) = collection.infer(&mut doc)?;
        let stored = self.upsert(collection, doc, &partition).await?;

        match self.get(collection, &id, &partition).await {
            Ok(Some(_)) => {
                debug!(collection = collection.name(), id = %id, partition = %partition, "write verified");
            }
            Ok(None) => {
                warn!(collection = collection.name(), id = %id, partition = %partition, "write not visible on read-back");
            }
            Err(err) => {
                warn!(collection = collection.name(), id = %id, partition = %partition, "read-back failed: {err}");
            }
        }

        Ok(stored)
    }

    /// Reachability probe.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let backend = &self.backend;
        self.with_retry("ping", "-", move || backend.ping()).await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        collection: &str,
        mut call: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            let span = tracing::info_span!(
                "store.op",
                db.operation = operation,
                collection = collection,
                attempt = attempt
            );
            match call().instrument(span).await {
                Err(StoreError::Throttled) if attempt < self.options.max_attempts => {
                    warn!(
                        operation,
                        collection,
                        attempt,
                        "store throttled, retrying in {:?}",
                        self.options.retry_delay
                    );
                    tokio::time::sleep(self.options.retry_delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn require_id(doc: &Document) -> Result<String, StoreError> {
    id_of(doc)
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidDocument("document is missing 'id'".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{Fault, MemoryStore, Operation};
    use crate::store::PartitionPath;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    fn fixture() -> (Arc<MemoryStore>, ResilientStore) {
        let memory = Arc::new(MemoryStore::new());
        let store = ResilientStore::new(
            memory.clone(),
            StoreOptions::new().with_retry_delay(Duration::from_millis(1)),
        );
        (memory, store)
    }

    #[tokio::test]
    async fn throttled_read_is_retried_once() -> anyhow::Result<()> {
        let (memory, store) = fixture();
        let users = Collection::by_id("users");
        store.upsert(&users, doc(json!({ "id": "user:a@taxco" })), "user:a@taxco").await?;

        memory.inject(Operation::Read, Fault::Fail(StoreError::Throttled));
        assert!(store.get_by_id(&users, "user:a@taxco").await?.is_some());
        assert_eq!(memory.calls(Operation::Read), 2);
        Ok(())
    }

    #[tokio::test]
    async fn second_throttle_propagates() {
        let (memory, store) = fixture();
        memory.inject(Operation::Query, Fault::Fail(StoreError::Throttled));
        memory.inject(Operation::Query, Fault::Fail(StoreError::Throttled));
        memory.inject(Operation::Query, Fault::Fail(StoreError::Throttled));

        let result = store.query(&Collection::by_id("users"), &Query::new()).await;
        assert!(matches!(result, Err(StoreError::Throttled)));
        assert_eq!(memory.calls(Operation::Query), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let (memory, store) = fixture();
        memory.inject(
            Operation::Upsert,
            Fault::Fail(StoreError::backend(503, "service unavailable")),
        );
        let result = store
            .upsert(&Collection::by_id("users"), doc(json!({ "id": "x" })), "x")
            .await;
        assert!(matches!(result, Err(StoreError::Backend { status: 503, .. })));
        assert_eq!(memory.calls(Operation::Upsert), 1);
    }

    #[tokio::test]
    async fn missing_document_is_absent_not_error() -> anyhow::Result<()> {
        let (_, store) = fixture();
        assert!(store.get_by_id(&Collection::by_id("users"), "nobody").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn conflict_without_stored_document_propagates() {
        let (memory, store) = fixture();
        memory.inject(Operation::Upsert, Fault::Fail(StoreError::Conflict));
        let result = store
            .upsert(&Collection::by_id("users"), doc(json!({ "id": "ghost" })), "ghost")
            .await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn system_fields_are_not_written_back() -> anyhow::Result<()> {
        let (_, store) = fixture();
        let cards = Collection::by_id("health_cards");
        let first = store.upsert(&cards, doc(json!({ "id": "c" })), "c").await?;
        let stale_etag = first.get("_etag").cloned();

        let second = store.upsert(&cards, first, "c").await?;
        assert!(second.get("_etag").is_some());
        assert_ne!(second.get("_etag").cloned(), stale_etag);
        Ok(())
    }

    #[tokio::test]
    async fn create_reports_conflict() -> anyhow::Result<()> {
        let (_, store) = fixture();
        let cards = Collection::by_id("health_cards");
        store.create(&cards, doc(json!({ "id": "c" })), "c").await?;
        let again = store.create(&cards, doc(json!({ "id": "c" })), "c").await;
        assert!(matches!(again, Err(StoreError::Conflict)));
        Ok(())
    }

    #[tokio::test]
    async fn inferred_upsert_lands_in_fallback_partition() -> anyhow::Result<()> {
        let (memory, store) = fixture();
        let appointments =
            Collection::new("appointments", PartitionPath::Field("student_id".into()))
                .with_id_prefix("appointment")
                .with_fallback_key("matricula");

        let stored = store
            .upsert_inferred(&appointments, doc(json!({ "matricula": "S-42", "reason": "x" })))
            .await?;
        let id = id_of(&stored).map(str::to_string).unwrap_or_default();
        assert!(id.starts_with("appointment:"));
        assert!(store.get(&appointments, &id, "S-42").await?.is_some());
        assert_eq!(memory.calls(Operation::Read), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_read_back_is_not_fatal() -> anyhow::Result<()> {
        let (memory, store) = fixture();
        memory.inject(Operation::Read, Fault::Fail(StoreError::backend(500, "boom")));
        let stored = store
            .upsert_inferred(&Collection::by_id("appointments"), doc(json!({ "reason": "x" })))
            .await?;
        assert!(id_of(&stored).is_some());
        Ok(())
    }
}
