//! In-process document store with scripted fault injection.
//!
//! Used for `memory://` deployments and for exercising the retry and conflict
//! paths of [`super::ResilientStore`] without a database.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{document::id_of, Document, DocumentStore, Query, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Query,
    Upsert,
    Create,
    Replace,
    Ping,
}

/// A scripted response for the next call of an [`Operation`].
#[derive(Debug)]
pub enum Fault {
    /// Fail without touching stored data.
    Fail(StoreError),
    /// Apply the write, then report the error anyway (a lost acknowledgement).
    ApplyThenFail(StoreError),
    /// Behave normally; lets a later fault target a later call.
    Pass,
}

type Key = (String, String, String);

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<Key, Document>>,
    faults: Mutex<HashMap<Operation, VecDeque<Fault>>>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fault for the next call of `operation`. Faults fire in order.
    pub fn inject(&self, operation: Operation, fault: Fault) {
        lock(&self.faults)
            .entry(operation)
            .or_default()
            .push_back(fault);
    }

    /// Number of backend calls made for `operation`, including failed ones.
    #[must_use]
    pub fn calls(&self, operation: Operation) -> usize {
        lock(&self.calls).get(&operation).copied().unwrap_or(0)
    }

    /// Number of documents stored in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        lock(&self.documents)
            .keys()
            .filter(|(name, _, _)| name == collection)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn begin(&self, operation: Operation) -> Option<Fault> {
        *lock(&self.calls).entry(operation).or_insert(0) += 1;
        lock(&self.faults)
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
    }

    fn write(
        &self,
        operation: Operation,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError> {
        let fault = self.begin(operation);
        let after = match fault {
            Some(Fault::Fail(err)) => return Err(err),
            Some(Fault::ApplyThenFail(err)) => Some(err),
            Some(Fault::Pass) | None => None,
        };

        let id = id_of(&doc)
            .ok_or_else(|| StoreError::InvalidDocument("document is missing 'id'".into()))?
            .to_string();
        let key = (collection.to_string(), partition.to_string(), id);

        let mut documents = lock(&self.documents);
        let exists = documents.contains_key(&key);
        match operation {
            Operation::Create if exists => return Err(StoreError::Conflict),
            Operation::Replace if !exists => return Err(StoreError::NotFound),
            _ => {}
        }

        let stored = stamp(doc);
        documents.insert(key, stored.clone());
        drop(documents);

        match after {
            Some(err) => Err(err),
            None => Ok(stored),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(
        &self,
        collection: &str,
        id: &str,
        partition: &str,
    ) -> Result<Document, StoreError> {
        if let Some(Fault::Fail(err) | Fault::ApplyThenFail(err)) = self.begin(Operation::Read) {
            return Err(err);
        }
        lock(&self.documents)
            .get(&(collection.to_string(), partition.to_string(), id.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        if let Some(Fault::Fail(err) | Fault::ApplyThenFail(err)) = self.begin(Operation::Query) {
            return Err(err);
        }
        let mut found: Vec<Document> = lock(&self.documents)
            .iter()
            .filter(|((name, _, _), doc)| name == collection && query.matches(doc))
            .map(|(_, doc)| doc.clone())
            .collect();
        found.sort_by(|a, b| query.compare(a, b));
        if let Some(limit) = query.max_results() {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn upsert(
        &self,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError> {
        self.write(Operation::Upsert, collection, partition, doc)
    }

    async fn create(
        &self,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError> {
        self.write(Operation::Create, collection, partition, doc)
    }

    async fn replace(
        &self,
        collection: &str,
        partition: &str,
        doc: Document,
    ) -> Result<Document, StoreError> {
        self.write(Operation::Replace, collection, partition, doc)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self.begin(Operation::Ping) {
            Some(Fault::Fail(err) | Fault::ApplyThenFail(err)) => Err(err),
            Some(Fault::Pass) | None => Ok(()),
        }
    }
}

// Attach the version tag and timestamp a real store would manage.
fn stamp(mut doc: Document) -> Document {
    doc.insert("_etag".into(), Value::String(Uuid::new_v4().to_string()));
    doc.insert("_ts".into(), Value::from(Utc::now().timestamp()));
    doc
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
