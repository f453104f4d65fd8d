//! Record-store contract.
//!
//! The engine persists its entities as JSON documents through this seam but
//! never implements durable storage itself. [`MemoryStore`] is the in-memory
//! implementation used by tests and embedded deployments.

use crate::error::Result;
use crate::types::CollectionKind;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace one document.
    async fn persist(&self, kind: CollectionKind, id: Uuid, doc: Value) -> Result<()>;

    async fn fetch_all(&self, kind: CollectionKind) -> Result<Vec<Value>>;

    async fn fetch_by_filter(
        &self,
        kind: CollectionKind,
        predicate: &(dyn for<'a> Fn(&'a Value) -> bool + Sync),
    ) -> Result<Vec<Value>>;

    /// Returns true if a document was removed.
    async fn delete_by_id(&self, kind: CollectionKind, id: Uuid) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<CollectionKind, BTreeMap<Uuid, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, kind: CollectionKind) -> usize {
        self.collections
            .read()
            .await
            .get(&kind)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn persist(&self, kind: CollectionKind, id: Uuid, doc: Value) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(kind).or_default().insert(id, doc);
        Ok(())
    }

    async fn fetch_all(&self, kind: CollectionKind) -> Result<Vec<Value>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&kind)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_by_filter(
        &self,
        kind: CollectionKind,
        predicate: &(dyn for<'a> Fn(&'a Value) -> bool + Sync),
    ) -> Result<Vec<Value>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&kind)
            .map(|c| c.values().filter(|v| predicate(v)).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_by_id(&self, kind: CollectionKind, id: Uuid) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(&kind)
            .map(|c| c.remove(&id).is_some())
            .unwrap_or(false))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
