use crate::matcher::{compile, compare_docs, Predicate};
use crate::traits::{DocStore, StoreResult};
use metadata_core::{document_did, Document, FilterSpec, Page, SortOrder, StoreError, DID_FIELD};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Reference document store. Each collection keeps documents in insertion
/// order with a unique index on `did`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
}

#[derive(Default)]
struct Collection {
    next_seq: u64,
    // seq -> document; seq order is the store-native order
    docs: BTreeMap<u64, Document>,
    by_did: HashMap<String, u64>,
}

impl Collection {
    /// Sequence numbers of matching documents, in native order. A top-level
    /// string `did` literal is served from the index.
    fn matching(&self, spec: &FilterSpec, pred: &Predicate) -> Vec<u64> {
        if let Some(JsonValue::String(did)) = spec.get(DID_FIELD) {
            return self
                .by_did
                .get(did)
                .filter(|seq| self.docs.get(*seq).is_some_and(|d| pred.matches(d)))
                .map(|seq| vec![*seq])
                .unwrap_or_default();
        }
        self.docs
            .iter()
            .filter(|(_, d)| pred.matches(d))
            .map(|(seq, _)| *seq)
            .collect()
    }

    fn collect(&self, seqs: &[u64]) -> Vec<Document> {
        seqs.iter()
            .filter_map(|seq| self.docs.get(seq).cloned())
            .collect()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .read()
            .collections
            .get(collection)
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    pub fn all_documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .read()
            .collections
            .get(collection)
            .map(|c| c.docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn select(&self, collection: &str, spec: &FilterSpec) -> StoreResult<Vec<Document>> {
        let pred = compile(spec)?;
        let inner = self.inner.read();
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.collect(&c.matching(spec, &pred)))
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl DocStore for InMemoryStore {
    async fn count(&self, collection: &str, spec: &FilterSpec) -> StoreResult<u64> {
        let pred = compile(spec)?;
        let inner = self.inner.read();
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.matching(spec, &pred).len() as u64)
            .unwrap_or(0))
    }

    async fn get(
        &self,
        collection: &str,
        spec: &FilterSpec,
        page: Page,
    ) -> StoreResult<Vec<Document>> {
        Ok(page.slice(self.select(collection, spec)?))
    }

    async fn get_sorted(
        &self,
        collection: &str,
        spec: &FilterSpec,
        keys: &[String],
        order: SortOrder,
        page: Page,
    ) -> StoreResult<Vec<Document>> {
        let mut docs = self.select(collection, spec)?;
        // stable: ties keep native order
        docs.sort_by(|a, b| compare_docs(a, b, keys, order));
        Ok(page.slice(docs))
    }

    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<()> {
        let did = document_did(&doc);
        let mut inner = self.inner.write();
        let coll = inner
            .collections
            .entry(collection.to_string())
            .or_default();
        if let Some(did) = &did {
            if coll.by_did.contains_key(did) {
                return Err(StoreError::Duplicate(did.clone()));
            }
        }
        coll.next_seq += 1;
        let seq = coll.next_seq;
        if let Some(did) = did {
            coll.by_did.insert(did, seq);
        }
        coll.docs.insert(seq, doc);
        Ok(())
    }

    async fn remove(&self, collection: &str, spec: &FilterSpec) -> StoreResult<u64> {
        let pred = compile(spec)?;
        let mut inner = self.inner.write();
        let Some(coll) = inner.collections.get_mut(collection) else {
            return Ok(0);
        };
        let seqs = coll.matching(spec, &pred);
        for seq in &seqs {
            if let Some(doc) = coll.docs.remove(seq) {
                if let Some(did) = document_did(&doc) {
                    coll.by_did.remove(&did);
                }
            }
        }
        tracing::debug!(collection, removed = seqs.len(), "removed documents");
        Ok(seqs.len() as u64)
    }
}
