use crate::traits::DocStore;
use metadata_core::{
    document_did, Document, FilterSpec, MetaError, Page, Result, ResultSet, ServiceQuery,
    SortOrder, UserIdentity,
};
use std::sync::Arc;
use tracing::debug;

/// Document access operations over one collection.
///
/// Every read takes the resolved filter as `Option<&FilterSpec>`; `None`
/// short-circuits to an empty result without touching the store.
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn DocStore>,
    collection: String,
}

impl Records {
    pub fn new(store: Arc<dyn DocStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn get(&self, spec: Option<&FilterSpec>, page: Page) -> Result<Vec<Document>> {
        let Some(spec) = spec else {
            return Ok(Vec::new());
        };
        let docs = self.store.get(&self.collection, spec, page).await?;
        debug!(%spec, idx = page.idx, limit = ?page.limit, n = docs.len(), "get");
        Ok(docs)
    }

    /// Sorted retrieval; an empty key list is plain [`Records::get`].
    pub async fn get_sorted(
        &self,
        spec: Option<&FilterSpec>,
        keys: &[String],
        order: SortOrder,
        page: Page,
    ) -> Result<Vec<Document>> {
        let Some(spec) = spec else {
            return Ok(Vec::new());
        };
        if keys.is_empty() {
            return self.get(Some(spec), page).await;
        }
        let docs = self
            .store
            .get_sorted(&self.collection, spec, keys, order, page)
            .await?;
        debug!(
            %spec,
            ?keys,
            ?order,
            idx = page.idx,
            limit = ?page.limit,
            n = docs.len(),
            "get_sorted"
        );
        Ok(docs)
    }

    /// Ignores pagination and sort parameters.
    pub async fn count(&self, spec: Option<&FilterSpec>) -> Result<u64> {
        let Some(spec) = spec else {
            return Ok(0);
        };
        let n = self.store.count(&self.collection, spec).await?;
        debug!(%spec, n, "count");
        Ok(n)
    }

    /// Total match count plus the requested page, sorted when the query
    /// carries sort keys.
    pub async fn search(
        &self,
        spec: Option<&FilterSpec>,
        query: &ServiceQuery,
    ) -> Result<ResultSet> {
        if spec.is_none() {
            return Ok(ResultSet::default());
        }
        let total = self.count(spec).await?;
        let records = self
            .get_sorted(spec, &query.sort_keys, query.sort_order, query.page())
            .await?;
        Ok(ResultSet::records(total, records))
    }

    /// Stores `doc` and echoes its identifier.
    pub async fn insert(&self, doc: Document) -> Result<String> {
        let did = document_did(&doc).ok_or(MetaError::MissingIdentifier)?;
        self.store
            .insert(&self.collection, doc)
            .await
            .map_err(MetaError::Insert)?;
        debug!(%did, "inserted");
        Ok(did)
    }

    /// Removes the document keyed by `did`. Unknown identifiers are not an
    /// error; the number removed (0 or 1) is returned.
    pub async fn remove(&self, did: &str, identity: &UserIdentity) -> Result<u64> {
        if did.is_empty() {
            return Err(MetaError::Bind("did parameter is required".into()));
        }
        let spec = FilterSpec::by_did(did);
        let removed = self
            .store
            .remove(&self.collection, &spec)
            .await
            .map_err(MetaError::Remove)?;
        debug!(did, user = %identity.user, removed, "remove");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreResult;
    use crate::InMemoryStore;
    use metadata_core::StoreError;
    use serde_json::{json, Value as JsonValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the in-memory store and counts calls per primitive.
    #[derive(Default)]
    struct Recording {
        inner: InMemoryStore,
        calls: AtomicUsize,
        sorted_calls: AtomicUsize,
        fail_writes: bool,
    }

    impl Recording {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl DocStore for Recording {
        async fn count(&self, c: &str, spec: &FilterSpec) -> StoreResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.count(c, spec).await
        }
        async fn get(&self, c: &str, spec: &FilterSpec, page: Page) -> StoreResult<Vec<Document>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(c, spec, page).await
        }
        async fn get_sorted(
            &self,
            c: &str,
            spec: &FilterSpec,
            keys: &[String],
            order: SortOrder,
            page: Page,
        ) -> StoreResult<Vec<Document>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sorted_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_sorted(c, spec, keys, order, page).await
        }
        async fn insert(&self, c: &str, doc: Document) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(StoreError::Internal("disk full".into()));
            }
            self.inner.insert(c, doc).await
        }
        async fn remove(&self, c: &str, spec: &FilterSpec) -> StoreResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(StoreError::Internal("disk full".into()));
            }
            self.inner.remove(c, spec).await
        }
    }

    fn doc(v: JsonValue) -> Document {
        v.as_object().cloned().unwrap()
    }

    fn records(store: &Arc<Recording>) -> Records {
        Records::new(store.clone(), "foxden.meta")
    }

    #[tokio::test]
    async fn absent_spec_never_reaches_store() {
        let store = Arc::new(Recording::default());
        let r = records(&store);
        r.insert(doc(json!({"did": "D1"}))).await.unwrap();
        let before = store.calls();
        assert!(r.get(None, Page::all()).await.unwrap().is_empty());
        let keys = vec!["did".to_string()];
        assert!(r
            .get_sorted(None, &keys, SortOrder::Descending, Page::all())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(r.count(None).await.unwrap(), 0);
        let rs = r.search(None, &ServiceQuery::default()).await.unwrap();
        assert_eq!(rs, ResultSet::default());
        assert_eq!(store.calls(), before);
    }

    #[tokio::test]
    async fn insert_round_trips_and_echoes_did() {
        let store = Arc::new(Recording::default());
        let r = records(&store);
        let d = doc(json!({"did": "D1", "beamline": "3a", "energy": 12.5}));
        assert_eq!(r.insert(d.clone()).await.unwrap(), "D1");
        let got = r.get(Some(&FilterSpec::by_did("D1")), Page::all()).await.unwrap();
        assert_eq!(got, vec![d]);
    }

    #[tokio::test]
    async fn insert_without_did_touches_nothing() {
        let store = Arc::new(Recording::default());
        let r = records(&store);
        for bad in [
            json!({"beamline": "3a"}),
            json!({"did": ""}),
            json!({"did": null}),
            json!({"did": 42}),
        ] {
            assert_eq!(r.insert(doc(bad)).await, Err(MetaError::MissingIdentifier));
        }
        assert_eq!(store.calls(), 0);
        assert!(store.inner.is_empty("foxden.meta"));
    }

    #[tokio::test]
    async fn duplicate_insert_is_an_insert_error() {
        let store = Arc::new(Recording::default());
        let r = records(&store);
        r.insert(doc(json!({"did": "D1"}))).await.unwrap();
        let err = r.insert(doc(json!({"did": "D1"}))).await.unwrap_err();
        assert_eq!(err, MetaError::Insert(StoreError::Duplicate("D1".into())));
    }

    #[tokio::test]
    async fn numeric_did_is_rejected_and_string_form_stays_free() {
        let store = Arc::new(Recording::default());
        let r = records(&store);
        let who = UserIdentity::new("alice");
        assert_eq!(
            r.insert(doc(json!({"did": 42}))).await,
            Err(MetaError::MissingIdentifier)
        );
        assert_eq!(r.insert(doc(json!({"did": "42"}))).await.unwrap(), "42");
        let got = r.get(Some(&FilterSpec::by_did("42")), Page::all()).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(r.remove("42", &who).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_twice_succeeds() {
        let store = Arc::new(Recording::default());
        let r = records(&store);
        let who = UserIdentity::new("alice");
        r.insert(doc(json!({"did": "D1"}))).await.unwrap();
        assert_eq!(r.remove("D1", &who).await.unwrap(), 1);
        assert_eq!(r.remove("D1", &who).await.unwrap(), 0);
        assert_eq!(r.count(Some(&FilterSpec::by_did("D1"))).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_failures_map_to_operation_errors() {
        let store = Arc::new(Recording {
            fail_writes: true,
            ..Default::default()
        });
        let r = records(&store);
        let who = UserIdentity::new("alice");
        assert!(matches!(
            r.insert(doc(json!({"did": "D1"}))).await,
            Err(MetaError::Insert(StoreError::Internal(_)))
        ));
        assert!(matches!(
            r.remove("D1", &who).await,
            Err(MetaError::Remove(StoreError::Internal(_)))
        ));
        assert!(matches!(r.remove("", &who).await, Err(MetaError::Bind(_))));
    }

    #[tokio::test]
    async fn empty_sort_keys_use_plain_get() {
        let store = Arc::new(Recording::default());
        let r = records(&store);
        for i in 0..3 {
            r.insert(doc(json!({"did": format!("D{i}"), "kind": "scan"})))
                .await
                .unwrap();
        }
        let spec = FilterSpec::from(doc(json!({"kind": "scan"})));
        let got = r
            .get_sorted(Some(&spec), &[], SortOrder::Descending, Page::all())
            .await
            .unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(store.sorted_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_reports_total_and_page() {
        let store = Arc::new(Recording::default());
        let r = records(&store);
        for age in [5, 1, 9] {
            r.insert(doc(json!({"did": format!("A{age}"), "age": age})))
                .await
                .unwrap();
        }
        let q = ServiceQuery {
            sort_keys: vec!["age".into()],
            sort_order: SortOrder::Descending,
            limit: 2,
            ..Default::default()
        };
        let spec = FilterSpec::from(doc(json!({"age": {"$gte": 0}})));
        let rs = r.search(Some(&spec), &q).await.unwrap();
        assert_eq!(rs.nrecords, 3);
        let ages: Vec<_> = rs.records.iter().map(|d| d["age"].clone()).collect();
        assert_eq!(ages, vec![json!(9), json!(5)]);
        assert_eq!(store.sorted_calls.load(Ordering::SeqCst), 1);
    }
}
