use metadata_core::{Document, FilterSpec, Page, SortOrder, StoreError};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Document persistence contract. Implementations must be safe to share
/// across request tasks; the store alone serializes concurrent writes.
#[async_trait::async_trait]
pub trait DocStore: Send + Sync + 'static {
    async fn count(&self, collection: &str, spec: &FilterSpec) -> StoreResult<u64>;

    /// Matches in store-native order, windowed by `page`.
    async fn get(&self, collection: &str, spec: &FilterSpec, page: Page)
        -> StoreResult<Vec<Document>>;

    /// Matches ordered by `keys` (primary first), windowed by `page`.
    async fn get_sorted(
        &self,
        collection: &str,
        spec: &FilterSpec,
        keys: &[String],
        order: SortOrder,
        page: Page,
    ) -> StoreResult<Vec<Document>>;

    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<()>;

    /// Removes every match; returns how many were removed.
    async fn remove(&self, collection: &str, spec: &FilterSpec) -> StoreResult<u64>;
}
