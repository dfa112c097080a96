use super::{DocumentStore, FindOptions, Update, UpdateResult};
use crate::error::Result;
use crate::index::IndexDefinition;
use crate::query::Predicate;
use crate::types::Document;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Traces every command sent to the wrapped store, with the filter rendered as
/// a JSON document.
pub struct LoggedStore {
    inner: Arc<dyn DocumentStore>,
}

impl LoggedStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DocumentStore for LoggedStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        debug!(
            command = "find",
            collection,
            filter = %filter.to_filter_json(),
            sort = ?options.sort.as_ref().map(|s| s.to_sort_json()),
            skip = options.skip,
            limit = ?options.limit,
            "store command"
        );
        self.inner.find(collection, filter, options).await
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> Result<u64> {
        debug!(command = "count", collection, filter = %filter.to_filter_json(), "store command");
        self.inner.count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<()> {
        debug!(command = "insert", collection, id = %doc.id, "store command");
        self.inner.insert_one(collection, doc).await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Predicate,
        doc: Document,
        upsert: bool,
    ) -> Result<UpdateResult> {
        debug!(command = "replace", collection, filter = %filter.to_filter_json(), upsert, "store command");
        self.inner.replace_one(collection, filter, doc, upsert).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Predicate,
        update: &Update,
    ) -> Result<UpdateResult> {
        debug!(
            command = "update",
            collection,
            filter = %filter.to_filter_json(),
            ops = update.ops.len(),
            "store command"
        );
        self.inner.update_one(collection, filter, update).await
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        debug!(command = "drop", collection, "store command");
        self.inner.drop_collection(collection).await
    }

    async fn list_collections(&self, name: Option<&str>) -> Result<Vec<String>> {
        debug!(command = "listCollections", name = ?name, "store command");
        self.inner.list_collections(name).await
    }

    async fn create_index(&self, definition: &IndexDefinition) -> Result<String> {
        debug!(
            command = "createIndexes",
            collection = %definition.collection,
            name = %definition.name,
            keys = %definition.key_json(),
            "store command"
        );
        self.inner.create_index(definition).await
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDefinition>> {
        debug!(command = "listIndexes", collection, "store command");
        self.inner.list_indexes(collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_commands_pass_through() {
        let store = LoggedStore::new(Arc::new(MemoryStore::new()));
        store.insert_one("cards", Document::with_id("a")).await.unwrap();
        assert_eq!(store.count("cards", &Predicate::All).await.unwrap(), 1);
        assert_eq!(store.list_collections(None).await.unwrap(), vec!["cards"]);
    }

    #[test]
    fn test_updates_pass_through_blocking() {
        let store = LoggedStore::new(Arc::new(MemoryStore::new()));
        tokio_test::block_on(async {
            store.insert_one("cards", Document::with_id("a")).await.unwrap();
            let result = store
                .update_one("cards", &Predicate::eq("_id", "a"), &Update::new().set("limit", 10))
                .await
                .unwrap();
            assert_eq!(result.matched_count, 1);
            let missing = store
                .update_one("cards", &Predicate::eq("_id", "b"), &Update::new().set("limit", 10))
                .await
                .unwrap();
            assert_eq!(missing.matched_count, 0);
        });
    }
}
