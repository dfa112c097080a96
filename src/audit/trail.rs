use super::AuditContainer;
use crate::error::{Result, ScribeError};
use crate::models::Record;
use crate::query::Predicate;
use crate::search::SearchResult;
use crate::storage::{DocumentStore, FindOptions, Projection, Update};
use crate::types::{Document, ID_FIELD, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const AUDIT_ITEMS_FIELD: &str = "auditItems";

/// Per-entity snapshot trails in an audit collection. Each container is keyed
/// by the entity id and holds at most `cap` snapshots, newest last.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn DocumentStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Appends a snapshot of `item` to its trail. The push and the trim to
    /// `cap` items are one store update, so the trail never exceeds `cap`.
    /// A `cap` of zero keeps everything.
    pub async fn record<T: Record>(&self, collection: &str, item: &T, cap: usize) -> Result<()> {
        let snapshot = item.to_document()?;
        let id = snapshot.id.clone();
        self.record_snapshot(collection, &id, snapshot.into_value(), cap)
            .await
    }

    pub(crate) async fn record_snapshot(
        &self,
        collection: &str,
        id: &str,
        snapshot: Value,
        cap: usize,
    ) -> Result<()> {
        let filter = Predicate::eq(ID_FIELD, id);
        let update = Update::new().push_capped(AUDIT_ITEMS_FIELD, snapshot.clone(), cap);

        if self.store.update_one(collection, &filter, &update).await?.matched_count > 0 {
            return Ok(());
        }

        let container = Document::with_id(id).field(AUDIT_ITEMS_FIELD, vec![snapshot]);
        match self.store.insert_one(collection, container).await {
            Ok(()) => {
                debug!(collection, id, "started audit trail");
                Ok(())
            }
            Err(ScribeError::DuplicateKey { .. }) => {
                // Another writer created the container first
                warn!(collection, id, "audit container raced into existence, appending instead");
                let retry = self.store.update_one(collection, &filter, &update).await?;
                if retry.matched_count == 0 {
                    warn!(collection, id, "audit container vanished before the retry");
                    return Err(ScribeError::NotFound(format!(
                        "audit container {} in {}",
                        id, collection
                    )));
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Loads the whole trail and returns the `[start_at, start_at + page_size)`
    /// window, newest first. `total_count` is the trail length.
    pub async fn retrieve_full<T: Record>(
        &self,
        collection: &str,
        id: &str,
        start_at: usize,
        page_size: usize,
    ) -> Result<SearchResult<T>> {
        let mut result = SearchResult::empty(start_at, page_size);
        let Some(doc) = self
            .store
            .find_one(collection, &Predicate::eq(ID_FIELD, id), &FindOptions::new())
            .await?
        else {
            return Ok(result);
        };

        let mut items = AuditContainer::<T>::from_document(doc)?.audit_items;
        result.total_count = items.len() as u64;
        items.reverse();
        result.results = items.into_iter().skip(start_at).take(page_size).collect();
        Ok(result)
    }

    /// Like [`AuditTrail::retrieve_full`] but slices the trail in the store:
    /// the `page_size` snapshots ending `start_at` from the newest, returned
    /// newest first. Only the slice is read, so `total_count` is the number
    /// of snapshots returned.
    pub async fn retrieve_sliced<T: Record>(
        &self,
        collection: &str,
        id: &str,
        start_at: usize,
        page_size: usize,
    ) -> Result<SearchResult<T>> {
        let mut result = SearchResult::empty(start_at, page_size);
        let options = FindOptions::new().projection(Projection::Slice {
            field: AUDIT_ITEMS_FIELD.to_string(),
            skip_from_end: start_at,
            limit: page_size,
        });
        let Some(doc) = self
            .store
            .find_one(collection, &Predicate::eq(ID_FIELD, id), &options)
            .await?
        else {
            return Ok(result);
        };

        let mut items = AuditContainer::<T>::from_document(doc)?.audit_items;
        items.reverse();
        result.total_count = items.len() as u64;
        result.results = items;
        Ok(result)
    }

    /// Sliced retrieval addressed by page number, zero being the newest page.
    pub async fn retrieve_page<T: Record>(
        &self,
        collection: &str,
        id: &str,
        page_index: usize,
        page_size: usize,
    ) -> Result<Vec<T>> {
        let start_at = page_index.saturating_mul(page_size);
        Ok(self
            .retrieve_sliced(collection, id, start_at, page_size)
            .await?
            .results)
    }
}
