use super::{DocumentStore, FindOptions, Update, UpdateResult, id_hint, name_matches, run_find};
use crate::error::{Result, ScribeError};
use crate::index::IndexDefinition;
use crate::query::{Predicate, Queryable};
use crate::types::Document;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

// Documents in insertion order plus an id -> position lookup
#[derive(Default)]
struct Collection {
    docs: Vec<Document>,
    positions: HashMap<String, usize>,
}

impl Collection {
    fn position(&self, filter: &Predicate) -> Option<usize> {
        match id_hint(filter) {
            Some(id) => self
                .positions
                .get(id)
                .copied()
                .filter(|&pos| filter.matches(&self.docs[pos])),
            None => self.docs.iter().position(|doc| filter.matches(doc)),
        }
    }

    fn insert(&mut self, doc: Document) {
        self.positions.insert(doc.id.clone(), self.docs.len());
        self.docs.push(doc);
    }
}

/// In-process store. Each collection sits behind its own lock, so updates to a
/// document are atomic with respect to every other command on the collection.
#[derive(Default, Clone)]
pub struct MemoryStore {
    collections: Arc<DashMap<String, Arc<RwLock<Collection>>>>,
    indexes: Arc<DashMap<String, Vec<IndexDefinition>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, name: &str) -> Option<Arc<RwLock<Collection>>> {
        self.collections.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn get_or_create(&self, name: &str) -> Arc<RwLock<Collection>> {
        Arc::clone(
            self.collections
                .entry(name.to_string())
                .or_default()
                .value(),
        )
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let Some(coll) = self.existing(collection) else {
            return Ok(Vec::new());
        };
        let coll = coll.read().await;
        let docs = match id_hint(filter) {
            Some(id) => run_find(
                coll.positions.get(id).map(|&pos| coll.docs[pos].clone()),
                filter,
                options,
            ),
            None => run_find(coll.docs.iter().cloned(), filter, options),
        };
        Ok(docs)
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> Result<u64> {
        let Some(coll) = self.existing(collection) else {
            return Ok(0);
        };
        let coll = coll.read().await;
        let count = match id_hint(filter) {
            Some(_) => coll.position(filter).into_iter().count(),
            None => coll.docs.iter().filter(|doc| filter.matches(doc)).count(),
        };
        Ok(count as u64)
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<()> {
        let coll = self.get_or_create(collection);
        let mut coll = coll.write().await;
        if coll.positions.contains_key(&doc.id) {
            return Err(ScribeError::DuplicateKey {
                collection: collection.to_string(),
                id: doc.id,
            });
        }
        coll.insert(doc);
        Ok(())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Predicate,
        mut doc: Document,
        upsert: bool,
    ) -> Result<UpdateResult> {
        let coll = self.get_or_create(collection);
        let mut coll = coll.write().await;
        match coll.position(filter) {
            Some(pos) => {
                doc.id = coll.docs[pos].id.clone();
                coll.docs[pos] = doc;
                Ok(UpdateResult::modified(true))
            }
            None if upsert => {
                if coll.positions.contains_key(&doc.id) {
                    return Err(ScribeError::DuplicateKey {
                        collection: collection.to_string(),
                        id: doc.id,
                    });
                }
                let id = doc.id.clone();
                coll.insert(doc);
                Ok(UpdateResult::upserted(id))
            }
            None => Ok(UpdateResult::unmatched()),
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Predicate,
        update: &Update,
    ) -> Result<UpdateResult> {
        let Some(coll) = self.existing(collection) else {
            return Ok(UpdateResult::unmatched());
        };
        let mut coll = coll.write().await;
        let Some(pos) = coll.position(filter) else {
            return Ok(UpdateResult::unmatched());
        };
        let modified = update.apply(&mut coll.docs[pos])?;
        Ok(UpdateResult::modified(modified))
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        if self.collections.remove(collection).is_some() {
            debug!(collection, "dropped in-memory collection");
        }
        self.indexes.remove(collection);
        Ok(())
    }

    async fn list_collections(&self, name: Option<&str>) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| name_matches(key, name))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn create_index(&self, definition: &IndexDefinition) -> Result<String> {
        self.get_or_create(&definition.collection);
        let mut defs = self
            .indexes
            .entry(definition.collection.clone())
            .or_default();
        defs.retain(|existing| existing.name != definition.name);
        defs.push(definition.clone());
        Ok(definition.name.clone())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDefinition>> {
        Ok(self
            .indexes
            .get(collection)
            .map(|defs| defs.clone())
            .unwrap_or_default())
    }
}
