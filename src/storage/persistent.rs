use super::{DocumentStore, FindOptions, Update, UpdateResult, id_hint, name_matches, run_find};
use crate::error::{Result, ScribeError};
use crate::index::IndexDefinition;
use crate::query::{Predicate, Queryable};
use crate::types::Document;
use async_trait::async_trait;
use sled::{Db, Tree};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

// Trees with this prefix belong to the store itself, never to callers
const INTERNAL_PREFIX: &str = "__";
const INDEX_TREE: &str = "__indexes";

/// Persistent store on sled. Each collection is a tree keyed by document id
/// with bincode-encoded documents, so natural order is id order.
pub struct SledStore {
    db: Db,
    path: PathBuf,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = sled::Config::new()
            .path(&path)
            .cache_capacity(1024 * 1024 * 64)
            .flush_every_ms(Some(1000))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        debug!(path = %path.display(), "opened sled store");
        Ok(Self { db, path })
    }

    /// A throwaway store removed when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            path: PathBuf::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Runs sled work on the blocking pool so scans and disk reads never
    /// stall the async workers.
    async fn blocking<R, F>(&self, work: F) -> Result<R>
    where
        F: FnOnce(Db) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || work(db)).await?
    }
}

fn collection_names(db: &Db) -> Vec<String> {
    db.tree_names()
        .into_iter()
        .filter_map(|name| String::from_utf8(name.to_vec()).ok())
        .filter(|name| !name.starts_with(INTERNAL_PREFIX))
        .collect()
}

// Reads must not create the tree as a side effect
fn existing_tree(db: &Db, collection: &str) -> Result<Option<Tree>> {
    if collection_names(db).iter().any(|name| name == collection) {
        Ok(Some(db.open_tree(collection)?))
    } else {
        Ok(None)
    }
}

fn writable_tree(db: &Db, collection: &str) -> Result<Tree> {
    if collection.starts_with(INTERNAL_PREFIX) {
        return Err(ScribeError::InvalidOperation(format!(
            "collection names may not start with '{}'",
            INTERNAL_PREFIX
        )));
    }
    Ok(db.open_tree(collection)?)
}

fn scan(tree: &Tree) -> impl Iterator<Item = Result<Document>> + '_ {
    tree.iter().values().map(|value| {
        let bytes = value?;
        Ok(bincode::deserialize::<Document>(&bytes)?)
    })
}

fn load(tree: &Tree, id: &str) -> Result<Option<Document>> {
    match tree.get(id.as_bytes())? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

fn candidates(tree: &Tree, filter: &Predicate) -> Result<Vec<Document>> {
    match id_hint(filter) {
        Some(id) => Ok(load(tree, id)?.into_iter().collect()),
        None => scan(tree).collect(),
    }
}

fn first_match(tree: &Tree, filter: &Predicate) -> Result<Option<Document>> {
    if let Some(id) = id_hint(filter) {
        return Ok(load(tree, id)?.filter(|doc| filter.matches(doc)));
    }
    for doc in scan(tree) {
        let doc = doc?;
        if filter.matches(&doc) {
            return Ok(Some(doc));
        }
    }
    Ok(None)
}

fn insert_new(tree: &Tree, collection: &str, doc: Document) -> Result<()> {
    let bytes = bincode::serialize(&doc)?;
    match tree.compare_and_swap(doc.id.as_bytes(), None as Option<&[u8]>, Some(bytes))? {
        Ok(()) => Ok(()),
        Err(_) => Err(ScribeError::DuplicateKey {
            collection: collection.to_string(),
            id: doc.id,
        }),
    }
}

fn update_in_place(tree: &Tree, filter: &Predicate, update: &Update) -> Result<UpdateResult> {
    let Some(target) = first_match(tree, filter)? else {
        return Ok(UpdateResult::unmatched());
    };

    // The closure may run several times under contention; the outcome of
    // the last run is the one that was committed.
    let mut matched = false;
    let mut modified = false;
    let mut failure: Option<ScribeError> = None;
    tree.fetch_and_update(target.id.as_bytes(), |current| {
        matched = false;
        modified = false;
        failure = None;
        let bytes = current?;
        let mut doc: Document = match bincode::deserialize(bytes) {
            Ok(doc) => doc,
            Err(e) => {
                failure = Some(e.into());
                return Some(bytes.to_vec());
            }
        };
        if !filter.matches(&doc) {
            return Some(bytes.to_vec());
        }
        matched = true;
        match update
            .apply(&mut doc)
            .and_then(|changed| Ok((changed, bincode::serialize(&doc)?)))
        {
            Ok((changed, encoded)) => {
                modified = changed;
                Some(encoded)
            }
            Err(e) => {
                failure = Some(e);
                Some(bytes.to_vec())
            }
        }
    })?;

    if let Some(e) = failure {
        return Err(e);
    }
    if !matched {
        return Ok(UpdateResult::unmatched());
    }
    Ok(UpdateResult::modified(modified))
}

fn index_prefix(collection: &str) -> String {
    format!("{}/", collection)
}

fn index_key(collection: &str, name: &str) -> String {
    format!("{}/{}", collection, name)
}

#[async_trait]
impl DocumentStore for SledStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let options = options.clone();
        self.blocking(move |db| {
            let Some(tree) = existing_tree(&db, &collection)? else {
                return Ok(Vec::new());
            };
            Ok(run_find(candidates(&tree, &filter)?, &filter, &options))
        })
        .await
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> Result<u64> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.blocking(move |db| {
            let Some(tree) = existing_tree(&db, &collection)? else {
                return Ok(0);
            };
            let mut count = 0;
            for doc in candidates(&tree, &filter)? {
                if filter.matches(&doc) {
                    count += 1;
                }
            }
            Ok(count)
        })
        .await
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<()> {
        let collection = collection.to_string();
        self.blocking(move |db| {
            let tree = writable_tree(&db, &collection)?;
            insert_new(&tree, &collection, doc)
        })
        .await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Predicate,
        mut doc: Document,
        upsert: bool,
    ) -> Result<UpdateResult> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.blocking(move |db| {
            let tree = writable_tree(&db, &collection)?;
            match first_match(&tree, &filter)? {
                Some(existing) => {
                    doc.id = existing.id;
                    tree.insert(doc.id.as_bytes(), bincode::serialize(&doc)?)?;
                    Ok(UpdateResult::modified(true))
                }
                None if upsert => {
                    let id = doc.id.clone();
                    insert_new(&tree, &collection, doc)?;
                    Ok(UpdateResult::upserted(id))
                }
                None => Ok(UpdateResult::unmatched()),
            }
        })
        .await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Predicate,
        update: &Update,
    ) -> Result<UpdateResult> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let update = update.clone();
        self.blocking(move |db| {
            let Some(tree) = existing_tree(&db, &collection)? else {
                return Ok(UpdateResult::unmatched());
            };
            update_in_place(&tree, &filter, &update)
        })
        .await
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let collection = collection.to_string();
        self.blocking(move |db| {
            if existing_tree(&db, &collection)?.is_some() {
                db.drop_tree(&collection)?;
                debug!(collection = %collection, "dropped sled tree");
            }
            let indexes = db.open_tree(INDEX_TREE)?;
            for key in indexes.scan_prefix(index_prefix(&collection)).keys() {
                indexes.remove(key?)?;
            }
            Ok(())
        })
        .await
    }

    async fn list_collections(&self, name: Option<&str>) -> Result<Vec<String>> {
        let name = name.map(str::to_string);
        self.blocking(move |db| {
            let mut names: Vec<String> = collection_names(&db)
                .into_iter()
                .filter(|key| name_matches(key, name.as_deref()))
                .collect();
            names.sort();
            Ok(names)
        })
        .await
    }

    async fn create_index(&self, definition: &IndexDefinition) -> Result<String> {
        let definition = definition.clone();
        self.blocking(move |db| {
            writable_tree(&db, &definition.collection)?;
            let indexes = db.open_tree(INDEX_TREE)?;
            indexes.insert(
                index_key(&definition.collection, &definition.name),
                bincode::serialize(&definition)?,
            )?;
            Ok(definition.name)
        })
        .await
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDefinition>> {
        let prefix = index_prefix(collection);
        self.blocking(move |db| {
            let indexes = db.open_tree(INDEX_TREE)?;
            indexes
                .scan_prefix(prefix)
                .values()
                .map(|value| Ok(bincode::deserialize(&value?)?))
                .collect()
        })
        .await
    }
}

impl Drop for SledStore {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            error!(error = %e, "error flushing sled store");
        }
    }
}
