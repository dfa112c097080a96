//! Document store contract and the embedded backends that implement it.
//!
//! The data layer only talks to [`DocumentStore`]. [`MemoryStore`] keeps
//! collections in process, [`SledStore`] persists them in sled trees and
//! [`LoggedStore`] wraps either one to trace every command.

pub mod logged;
pub mod memory;
pub mod persistent;

pub use logged::LoggedStore;
pub use memory::MemoryStore;
pub use persistent::SledStore;

use crate::error::{Result, ScribeError};
use crate::index::IndexDefinition;
use crate::query::{Predicate, Queryable, SortSpec};
use crate::types::{Document, ID_FIELD, Value};
use async_trait::async_trait;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        filter: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>>;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Predicate,
        options: &FindOptions,
    ) -> Result<Option<Document>> {
        let options = options.clone().limit(1);
        Ok(self.find(collection, filter, &options).await?.into_iter().next())
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> Result<u64>;

    /// Fails with [`ScribeError::DuplicateKey`] when the id is taken.
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<()>;

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Predicate,
        doc: Document,
        upsert: bool,
    ) -> Result<UpdateResult>;

    /// Applies `update` to the first matching document in one atomic step.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Predicate,
        update: &Update,
    ) -> Result<UpdateResult>;

    async fn drop_collection(&self, collection: &str) -> Result<()>;

    async fn list_collections(&self, name: Option<&str>) -> Result<Vec<String>>;

    /// Registers an index and returns its name.
    async fn create_index(&self, definition: &IndexDefinition) -> Result<String>;

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDefinition>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub skip: usize,
    pub limit: Option<usize>,
    pub projection: Option<Projection>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Option<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keeps `limit` array items ending `skip_from_end` items before the end
    /// of `field`. Other fields are left alone.
    Slice {
        field: String,
        skip_from_end: usize,
        limit: usize,
    },
}

impl Projection {
    pub fn apply(&self, doc: &mut Document) {
        match self {
            Projection::Slice {
                field,
                skip_from_end,
                limit,
            } => {
                if let Some(Value::Array(items)) = doc.get_path_mut(field) {
                    let end = items.len().saturating_sub(*skip_from_end);
                    let start = end.saturating_sub(*limit);
                    items.truncate(end);
                    items.drain(..start);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set { field: String, value: Value },
    Push { field: String, value: Value },
    PopFirst { field: String },
    /// Appends then keeps only the newest `keep_last` items. Zero keeps all.
    PushCapped {
        field: String,
        value: Value,
        keep_last: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn push(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Push {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn pop_first(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::PopFirst {
            field: field.into(),
        });
        self
    }

    pub fn push_capped(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
        keep_last: usize,
    ) -> Self {
        self.ops.push(UpdateOp::PushCapped {
            field: field.into(),
            value: value.into(),
            keep_last,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every operation to `doc`, returning whether anything changed.
    pub fn apply(&self, doc: &mut Document) -> Result<bool> {
        let mut modified = false;
        for op in &self.ops {
            modified |= apply_op(doc, op)?;
        }
        Ok(modified)
    }
}

fn apply_op(doc: &mut Document, op: &UpdateOp) -> Result<bool> {
    match op {
        UpdateOp::Set { field, value } => {
            if field == ID_FIELD {
                if value.as_str() == Some(doc.id.as_str()) {
                    return Ok(false);
                }
                return Err(ScribeError::InvalidOperation(
                    "the document id is immutable".into(),
                ));
            }
            if doc.get_path_mut(field).is_some_and(|current| *current == *value) {
                return Ok(false);
            }
            if !doc.set_path(field, value.clone()) {
                return Err(ScribeError::InvalidOperation(format!(
                    "cannot set '{}' through a non-object value",
                    field
                )));
            }
            Ok(true)
        }
        UpdateOp::Push { field, value } => push(doc, field, value.clone(), 0),
        UpdateOp::PushCapped {
            field,
            value,
            keep_last,
        } => push(doc, field, value.clone(), *keep_last),
        UpdateOp::PopFirst { field } => match doc.get_path_mut(field) {
            Some(Value::Array(items)) if !items.is_empty() => {
                items.remove(0);
                Ok(true)
            }
            Some(Value::Array(_)) | None => Ok(false),
            Some(_) => Err(ScribeError::InvalidOperation(format!(
                "cannot pop from non-array field '{}'",
                field
            ))),
        },
    }
}

fn push(doc: &mut Document, field: &str, value: Value, keep_last: usize) -> Result<bool> {
    if doc.get_path_mut(field).is_none() && !doc.set_path(field, Value::Array(Vec::new())) {
        return Err(ScribeError::InvalidOperation(format!(
            "cannot create array at '{}'",
            field
        )));
    }
    match doc.get_path_mut(field) {
        Some(Value::Array(items)) => {
            items.push(value);
            if keep_last > 0 && items.len() > keep_last {
                let excess = items.len() - keep_last;
                items.drain(..excess);
            }
            Ok(true)
        }
        _ => Err(ScribeError::InvalidOperation(format!(
            "cannot push to non-array field '{}'",
            field
        ))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<String>,
}

impl UpdateResult {
    pub fn unmatched() -> Self {
        Self::default()
    }

    pub fn modified(modified: bool) -> Self {
        Self {
            matched_count: 1,
            modified_count: u64::from(modified),
            upserted_id: None,
        }
    }

    pub fn upserted(id: impl Into<String>) -> Self {
        Self {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id.into()),
        }
    }
}

/// The `_id` a filter pins, if any, so backends can skip the scan.
pub(crate) fn id_hint(filter: &Predicate) -> Option<&str> {
    match filter {
        Predicate::Eq {
            field,
            value: Value::String(id),
        } if field == ID_FIELD => Some(id),
        Predicate::And(nodes) => nodes.iter().find_map(id_hint),
        _ => None,
    }
}

/// Filters, orders, windows and projects a candidate set. Candidates arrive in
/// natural order.
pub(crate) fn run_find<I>(candidates: I, filter: &Predicate, options: &FindOptions) -> Vec<Document>
where
    I: IntoIterator<Item = Document>,
{
    let matching = candidates.into_iter().filter(|doc| filter.matches(doc));
    let window: Vec<Document> = match &options.sort {
        Some(sort) if !sort.is_empty() => {
            let mut all: Vec<Document> = matching.collect();
            all.sort_by(|a, b| sort.compare(a, b));
            all.into_iter()
                .skip(options.skip)
                .take(options.limit.unwrap_or(usize::MAX))
                .collect()
        }
        _ => matching
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect(),
    };

    match &options.projection {
        Some(projection) => window
            .into_iter()
            .map(|mut doc| {
                projection.apply(&mut doc);
                doc
            })
            .collect(),
        None => window,
    }
}

/// Name filter semantics shared by the backends: exact match when given.
pub(crate) fn name_matches(name: &str, filter: Option<&str>) -> bool {
    filter.is_none_or(|wanted| wanted == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trail(n: i64) -> Document {
        Document::with_id("a").field("auditItems", (1..=n).map(Value::Int).collect::<Vec<_>>())
    }

    fn items(doc: &Document) -> Vec<i64> {
        doc.get_path("auditItems")
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_i64)
            .collect()
    }

    #[test]
    fn test_push_capped_keeps_newest() {
        let mut doc = trail(5);
        let update = Update::new().push_capped("auditItems", 6, 3);
        assert!(update.apply(&mut doc).unwrap());
        assert_eq!(items(&doc), vec![4, 5, 6]);

        let mut doc = trail(2);
        Update::new().push_capped("auditItems", 3, 0).apply(&mut doc).unwrap();
        assert_eq!(items(&doc), vec![1, 2, 3]);
    }

    #[test]
    fn test_push_creates_missing_array_and_pop_first() {
        let mut doc = Document::with_id("a");
        Update::new().push("auditItems", 1).push("auditItems", 2).apply(&mut doc).unwrap();
        assert_eq!(items(&doc), vec![1, 2]);
        assert!(Update::new().pop_first("auditItems").apply(&mut doc).unwrap());
        assert_eq!(items(&doc), vec![2]);
    }

    #[test]
    fn test_push_onto_scalar_fails() {
        let mut doc = Document::with_id("a").field("auditItems", "nope");
        let err = Update::new().push("auditItems", 1).apply(&mut doc).unwrap_err();
        assert!(matches!(err, ScribeError::InvalidOperation(_)));
    }

    #[test]
    fn test_set_reports_unchanged_values() {
        let mut doc = Document::with_id("a").field("Name", "x");
        assert!(!Update::new().set("Name", "x").apply(&mut doc).unwrap());
        assert!(Update::new().set("Name", "y").apply(&mut doc).unwrap());
        assert!(!Update::new().set(ID_FIELD, "a").apply(&mut doc).unwrap());
        assert!(Update::new().set(ID_FIELD, "b").apply(&mut doc).is_err());
    }

    #[test]
    fn test_slice_projection_windows() {
        let slice = |skip_from_end, limit| Projection::Slice {
            field: "auditItems".into(),
            skip_from_end,
            limit,
        };

        let mut doc = trail(10);
        slice(0, 3).apply(&mut doc);
        assert_eq!(items(&doc), vec![8, 9, 10]);

        let mut doc = trail(10);
        slice(4, 3).apply(&mut doc);
        assert_eq!(items(&doc), vec![4, 5, 6]);

        let mut doc = trail(2);
        slice(1, 5).apply(&mut doc);
        assert_eq!(items(&doc), vec![1]);

        let mut doc = trail(2);
        slice(5, 5).apply(&mut doc);
        assert!(items(&doc).is_empty());
    }

    #[test]
    fn test_id_hint_looks_inside_and() {
        let filter = Predicate::eq("Deleted", false).and(Predicate::eq(ID_FIELD, "abc"));
        assert_eq!(id_hint(&filter), Some("abc"));
        assert_eq!(id_hint(&Predicate::eq("Name", "abc")), None);
    }

    #[test]
    fn test_run_find_sorts_before_windowing() {
        let docs = (0..10).map(|i| Document::with_id(format!("{i}")).field("rank", 9 - i));
        let options = FindOptions::new()
            .sort(Some(SortSpec::new().ascending("rank")))
            .skip(2)
            .limit(3);
        let ids: Vec<String> = run_find(docs, &Predicate::All, &options)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["7", "6", "5"]);
    }
}
