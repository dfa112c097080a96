//! Paginated, scoped search over a collection.
//!
//! Every search starts from the soft-delete and archive flags, narrows to the
//! working client and the quick-search term, then applies the filter DSL. The
//! total count and the page are two separate reads, so a concurrent write can
//! make them disagree.

use crate::error::Result;
use crate::models::Record;
use crate::naming::{SchemaKind, normalize};
use crate::query::{Pattern, Predicate, compile_filter, compile_sort};
use crate::storage::{DocumentStore, FindOptions};
use crate::types::ID_FIELD;
use serde::Serialize;
use tracing::debug;

pub const DELETED_FIELD: &str = "deleted";
pub const ARCHIVED_FIELD: &str = "archived";
pub const CLIENT_ID_FIELD: &str = "clientId";
pub const QUICK_SEARCH_FIELD: &str = "quickSearchValue";

pub const DEFAULT_PAGE_SIZE: usize = 500;

/// One page of results plus the request that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResult<T> {
    pub results: Vec<T>,
    /// Size of the whole filtered set, independent of the page window.
    pub total_count: u64,
    pub page_size: usize,
    pub start_at: usize,
    pub sort: Option<String>,
    pub search_term: Option<String>,
    pub filter: Option<String>,
}

impl<T> SearchResult<T> {
    pub fn empty(start_at: usize, page_size: usize) -> Self {
        Self {
            results: Vec::new(),
            total_count: 0,
            page_size,
            start_at,
            sort: None,
            search_term: None,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub search_term: Option<String>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub start_at: usize,
    pub page_size: usize,
    pub deleted: bool,
    pub ignore_delete_flag: bool,
    pub archived: bool,
    pub ignore_archive_flag: bool,
    pub client_id: Option<String>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            search_term: None,
            filter: None,
            sort: None,
            start_at: 0,
            page_size: DEFAULT_PAGE_SIZE,
            deleted: false,
            ignore_delete_flag: false,
            archived: false,
            ignore_archive_flag: false,
            client_id: None,
        }
    }
}

// Blank strings behave like absent ones
fn non_blank(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.trim().is_empty()).then_some(value)
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.search_term = non_blank(term);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = non_blank(filter);
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = non_blank(sort);
        self
    }

    pub fn page(mut self, start_at: usize, page_size: usize) -> Self {
        self.start_at = start_at;
        self.page_size = page_size;
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn ignore_deleted(mut self) -> Self {
        self.ignore_delete_flag = true;
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn ignore_archived(mut self) -> Self {
        self.ignore_archive_flag = true;
        self
    }

    pub fn client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = non_blank(client_id);
        self
    }

    /// The full predicate for this request. Fails only when the search term
    /// is not a valid regular expression.
    pub fn build_predicate(&self, kind: SchemaKind) -> Result<Predicate> {
        let mut predicate = Predicate::All;
        if !self.ignore_delete_flag {
            predicate =
                predicate.and(Predicate::eq(normalize(DELETED_FIELD, kind), self.deleted));
        }
        if !self.ignore_archive_flag {
            predicate =
                predicate.and(Predicate::eq(normalize(ARCHIVED_FIELD, kind), self.archived));
        }
        if let Some(client_id) = &self.client_id {
            predicate = predicate.and(Predicate::eq(
                normalize(CLIENT_ID_FIELD, kind),
                client_id.as_str(),
            ));
        }
        if let Some(term) = &self.search_term {
            predicate = predicate.and(Predicate::regex(
                normalize(QUICK_SEARCH_FIELD, kind),
                Pattern::case_insensitive(term)?,
            ));
        }
        Ok(match &self.filter {
            Some(filter) => compile_filter(filter, predicate, kind),
            None => predicate,
        })
    }
}

/// Runs `request` against `collection`, decoding each hit as `T`.
pub async fn search<T: Record>(
    store: &dyn DocumentStore,
    collection: &str,
    request: &SearchRequest,
    kind: SchemaKind,
) -> Result<SearchResult<T>> {
    let predicate = request.build_predicate(kind)?;
    let total_count = store.count(collection, &predicate).await?;

    let options = FindOptions::new()
        .sort(request.sort.as_deref().and_then(|sort| compile_sort(sort, kind)))
        .skip(request.start_at)
        .limit(request.page_size);
    let docs = store.find(collection, &predicate, &options).await?;
    debug!(collection, total_count, returned = docs.len(), "search complete");

    Ok(SearchResult {
        results: docs
            .into_iter()
            .map(T::from_document)
            .collect::<Result<Vec<_>>>()?,
        total_count,
        page_size: request.page_size,
        start_at: request.start_at,
        sort: request.sort.clone(),
        search_term: request.search_term.clone(),
        filter: request.filter.clone(),
    })
}

/// First document with the given id, narrowed to `client_id` when set.
pub async fn find<T: Record>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    client_id: Option<&str>,
    kind: SchemaKind,
) -> Result<Option<T>> {
    let mut predicate = Predicate::eq(ID_FIELD, id);
    if let Some(client_id) = client_id.filter(|c| !c.trim().is_empty()) {
        predicate = predicate.and(Predicate::eq(normalize(CLIENT_ID_FIELD, kind), client_id));
    }
    store
        .find_one(collection, &predicate, &FindOptions::new())
        .await?
        .map(T::from_document)
        .transpose()
}

pub async fn exists(store: &dyn DocumentStore, collection: &str, id: &str) -> Result<bool> {
    Ok(store.count(collection, &Predicate::eq(ID_FIELD, id)).await? > 0)
}

/// Existence check honouring the soft-delete and archive flags of `request`.
/// Paging, sort and search term are ignored.
pub async fn item_exists(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    request: &SearchRequest,
    kind: SchemaKind,
) -> Result<bool> {
    let scoped = SearchRequest {
        search_term: None,
        sort: None,
        ..request.clone()
    };
    let predicate = scoped.build_predicate(kind)?.and(Predicate::eq(ID_FIELD, id));
    Ok(store.count(collection, &predicate).await? > 0)
}
