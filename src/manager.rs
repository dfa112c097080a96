use crate::audit::{AuditPolicy, AuditTrail, stamp_audit_fields};
use crate::config::ManagerConfig;
use crate::error::{Result, ScribeError};
use crate::id::ObjectId;
use crate::index::build_definitions;
use crate::models::{Entity, Patch, Record};
use crate::naming::{SchemaKind, normalize};
use crate::query::Predicate;
use crate::repository::Repository;
use crate::search::{self, SearchRequest, SearchResult};
use crate::storage::{DocumentStore, FindOptions, Update, UpdateResult};
use crate::types::{Document, ID_FIELD, Value};
use chrono::Utc;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{debug, info, instrument};

const UPDATED_DATE_FIELD: &str = "updatedDate";
const UPDATED_BY_FIELD: &str = "updatedBy";
const RECORD_ID_FIELD: &str = "Id";

/// Operation names used in `"<collection>.<Operation>"` audit keys.
pub const SAVE_OPERATION: &str = "Save";
pub const UPDATE_OPERATION: &str = "Update";

/// Builds a collection name from its parts; blank parts are skipped.
pub fn collection_name(name: &str, prefix: Option<&str>, suffix: Option<&str>) -> String {
    let mut full = String::new();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        full.push_str(prefix);
    }
    full.push_str(name);
    if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
        full.push_str(suffix);
    }
    full
}

/// Search, persistence and audit for one entity collection.
pub struct DataManager<T: Entity> {
    repository: Repository,
    config: ManagerConfig,
    policy: AuditPolicy,
    trail: AuditTrail,
    kind: SchemaKind,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for DataManager<T> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: self.config.clone(),
            policy: self.policy.clone(),
            trail: self.trail.clone(),
            kind: self.kind,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> DataManager<T> {
    pub fn new(repository: Repository, config: ManagerConfig) -> Self {
        let policy = AuditPolicy::new(
            config.audit_by_default,
            config.default_audit_cap,
            &config.audit_settings,
        );
        let trail = AuditTrail::new(repository.store().clone());
        let kind = T::SCHEMA.resolve(repository.naming_override());
        Self {
            repository,
            config,
            policy,
            trail,
            kind,
            _entity: PhantomData,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn policy(&self) -> &AuditPolicy {
        &self.policy
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    fn store(&self) -> &dyn DocumentStore {
        self.repository.store().as_ref()
    }

    fn collection(&self) -> &str {
        &self.config.collection_name
    }

    fn audit_key(&self, operation: &str) -> String {
        format!("{}.{}", self.config.collection_name, operation)
    }

    fn audit_enabled(&self, key: Option<&str>) -> bool {
        match key {
            Some(key) => self.policy.should_audit(key),
            None => self.config.audit_by_default,
        }
    }

    fn audit_cap(&self) -> usize {
        self.policy.retained(&self.config.audit_collection_name)
    }

    // The working client scopes searches that do not name one
    fn scoped(&self, mut request: SearchRequest) -> SearchRequest {
        if request.client_id.is_none() {
            request.client_id = self.config.working_client_id.clone();
        }
        request
    }

    #[instrument(skip_all, fields(collection = %self.config.collection_name))]
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResult<T>> {
        let request = self.scoped(request);
        search::search(self.store(), self.collection(), &request, self.kind).await
    }

    /// Searches the collection decoding hits as another record type, with
    /// field names cased for that type.
    #[instrument(skip_all, fields(collection = %self.config.collection_name))]
    pub async fn search_as<I: Record>(&self, request: SearchRequest) -> Result<SearchResult<I>> {
        let request = self.scoped(request);
        let kind = I::SCHEMA.resolve(self.repository.naming_override());
        search::search(self.store(), self.collection(), &request, kind).await
    }

    #[instrument(skip(self), fields(collection = %self.config.collection_name))]
    pub async fn find(&self, id: &str) -> Result<Option<T>> {
        search::find(
            self.store(),
            self.collection(),
            id,
            self.config.working_client_id.as_deref(),
            self.kind,
        )
        .await
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        search::exists(self.store(), self.collection(), id).await
    }

    pub async fn item_exists(&self, id: &str, request: &SearchRequest) -> Result<bool> {
        search::item_exists(self.store(), self.collection(), id, request, self.kind).await
    }

    /// Saves `item` as a brand new record under a freshly generated id.
    #[instrument(skip_all, fields(collection = %self.config.collection_name))]
    pub async fn create(&self, mut item: T) -> Result<T> {
        let base = item.base_mut();
        base.id = Some(ObjectId::new());
        base.created_date = None;
        self.save(item).await
    }

    /// Builds a new record from any serializable set of properties, then
    /// creates it.
    pub async fn create_from<P: Serialize + Sync>(&self, props: &P) -> Result<T> {
        let mut doc = Document::from_serde(ObjectId::new().to_string(), props)?;
        doc.data.remove(RECORD_ID_FIELD);
        doc.data.remove(ID_FIELD);
        let item = T::from_document(doc)?;
        self.create(item).await
    }

    /// Upserts `item` after stamping its audit fields, then records it in the
    /// audit trail when the policy allows.
    #[instrument(skip_all, fields(collection = %self.config.collection_name))]
    pub async fn save(&self, mut item: T) -> Result<T> {
        let is_new = stamp_audit_fields(item.base_mut(), &self.config.audit_user, Utc::now());
        let doc = item.to_document()?;
        let filter = Predicate::eq(ID_FIELD, doc.id.as_str());
        let id = doc.id.clone();
        let result = self
            .store()
            .replace_one(self.collection(), &filter, doc, true)
            .await?;
        debug!(%id, is_new, matched = result.matched_count, "saved");

        let key = self.audit_key(SAVE_OPERATION);
        if self.audit_enabled(Some(&key)) && (!is_new || self.config.audit_new_items) {
            self.trail
                .record(&self.config.audit_collection_name, &item, self.audit_cap())
                .await?;
        }
        Ok(item)
    }

    /// Applies a partial update built by `patch` and returns the stored
    /// result. Fails with [`ScribeError::NotFound`] when no record has the
    /// patch's id.
    #[instrument(skip_all, fields(collection = %self.config.collection_name))]
    pub async fn update<P: Patch>(&self, patch: &P) -> Result<T> {
        let id = patch.id().to_string();
        let update = patch.build_update(self.kind);
        let key = self.audit_key(UPDATE_OPERATION);
        let result = self.simple_update(&id, update, Some(&key)).await?;
        if result.matched_count == 0 {
            return Err(ScribeError::NotFound(format!(
                "{} in {}",
                id, self.config.collection_name
            )));
        }
        self.find(&id).await?.ok_or_else(|| {
            ScribeError::NotFound(format!("{} in {}", id, self.config.collection_name))
        })
    }

    /// Applies `update` to the record `id`, stamping the update fields, and
    /// audits the stored result under `audit_key`.
    #[instrument(skip(self, update), fields(collection = %self.config.collection_name))]
    pub async fn simple_update(
        &self,
        id: &str,
        update: Update,
        audit_key: Option<&str>,
    ) -> Result<UpdateResult> {
        let now = Value::from(serde_json::to_value(Utc::now())?);
        let update = update
            .set(normalize(UPDATED_DATE_FIELD, self.kind), now)
            .set(
                normalize(UPDATED_BY_FIELD, self.kind),
                self.config.audit_user.as_str(),
            );
        let result = self
            .store()
            .update_one(self.collection(), &Predicate::eq(ID_FIELD, id), &update)
            .await?;
        if result.matched_count == 0 {
            debug!(id, "update matched nothing");
            return Ok(result);
        }
        self.audit_by_id(id, audit_key).await?;
        Ok(result)
    }

    /// Records the stored state of `id` in the audit trail. Returns whether a
    /// snapshot was written.
    pub async fn audit_by_id(&self, id: &str, audit_key: Option<&str>) -> Result<bool> {
        if !self.audit_enabled(audit_key) {
            return Ok(false);
        }
        let Some(item) = self.find(id).await? else {
            return Ok(false);
        };
        self.trail
            .record(&self.config.audit_collection_name, &item, self.audit_cap())
            .await?;
        Ok(true)
    }

    /// Snapshots the stored documents for `ids` as they are, without decoding
    /// them. Returns the number audited.
    pub async fn audit_items_by_id(&self, ids: &[String], audit_key: Option<&str>) -> Result<usize> {
        if ids.is_empty() || !self.audit_enabled(audit_key) {
            return Ok(0);
        }
        let filter = Predicate::any_of(ID_FIELD, ids.iter().cloned().map(Value::String).collect());
        let docs = self
            .store()
            .find(self.collection(), &filter, &FindOptions::new())
            .await?;
        let cap = self.audit_cap();
        for doc in &docs {
            self.trail
                .record(&self.config.audit_collection_name, doc, cap)
                .await?;
        }
        Ok(docs.len())
    }

    pub async fn audit_items(&self, items: &[T], audit_key: Option<&str>) -> Result<usize> {
        if !self.audit_enabled(audit_key) {
            return Ok(0);
        }
        let cap = self.audit_cap();
        for item in items {
            self.trail
                .record(&self.config.audit_collection_name, item, cap)
                .await?;
        }
        Ok(items.len())
    }

    pub async fn retrieve_audit_trail(
        &self,
        id: &str,
        start_at: usize,
        page_size: usize,
    ) -> Result<SearchResult<T>> {
        self.trail
            .retrieve_full(&self.config.audit_collection_name, id, start_at, page_size)
            .await
    }

    pub async fn retrieve_audit_trail_sliced(
        &self,
        id: &str,
        start_at: usize,
        page_size: usize,
    ) -> Result<SearchResult<T>> {
        self.trail
            .retrieve_sliced(&self.config.audit_collection_name, id, start_at, page_size)
            .await
    }

    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        info!(collection = name, "dropping collection");
        self.repository.drop_collection(name).await
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.repository.collection_exists(name).await
    }

    /// Creates the indexes `T` declares. Returns the index names created.
    pub async fn ensure_indexes(&self) -> Result<Vec<String>> {
        if self.repository.settings().indexing_disabled {
            return Ok(Vec::new());
        }
        if self.config.collection_name.is_empty() {
            return Err(ScribeError::InvalidOperation(
                "no collection configured for indexing".into(),
            ));
        }
        let mut names = Vec::new();
        for definition in build_definitions(self.collection(), &T::index_fields(), self.kind) {
            names.push(self.store().create_index(&definition).await?);
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_parts() {
        assert_eq!(collection_name("cards", None, None), "cards");
        assert_eq!(collection_name("cards", Some("live_"), Some("_v2")), "live_cards_v2");
        assert_eq!(collection_name("cards", Some(""), Some("Audit")), "cardsAudit");
    }
}
