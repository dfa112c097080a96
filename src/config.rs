use crate::error::Result;
use crate::naming::SchemaKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Where and how to open the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositorySettings {
    /// `memory://<name>` or `sled://<directory>`.
    pub connection_string: String,
    pub database_name: String,
    /// Trace every store command with its rendered filter.
    pub log: bool,
    /// Skip index creation in `ensure_indexes`.
    pub indexing_disabled: bool,
    /// Forces one field casing for every record type.
    pub field_naming: Option<SchemaKind>,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            connection_string: "memory://default".to_string(),
            database_name: "scribe".to_string(),
            log: false,
            indexing_disabled: false,
            field_naming: None,
        }
    }
}

impl RepositorySettings {
    pub fn new(connection_string: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_field_naming(mut self, kind: SchemaKind) -> Self {
        self.field_naming = Some(kind);
        self
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Per-manager behaviour: collection names, audit policy inputs and the
/// identity stamped onto audited records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagerConfig {
    pub collection_name: String,
    pub audit_collection_name: String,
    /// Whether operations without an explicit setting are audited.
    pub audit_by_default: bool,
    /// Whether the first save of a record is audited.
    pub audit_new_items: bool,
    /// `"<collection>.<Operation>"` and `"<auditCollection>.Size"` entries.
    pub audit_settings: HashMap<String, String>,
    pub default_audit_cap: i64,
    pub audit_user: String,
    /// Owner scope applied to searches and lookups when set.
    pub working_client_id: Option<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            collection_name: String::new(),
            audit_collection_name: String::new(),
            audit_by_default: true,
            audit_new_items: true,
            audit_settings: HashMap::new(),
            default_audit_cap: 100,
            audit_user: "system".to_string(),
            working_client_id: None,
        }
    }
}

impl ManagerConfig {
    /// Config for `collection` with its audit trail in `<collection>Audit`.
    pub fn new(collection: impl Into<String>) -> Self {
        let collection_name = collection.into();
        Self {
            audit_collection_name: format!("{}Audit", collection_name),
            collection_name,
            ..Self::default()
        }
    }

    pub fn with_audit_collection(mut self, name: impl Into<String>) -> Self {
        self.audit_collection_name = name.into();
        self
    }

    pub fn with_audit_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.audit_settings.insert(key.into(), value.into());
        self
    }

    pub fn with_audit_user(mut self, user: impl Into<String>) -> Self {
        self.audit_user = user.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.working_client_id = Some(client_id.into());
        self
    }

    pub fn with_audit_by_default(mut self, audit: bool) -> Self {
        self.audit_by_default = audit;
        self
    }

    pub fn with_audit_new_items(mut self, audit: bool) -> Self {
        self.audit_new_items = audit;
        self
    }

    pub fn with_default_cap(mut self, cap: i64) -> Self {
        self.default_audit_cap = cap;
        self
    }
}
