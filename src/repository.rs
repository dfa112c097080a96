use crate::config::RepositorySettings;
use crate::error::{Result, ScribeError};
use crate::naming::SchemaKind;
use crate::storage::{DocumentStore, LoggedStore, MemoryStore, SledStore};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};
use tracing::info;

// Opening the same connection twice in one process shares the store. Named
// memory stores stay registered for the life of the process so their data
// outlives any one repository; sled stores are held weakly and close when the
// last repository drops.
static MEMORY_STORES: OnceLock<DashMap<String, MemoryStore>> = OnceLock::new();
static SLED_STORES: OnceLock<DashMap<PathBuf, Weak<SledStore>>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Memory(String),
    Sled(PathBuf),
}

impl Backend {
    pub fn parse(connection_string: &str) -> Result<Self> {
        let invalid = || ScribeError::InvalidConnectionString(connection_string.to_string());
        let (scheme, rest) = connection_string.split_once("://").ok_or_else(invalid)?;
        if rest.trim().is_empty() {
            return Err(invalid());
        }
        match scheme.to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory(rest.to_string())),
            "sled" => Ok(Backend::Sled(PathBuf::from(rest))),
            _ => Err(invalid()),
        }
    }
}

/// An open database: the store handle plus the settings it was opened with.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
    settings: RepositorySettings,
}

impl Repository {
    /// Opens the store named by the connection string. The database name picks
    /// a namespace (memory) or subdirectory (sled).
    pub fn open(settings: RepositorySettings) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match Backend::parse(&settings.connection_string)? {
            Backend::Memory(name) => {
                let key = format!("{}/{}", name, settings.database_name);
                let stores = MEMORY_STORES.get_or_init(DashMap::new);
                Arc::new(stores.entry(key).or_default().clone())
            }
            Backend::Sled(dir) => open_sled(dir.join(&settings.database_name))?,
        };
        info!(
            connection = %settings.connection_string,
            database = %settings.database_name,
            "opened repository"
        );
        Ok(Self::with_store(store, settings))
    }

    /// Wraps an existing store, applying the logging switch from `settings`.
    pub fn with_store(store: Arc<dyn DocumentStore>, settings: RepositorySettings) -> Self {
        let store: Arc<dyn DocumentStore> = if settings.log {
            Arc::new(LoggedStore::new(store))
        } else {
            store
        };
        Self { store, settings }
    }

    /// A private in-memory repository.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), RepositorySettings::default())
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    pub fn naming_override(&self) -> Option<SchemaKind> {
        self.settings.field_naming
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(!self.store.list_collections(Some(name)).await?.is_empty())
    }

    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        self.store.drop_collection(name).await
    }
}

fn open_sled(path: PathBuf) -> Result<Arc<dyn DocumentStore>> {
    let stores = SLED_STORES.get_or_init(DashMap::new);
    stores.retain(|_, store| store.strong_count() > 0);
    let mut slot = stores.entry(path.clone()).or_default();
    if let Some(store) = slot.upgrade() {
        return Ok(store);
    }
    let store = Arc::new(SledStore::open(&path)?);
    *slot = Arc::downgrade(&store);
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Document;

    #[test]
    fn test_connection_strings() {
        assert_eq!(
            Backend::parse("memory://cards").unwrap(),
            Backend::Memory("cards".into())
        );
        assert_eq!(
            Backend::parse("SLED:///var/lib/scribe").unwrap(),
            Backend::Sled(PathBuf::from("/var/lib/scribe"))
        );
        for bad in ["", "cards", "mongodb://localhost", "memory://"] {
            assert!(matches!(
                Backend::parse(bad),
                Err(ScribeError::InvalidConnectionString(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_same_memory_connection_shares_data() {
        let settings = RepositorySettings::new("memory://repo-test", "shared");
        let first = Repository::open(settings.clone()).unwrap();
        first.store().insert_one("cards", Document::with_id("a")).await.unwrap();

        let second = Repository::open(settings).unwrap();
        assert!(second.collection_exists("cards").await.unwrap());

        let other_db = Repository::open(RepositorySettings::new("memory://repo-test", "other")).unwrap();
        assert!(!other_db.collection_exists("cards").await.unwrap());
    }

    #[tokio::test]
    async fn test_sled_reopen_shares_handle() {
        let dir = tempfile::tempdir().unwrap();
        let conn = format!("sled://{}", dir.path().display());
        let first = Repository::open(RepositorySettings::new(conn.clone(), "db").with_log(true)).unwrap();
        first.store().insert_one("cards", Document::with_id("a")).await.unwrap();

        let second = Repository::open(RepositorySettings::new(conn, "db")).unwrap();
        assert!(second.collection_exists("cards").await.unwrap());
    }

    #[test]
    fn test_closed_sled_stores_leave_the_registry() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");

        let store = open_sled(first.clone()).unwrap();
        drop(store);
        let _open = open_sled(second.clone()).unwrap();

        let stores = SLED_STORES.get_or_init(DashMap::new);
        assert!(!stores.contains_key(&first));
        assert!(stores.contains_key(&second));
    }
}
