pub mod audit;
pub mod config;
pub mod error;
pub mod id;
pub mod index;
pub mod manager;
pub mod models;
pub mod naming;
pub mod query;
pub mod repository;
pub mod search;
pub mod storage;
pub mod types;

pub use audit::{AuditContainer, AuditPolicy, AuditTrail};
pub use config::{ManagerConfig, RepositorySettings};
pub use error::{Result, ScribeError};
pub use id::ObjectId;
pub use manager::DataManager;
pub use models::{BaseModel, Entity, Patch, Record};
pub use naming::SchemaKind;
pub use query::{Predicate, SortSpec};
pub use repository::Repository;
pub use search::{SearchRequest, SearchResult};
pub use storage::{DocumentStore, MemoryStore, SledStore, Update};
pub use types::{Document, Value};
