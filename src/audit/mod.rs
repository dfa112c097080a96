//! Audit trails: which mutations are audited, how snapshots are kept, and the
//! audit fields stamped onto records before they are written.

pub mod policy;
pub mod trail;

pub use policy::{AuditPolicy, resolve_cap_size, should_audit};
pub use trail::{AUDIT_ITEMS_FIELD, AuditTrail};

use crate::error::{Result, ScribeError};
use crate::id::ObjectId;
use crate::models::{BaseModel, Record};
use crate::types::{Document, Value};
use chrono::{DateTime, Utc};

/// Every retained snapshot of one entity, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditContainer<T> {
    pub id: String,
    pub audit_items: Vec<T>,
}

impl<T: Record> AuditContainer<T> {
    pub fn from_document(doc: Document) -> Result<Self> {
        let items = match doc.data.get(AUDIT_ITEMS_FIELD) {
            Some(Value::Array(items)) => items.clone(),
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(ScribeError::SerializationError(format!(
                    "audit container {} has a non-array trail: {}",
                    doc.id, other
                )));
            }
        };
        let audit_items = items
            .into_iter()
            .map(|item| T::from_document(Document::from_value(item)?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: doc.id,
            audit_items,
        })
    }
}

/// Stamps the audit fields ahead of a write and reports whether the record is
/// new. A missing id is generated; creation fields are set when the record
/// is new or was never stamped; update fields are always set.
pub fn stamp_audit_fields(base: &mut BaseModel, user: &str, now: DateTime<Utc>) -> bool {
    let mut is_new = false;
    if base.id.is_none() {
        base.id = Some(ObjectId::new());
        is_new = true;
    }
    if is_new || base.created_date.is_none() {
        base.created_by = Some(user.to_string());
        base.created_date = Some(now);
        is_new = true;
    }
    base.updated_by = Some(user.to_string());
    base.updated_date = Some(now);
    is_new
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_first_stamp_creates() {
        let mut base = BaseModel::default();
        let now = Utc::now();
        assert!(stamp_audit_fields(&mut base, "alice", now));
        assert!(base.id.is_some());
        assert_eq!(base.created_by.as_deref(), Some("alice"));
        assert_eq!(base.created_date, Some(now));
        assert_eq!(base.updated_date, Some(now));
    }

    #[test]
    fn test_later_stamps_only_touch_updated_fields() {
        let mut base = BaseModel::default();
        let created = Utc::now();
        stamp_audit_fields(&mut base, "alice", created);
        let id = base.id;

        let later = created + Duration::seconds(5);
        assert!(!stamp_audit_fields(&mut base, "bob", later));
        assert_eq!(base.id, id);
        assert_eq!(base.created_by.as_deref(), Some("alice"));
        assert_eq!(base.created_date, Some(created));
        assert_eq!(base.updated_by.as_deref(), Some("bob"));
        assert_eq!(base.updated_date, Some(later));
    }

    #[test]
    fn test_id_without_creation_date_counts_as_new() {
        let mut base = BaseModel {
            id: Some(ObjectId::new()),
            ..BaseModel::default()
        };
        assert!(stamp_audit_fields(&mut base, "alice", Utc::now()));
        assert!(base.created_date.is_some());
    }

    #[test]
    fn test_container_decodes_snapshots() {
        let doc = Document::with_id("x").field(
            AUDIT_ITEMS_FIELD,
            vec![
                Document::with_id("x").field("n", 1).into_value(),
                Document::with_id("x").field("n", 2).into_value(),
            ],
        );
        let container: AuditContainer<Document> = AuditContainer::from_document(doc).unwrap();
        assert_eq!(container.audit_items.len(), 2);
        assert_eq!(container.audit_items[1].get_path("n"), Some(Value::Int(2)));
        assert_eq!(container.audit_items[0].id, "x");
    }
}
