//! Record capabilities and the base fields shared by audited entities.
//!
//! A [`Record`] knows how to become a [`Document`] and back, and which field
//! casing it uses on the wire. An [`Entity`] is a record carrying a
//! [`BaseModel`], which is what the data manager scopes, stamps and audits.

use crate::error::{Result, ScribeError};
use crate::id::ObjectId;
use crate::index::IndexedField;
use crate::naming::SchemaKind;
use crate::storage::Update;
use crate::types::{Document, ID_FIELD, Value};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Field holding the id inside a serialized typed record.
const RECORD_ID_FIELD: &str = "Id";

pub trait Record: Sized + Send + Sync + 'static {
    const SCHEMA: SchemaKind = SchemaKind::Typed;

    fn to_document(&self) -> Result<Document>;

    fn from_document(doc: Document) -> Result<Self>;
}

impl Record for Document {
    const SCHEMA: SchemaKind = SchemaKind::Dynamic;

    fn to_document(&self) -> Result<Document> {
        Ok(self.clone())
    }

    fn from_document(doc: Document) -> Result<Self> {
        Ok(doc)
    }
}

/// Serializes a typed record, lifting its `Id` field into the document id.
pub fn typed_to_document<T: Serialize>(record: &T) -> Result<Document> {
    let mut doc = Document::from_serde(String::new(), record)?;
    match doc.data.remove(RECORD_ID_FIELD) {
        Some(Value::String(id)) => {
            doc.id = id;
            Ok(doc)
        }
        _ => Err(ScribeError::InvalidOperation(
            "record has no id; stamp it before storing".into(),
        )),
    }
}

/// Inverse of [`typed_to_document`].
pub fn typed_from_document<T: DeserializeOwned>(mut doc: Document) -> Result<T> {
    let id = std::mem::take(&mut doc.id);
    doc.data.insert(RECORD_ID_FIELD.to_string(), Value::String(id));
    doc.into_serde()
}

/// Audit, scoping and search fields every entity carries.
///
/// The id is read through [`BaseModel::id`] and assigned only through
/// [`BaseModel::set_id`]:
///
/// ```compile_fail
/// let mut base = scribe_db::BaseModel::default();
/// base.id = Some(scribe_db::ObjectId::new());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaseModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<ObjectId>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub quick_search_value: String,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub updated_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: i64,
}

impl BaseModel {
    /// Assigns the id from its text form. Malformed ids are rejected, and an
    /// id can not be changed once set.
    pub fn set_id(&mut self, id: &str) -> Result<()> {
        let id = ObjectId::parse(id)?;
        match self.id {
            Some(existing) if existing != id => Err(ScribeError::InvalidOperation(format!(
                "id {} is already assigned",
                existing
            ))),
            _ => {
                self.id = Some(id);
                Ok(())
            }
        }
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn id_string(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }
}

pub trait Entity: Record + Clone {
    fn base(&self) -> &BaseModel;

    fn base_mut(&mut self) -> &mut BaseModel;

    /// Index declarations for the entity's collection.
    fn index_fields() -> Vec<IndexedField> {
        Vec::new()
    }
}

/// A partial update addressed by id. The default update only restates the id;
/// patches override [`Patch::build_update`] to set the fields they carry,
/// cased with `kind`.
pub trait Patch: Send + Sync {
    fn id(&self) -> &ObjectId;

    fn build_update(&self, _kind: SchemaKind) -> Update {
        Update::new().set(ID_FIELD, self.id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Card {
        #[serde(flatten)]
        base: BaseModel,
        name: String,
    }

    #[test]
    fn test_typed_records_lift_their_id() {
        let mut card = Card {
            base: BaseModel::default(),
            name: "Visa".into(),
        };
        assert!(typed_to_document(&card).is_err());

        card.base.set_id("5f1a2b3c4d5e6f7a8b9c0d1e").unwrap();
        let doc = typed_to_document(&card).unwrap();
        assert_eq!(doc.id, "5f1a2b3c4d5e6f7a8b9c0d1e");
        assert!(!doc.data.contains_key("Id"));
        assert_eq!(doc.get_path("Name"), Some(Value::from("Visa")));
        assert_eq!(doc.get_path("Deleted"), Some(Value::Bool(false)));

        let back: Card = typed_from_document(doc).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn test_ids_are_validated_and_fixed() {
        let mut base = BaseModel::default();
        assert!(matches!(base.set_id("not-an-id"), Err(ScribeError::InvalidId(_))));
        base.set_id("5f1a2b3c4d5e6f7a8b9c0d1e").unwrap();
        base.set_id("5f1a2b3c4d5e6f7a8b9c0d1e").unwrap();
        assert!(base.set_id("5f1a2b3c4d5e6f7a8b9c0d1f").is_err());
        assert_eq!(
            base.id(),
            Some(ObjectId::parse("5f1a2b3c4d5e6f7a8b9c0d1e").unwrap())
        );
    }

    struct Rename(ObjectId);

    impl Patch for Rename {
        fn id(&self) -> &ObjectId {
            &self.0
        }
    }

    #[test]
    fn test_default_patch_sets_only_the_id() {
        let id = ObjectId::new();
        let update = Rename(id).build_update(SchemaKind::Typed);
        assert_eq!(update, Update::new().set("_id", id.to_string()));
    }
}
