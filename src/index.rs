use crate::naming::{SchemaKind, normalize};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub direction: IndexDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub collection: String,
    pub keys: Vec<IndexKey>,
    /// Built without blocking writers.
    pub background: bool,
}

impl IndexDefinition {
    pub fn new(collection: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            keys: Vec::new(),
            background: true,
        }
    }

    pub fn key(mut self, field: impl Into<String>, direction: IndexDirection) -> Self {
        self.keys.push(IndexKey {
            field: field.into(),
            direction,
        });
        self
    }

    /// Key document in the `{ field: 1 | -1 }` form.
    pub fn key_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for key in &self.keys {
            let dir = match key.direction {
                IndexDirection::Ascending => 1,
                IndexDirection::Descending => -1,
            };
            map.insert(key.field.clone(), json!(dir));
        }
        serde_json::Value::Object(map)
    }
}

/// A field's membership in a named index. Fields declaring the same index
/// name are grouped into one compound index ordered by `column_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedField {
    pub index_name: String,
    pub field: String,
    pub column_index: i32,
    pub direction: IndexDirection,
}

impl IndexedField {
    pub fn new(index_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            field: field.into(),
            column_index: 0,
            direction: IndexDirection::Ascending,
        }
    }

    pub fn column(mut self, column_index: i32) -> Self {
        self.column_index = column_index;
        self
    }

    pub fn descending(mut self) -> Self {
        self.direction = IndexDirection::Descending;
        self
    }
}

/// Groups field declarations into index definitions for `collection`.
/// Fields with equal column indexes keep their declaration order.
pub fn build_definitions(
    collection: &str,
    fields: &[IndexedField],
    kind: SchemaKind,
) -> Vec<IndexDefinition> {
    let mut grouped: BTreeMap<&str, Vec<&IndexedField>> = BTreeMap::new();
    for field in fields {
        grouped.entry(field.index_name.as_str()).or_default().push(field);
    }

    grouped
        .into_iter()
        .map(|(name, mut members)| {
            members.sort_by_key(|f| f.column_index);
            members.into_iter().fold(
                IndexDefinition::new(collection, name),
                |definition, member| {
                    definition.key(normalize(&member.field, kind), member.direction)
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_group_by_index_name() {
        let fields = vec![
            IndexedField::new("by_client", "createdDate").column(1).descending(),
            IndexedField::new("by_name", "name"),
            IndexedField::new("by_client", "clientId").column(0),
        ];
        let defs = build_definitions("cards", &fields, SchemaKind::Typed);
        assert_eq!(defs.len(), 2);

        let by_client = &defs[0];
        assert_eq!(by_client.name, "by_client");
        assert!(by_client.background);
        assert_eq!(
            by_client.key_json(),
            json!({ "ClientId": 1, "CreatedDate": -1 })
        );
        assert_eq!(by_client.keys[0].field, "ClientId");
        assert_eq!(by_client.keys[1].field, "CreatedDate");

        assert_eq!(defs[1].keys, vec![IndexKey {
            field: "Name".into(),
            direction: IndexDirection::Ascending
        }]);
    }

    #[test]
    fn test_no_fields_no_indexes() {
        assert!(build_definitions("cards", &[], SchemaKind::Dynamic).is_empty());
    }
}
