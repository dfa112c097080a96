use crate::naming::{SchemaKind, query_field};
use crate::types::{Document, Value};
use serde_json::json;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Multi-key ordering; earlier keys take priority.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(mut self, field: impl Into<String>) -> Self {
        self.keys.push(SortKey {
            field: field.into(),
            direction: SortDirection::Asc,
        });
        self
    }

    pub fn descending(mut self, field: impl Into<String>) -> Self {
        self.keys.push(SortKey {
            field: field.into(),
            direction: SortDirection::Desc,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.keys {
            let left = a.get_path(&key.field).unwrap_or(Value::Null);
            let right = b.get_path(&key.field).unwrap_or(Value::Null);
            let ord = match key.direction {
                SortDirection::Asc => left.cmp(&right),
                SortDirection::Desc => right.cmp(&left),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub fn to_sort_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for key in &self.keys {
            let dir = match key.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            map.insert(key.field.clone(), json!(dir));
        }
        serde_json::Value::Object(map)
    }
}

/// Compiles `name desc,createdDate` into a sort spec. Returns `None` for blank
/// input so callers fall back to natural order.
pub fn compile_sort(sort: &str, kind: SchemaKind) -> Option<SortSpec> {
    if sort.trim().is_empty() {
        return None;
    }
    let mut spec = SortSpec::new();
    for clause in sort.split(',') {
        let mut parts = clause.split_whitespace();
        let Some(field) = parts.next() else {
            continue;
        };
        let field = query_field(field, kind);
        spec = match parts.next() {
            Some(dir) if dir.eq_ignore_ascii_case("desc") => spec.descending(field),
            _ => spec.ascending(field),
        };
    }
    (!spec.is_empty()).then_some(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_key_priority() {
        let spec = compile_sort("a desc,b", SchemaKind::Dynamic).unwrap();
        assert_eq!(spec, SortSpec::new().descending("a").ascending("b"));

        let mut docs = vec![
            Document::with_id("1").field("a", 1).field("b", 2),
            Document::with_id("2").field("a", 2).field("b", 9),
            Document::with_id("3").field("a", 1).field("b", 1),
        ];
        docs.sort_by(|x, y| spec.compare(x, y));
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_direction_defaults_to_ascending() {
        let spec = compile_sort("name, createdDate DESC ,rank sideways", SchemaKind::Typed).unwrap();
        assert_eq!(
            spec,
            SortSpec::new()
                .ascending("Name")
                .descending("CreatedDate")
                .ascending("Rank")
        );
    }

    #[test]
    fn test_typed_id_sorts_by_store_key() {
        let spec = compile_sort("id desc", SchemaKind::Typed).unwrap();
        assert_eq!(spec, SortSpec::new().descending("_id"));
    }

    #[test]
    fn test_blank_sort_is_none() {
        assert_eq!(compile_sort("", SchemaKind::Typed), None);
        assert_eq!(compile_sort("  ", SchemaKind::Typed), None);
        assert_eq!(compile_sort(" , ", SchemaKind::Typed), None);
    }

    #[test]
    fn test_missing_fields_sort_first() {
        let spec = SortSpec::new().ascending("rank");
        let with = Document::with_id("x").field("rank", 1);
        let without = Document::with_id("y");
        assert_eq!(spec.compare(&without, &with), Ordering::Less);
    }
}
