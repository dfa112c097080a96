use crate::types::ID_FIELD;
use serde::{Deserialize, Serialize};

/// Name a typed record gives its id before it is lifted into the store key.
const TYPED_ID_FIELD: &str = "Id";

/// How a record type names its fields on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaKind {
    /// Loosely-typed documents: `quickSearchValue`.
    Dynamic,
    /// Strongly-typed records: `QuickSearchValue`.
    Typed,
}

impl SchemaKind {
    /// Applies a repository-wide override, if one is configured.
    pub fn resolve(self, forced: Option<SchemaKind>) -> SchemaKind {
        forced.unwrap_or(self)
    }
}

/// Maps a logical field name onto the casing used by `kind`. Only the first
/// character changes; blank input comes back untouched.
pub fn normalize(field: &str, kind: SchemaKind) -> String {
    if field.trim().is_empty() {
        return field.to_string();
    }
    let mut chars = field.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut out = String::with_capacity(field.len());
    match kind {
        SchemaKind::Dynamic => out.extend(first.to_lowercase()),
        SchemaKind::Typed => out.extend(first.to_uppercase()),
    }
    out.push_str(chars.as_str());
    out
}

/// Like [`normalize`], for field names used in queries and sorts. A typed
/// record's `Id` lives in the store key, so it resolves to `_id`.
pub fn query_field(field: &str, kind: SchemaKind) -> String {
    let normalized = normalize(field.trim(), kind);
    if kind == SchemaKind::Typed && normalized == TYPED_ID_FIELD {
        return ID_FIELD.to_string();
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_letter_only() {
        assert_eq!(normalize("quickSearchValue", SchemaKind::Typed), "QuickSearchValue");
        assert_eq!(normalize("QuickSearchValue", SchemaKind::Dynamic), "quickSearchValue");
        assert_eq!(normalize("cREATEDBY", SchemaKind::Dynamic), "cREATEDBY");
        assert_eq!(normalize("x", SchemaKind::Typed), "X");
    }

    #[test]
    fn test_blank_input_is_returned_as_is() {
        assert_eq!(normalize("", SchemaKind::Typed), "");
        assert_eq!(normalize("  ", SchemaKind::Dynamic), "  ");
    }

    #[test]
    fn test_override_wins() {
        assert_eq!(SchemaKind::Typed.resolve(None), SchemaKind::Typed);
        assert_eq!(
            SchemaKind::Typed.resolve(Some(SchemaKind::Dynamic)),
            SchemaKind::Dynamic
        );
    }

    #[test]
    fn test_typed_id_queries_the_store_key() {
        assert_eq!(query_field("id", SchemaKind::Typed), "_id");
        assert_eq!(query_field("Id", SchemaKind::Typed), "_id");
        assert_eq!(query_field("id", SchemaKind::Dynamic), "id");
        assert_eq!(query_field("_id", SchemaKind::Dynamic), "_id");
        assert_eq!(query_field("idle", SchemaKind::Typed), "Idle");
    }
}
