//! The comma separated filter DSL.
//!
//! ```text
//! name:contains:Visa,limit:gt:1000,allowChildren:true
//! ```
//!
//! Each clause is `field:value` (equality) or `field:op:value` with `op` one of
//! `eq`, `lt`, `gt`, `regex` or `contains`. Clauses that do not fit the grammar
//! are dropped without error, so a bad clause widens the result set instead of
//! failing the search.

use super::{Pattern, Predicate};
use crate::naming::{SchemaKind, query_field};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Lt,
    Gt,
    /// Case-insensitive regular expression; `contains` is an alias.
    Regex,
}

impl FilterOperator {
    pub fn parse(op: &str) -> Option<Self> {
        match op.to_ascii_lowercase().as_str() {
            "eq" => Some(FilterOperator::Eq),
            "lt" => Some(FilterOperator::Lt),
            "gt" => Some(FilterOperator::Gt),
            "regex" | "contains" => Some(FilterOperator::Regex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterToken {
    pub field: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl FilterToken {
    fn parse(clause: &str) -> Option<Self> {
        let parts: Vec<&str> = clause.trim().split(':').collect();
        match parts.as_slice() {
            [field, value] => Some(Self {
                field: field.to_string(),
                operator: FilterOperator::Eq,
                value: value.to_string(),
            }),
            [field, op, value] => FilterOperator::parse(op).map(|operator| Self {
                field: field.to_string(),
                operator,
                value: value.to_string(),
            }),
            _ => None,
        }
    }

    /// Builds the predicate for this clause, or `None` when the clause cannot
    /// be expressed (an uncompilable regex).
    pub fn to_predicate(&self, kind: SchemaKind) -> Option<Predicate> {
        let field = query_field(&self.field, kind);
        let predicate = match self.operator {
            FilterOperator::Eq => Predicate::eq(field, self.value.as_str()),
            FilterOperator::Lt => Predicate::lt(field, self.value.as_str()),
            FilterOperator::Gt => Predicate::gt(field, self.value.as_str()),
            FilterOperator::Regex => match Pattern::case_insensitive(&self.value) {
                Ok(pattern) => Predicate::regex(field, pattern),
                Err(e) => {
                    warn!(
                        field = %self.field,
                        pattern = %self.value,
                        error = %e,
                        "dropping filter clause with invalid pattern"
                    );
                    return None;
                }
            },
        };
        Some(predicate)
    }
}

/// Splits a filter string into tokens, skipping clauses outside the grammar.
pub fn parse_filter(filter: &str) -> Vec<FilterToken> {
    filter
        .split(',')
        .filter_map(|clause| {
            let token = FilterToken::parse(clause);
            if token.is_none() && !clause.trim().is_empty() {
                trace!(clause, "ignoring unrecognised filter clause");
            }
            token
        })
        .collect()
}

/// Compiles `filter` and ANDs every clause onto `base`. A blank filter returns
/// `base` unchanged.
pub fn compile_filter(filter: &str, base: Predicate, kind: SchemaKind) -> Predicate {
    if filter.trim().is_empty() {
        return base;
    }
    parse_filter(filter)
        .iter()
        .filter_map(|token| token.to_predicate(kind))
        .fold(base, Predicate::and)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Queryable;
    use crate::types::Document;

    #[test]
    fn test_two_and_three_part_clauses() {
        let tokens = parse_filter("name:Visa, limit:gt:10 ,status:EQ:open");
        assert_eq!(
            tokens,
            vec![
                FilterToken {
                    field: "name".into(),
                    operator: FilterOperator::Eq,
                    value: "Visa".into()
                },
                FilterToken {
                    field: "limit".into(),
                    operator: FilterOperator::Gt,
                    value: "10".into()
                },
                FilterToken {
                    field: "status".into(),
                    operator: FilterOperator::Eq,
                    value: "open".into()
                },
            ]
        );
    }

    #[test]
    fn test_unknown_operator_and_bad_shapes_are_dropped() {
        assert!(parse_filter("field:foo:bar").is_empty());
        assert!(parse_filter("field").is_empty());
        assert!(parse_filter("url:eq:http://example.com").is_empty());
        assert!(parse_filter(",,").is_empty());
    }

    #[test]
    fn test_compile_normalizes_and_ands_onto_base() {
        let base = Predicate::eq("Deleted", false);
        let compiled = compile_filter("name:contains:visa,limit:lt:5", base, SchemaKind::Typed);
        match compiled {
            Predicate::And(nodes) => {
                assert_eq!(nodes.len(), 3);
                assert_eq!(nodes[0], Predicate::eq("Deleted", false));
                assert!(matches!(&nodes[1], Predicate::Regex { field, .. } if field == "Name"));
                assert_eq!(nodes[2], Predicate::lt("Limit", "5"));
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_filter_returns_base() {
        let base = Predicate::eq("archived", false);
        assert_eq!(compile_filter("   ", base.clone(), SchemaKind::Dynamic), base);
        assert_eq!(compile_filter("", Predicate::All, SchemaKind::Dynamic), Predicate::All);
    }

    #[test]
    fn test_invalid_regex_clause_is_dropped() {
        let compiled = compile_filter("name:regex:([a-z", Predicate::All, SchemaKind::Dynamic);
        assert_eq!(compiled, Predicate::All);
    }

    #[test]
    fn test_typed_id_clause_targets_the_store_key() {
        let doc = Document::with_id("5f1a2b3c4d5e6f7a8b9c0d1e").field("Name", "Visa");
        let p = compile_filter("id:5f1a2b3c4d5e6f7a8b9c0d1e", Predicate::All, SchemaKind::Typed);
        assert_eq!(p, Predicate::eq("_id", "5f1a2b3c4d5e6f7a8b9c0d1e"));
        assert!(p.matches(&doc));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let doc = Document::new().field("name", "VISA platinum");
        let p = compile_filter("name:contains:visa", Predicate::All, SchemaKind::Dynamic);
        assert!(p.matches(&doc));
    }
}
