//! Store-native query expressions.
//!
//! The string DSL compilers in [`filter`] and [`sort`] emit [`Predicate`] and
//! [`SortSpec`] values. Stores execute them directly through [`Queryable`], and
//! [`Predicate::to_filter_json`] renders the Mongo-style filter document used
//! when commands are logged.

pub mod filter;
pub mod sort;

pub use filter::{FilterOperator, FilterToken, compile_filter, parse_filter};
pub use sort::{SortDirection, SortKey, SortSpec, compile_sort};

use crate::error::Result;
use crate::types::{Document, Value};
use regex::{Regex, RegexBuilder};
use serde_json::json;
use std::cmp::Ordering;
use std::fmt;

pub trait Queryable {
    fn matches(&self, doc: &Document) -> bool;
}

impl<F> Queryable for F
where
    F: Fn(&Document) -> bool,
{
    fn matches(&self, doc: &Document) -> bool {
        self(doc)
    }
}

/// A case-insensitive regular expression that remembers its source text.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn case_insensitive(source: &str) -> Result<Self> {
        let regex = RegexBuilder::new(source).case_insensitive(true).build()?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/i", self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every document.
    All,
    Eq { field: String, value: Value },
    Lt { field: String, value: Value },
    Gt { field: String, value: Value },
    Regex { field: String, pattern: Pattern },
    In { field: String, values: Vec<Value> },
    And(Vec<Predicate>),
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::All
    }
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn regex(field: impl Into<String>, pattern: Pattern) -> Self {
        Predicate::Regex {
            field: field.into(),
            pattern,
        }
    }

    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::In {
            field: field.into(),
            values,
        }
    }

    /// Conjunction that flattens nested `And`s and drops `All`.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (p, Predicate::And(right)) => {
                let mut nodes = Vec::with_capacity(right.len() + 1);
                nodes.push(p);
                nodes.extend(right);
                Predicate::And(nodes)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Predicate::All)
    }

    /// Mongo-style filter document, for logs and diagnostics.
    pub fn to_filter_json(&self) -> serde_json::Value {
        match self {
            Predicate::All => json!({}),
            Predicate::Eq { field, value } => json!({ field: serde_json::Value::from(value.clone()) }),
            Predicate::Lt { field, value } => {
                json!({ field: { "$lt": serde_json::Value::from(value.clone()) } })
            }
            Predicate::Gt { field, value } => {
                json!({ field: { "$gt": serde_json::Value::from(value.clone()) } })
            }
            Predicate::Regex { field, pattern } => {
                json!({ field: { "$regex": pattern.as_str(), "$options": "i" } })
            }
            Predicate::In { field, values } => {
                let values: Vec<serde_json::Value> =
                    values.iter().cloned().map(serde_json::Value::from).collect();
                json!({ field: { "$in": values } })
            }
            Predicate::And(nodes) => {
                let nodes: Vec<serde_json::Value> =
                    nodes.iter().map(Predicate::to_filter_json).collect();
                json!({ "$and": nodes })
            }
        }
    }
}

impl Queryable for Predicate {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq { field, value } => match doc.get_path(field) {
                Some(actual) => any_element(&actual, value, |a, v| {
                    compare_loose(a, v) == Some(Ordering::Equal)
                }),
                None => value.is_null(),
            },
            Predicate::Lt { field, value } => doc.get_path(field).is_some_and(|actual| {
                any_element(&actual, value, |a, v| compare_loose(a, v) == Some(Ordering::Less))
            }),
            Predicate::Gt { field, value } => doc.get_path(field).is_some_and(|actual| {
                any_element(&actual, value, |a, v| {
                    compare_loose(a, v) == Some(Ordering::Greater)
                })
            }),
            Predicate::Regex { field, pattern } => match doc.get_path(field) {
                Some(Value::String(s)) => pattern.is_match(&s),
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| item.as_str().is_some_and(|s| pattern.is_match(s))),
                _ => false,
            },
            Predicate::In { field, values } => {
                let actual = doc.get_path(field).unwrap_or(Value::Null);
                values.iter().any(|value| {
                    any_element(&actual, value, |a, v| {
                        compare_loose(a, v) == Some(Ordering::Equal)
                    })
                })
            }
            Predicate::And(nodes) => nodes.iter().all(|node| node.matches(doc)),
        }
    }
}

// Array fields match when any element does, unless the operand is an array too
fn any_element(actual: &Value, operand: &Value, test: impl Fn(&Value, &Value) -> bool) -> bool {
    match (actual, operand) {
        (Value::Array(items), operand) if !matches!(operand, Value::Array(_)) => {
            items.iter().any(|item| test(item, operand))
        }
        _ => test(actual, operand),
    }
}

/// Compares a stored value with an operand. String operands produced by the
/// filter DSL are coerced to the stored value's type first; values of
/// unrelated types are not comparable.
pub fn compare_loose(actual: &Value, operand: &Value) -> Option<Ordering> {
    let coerced = match (actual, operand) {
        (Value::Bool(_), Value::String(s)) => parse_bool(s).map(Value::Bool),
        (Value::Int(_) | Value::Float(_), Value::String(s)) => parse_number(s),
        (Value::Null, Value::String(s)) if s.eq_ignore_ascii_case("null") => Some(Value::Null),
        _ => Some(operand.clone()),
    }?;

    let comparable = matches!(
        (actual, &coerced),
        (Value::Null, Value::Null)
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_))
            | (Value::String(_), Value::String(_))
            | (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_))
    );
    comparable.then(|| actual.cmp(&coerced))
}

fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    s.parse::<i64>()
        .map(Value::Int)
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(Value::Float))
}
