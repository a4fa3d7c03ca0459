//! Condition matching for find, search, edit, and delete.
//!
//! A condition set maps field names to either a literal (exact match) or
//! operator conditions parsed from `$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
//! `$lte`, `$in`, `$nin` objects. A document matches when every condition
//! matches. Unknown operator keys are rejected at parse time rather than
//! silently matching nothing — a typo in `$gte` should not read as
//! "no rows matched".

use crate::error::{Result, StoreError};
use crate::types::{Document, Value};
use regex::RegexBuilder;
use std::cmp::Ordering;

/// One condition against a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Structural equality with the literal value.
    Literal(Value),
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
}

impl Condition {
    /// Evaluate against the field's value (`None` when the field is absent).
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Condition::Literal(expected) | Condition::Eq(expected) => {
                field.is_some_and(|v| values_equal(v, expected))
            }
            Condition::Ne(expected) => !field.is_some_and(|v| values_equal(v, expected)),
            Condition::Gt(bound) => compare(field, bound).is_some_and(|o| o == Ordering::Greater),
            Condition::Gte(bound) => compare(field, bound).is_some_and(|o| o != Ordering::Less),
            Condition::Lt(bound) => compare(field, bound).is_some_and(|o| o == Ordering::Less),
            Condition::Lte(bound) => compare(field, bound).is_some_and(|o| o != Ordering::Greater),
            Condition::In(set) => {
                field.is_some_and(|v| set.iter().any(|item| values_equal(v, item)))
            }
            Condition::Nin(set) => {
                !field.is_some_and(|v| set.iter().any(|item| values_equal(v, item)))
            }
        }
    }

    fn from_operator(op: &str, operand: &Value) -> Result<Condition> {
        match op {
            "$eq" => Ok(Condition::Eq(operand.clone())),
            "$ne" => Ok(Condition::Ne(operand.clone())),
            "$gt" => Ok(Condition::Gt(operand.clone())),
            "$gte" => Ok(Condition::Gte(operand.clone())),
            "$lt" => Ok(Condition::Lt(operand.clone())),
            "$lte" => Ok(Condition::Lte(operand.clone())),
            "$in" | "$nin" => {
                let Value::Array(items) = operand else {
                    return Err(StoreError::Validation(format!(
                        "{} requires an array operand",
                        op
                    )));
                };
                if op == "$in" {
                    Ok(Condition::In(items.clone()))
                } else {
                    Ok(Condition::Nin(items.clone()))
                }
            }
            other => Err(StoreError::Validation(format!(
                "unknown query operator '{}'",
                other
            ))),
        }
    }
}

/// Equality with numeric tolerance: `Int` and `Float` holding the same
/// number compare equal, everything else is structural.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => *i as f64 == *f,
        _ => a == b,
    }
}

/// Ordering for range operators. Only values of comparable kinds order;
/// an absent field or a cross-type comparison never matches.
fn compare(field: Option<&Value>, bound: &Value) -> Option<Ordering> {
    let field = field?;
    match (field, bound) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// An AND-combined set of field conditions.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    items: Vec<(String, Condition)>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: add one condition for a field.
    pub fn field(mut self, name: impl Into<String>, condition: Condition) -> Self {
        self.items.push((name.into(), condition));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse conditions from an object value. Object operands whose keys
    /// start with `$` are operator sets; all other objects are literals.
    pub fn from_value(value: &Value) -> Result<Conditions> {
        let Value::Object(map) = value else {
            return Err(StoreError::Validation(
                "conditions must be an object".to_string(),
            ));
        };
        let mut items = Vec::new();
        for (field, operand) in map {
            match operand {
                Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    for (op, op_value) in ops {
                        if !op.starts_with('$') {
                            return Err(StoreError::Validation(format!(
                                "cannot mix operator and literal keys in condition for '{}'",
                                field
                            )));
                        }
                        items.push((field.clone(), Condition::from_operator(op, op_value)?));
                    }
                }
                literal => items.push((field.clone(), Condition::Literal(literal.clone()))),
            }
        }
        Ok(Conditions { items })
    }

    /// Parse conditions from a document of field/condition pairs.
    pub fn from_document(document: &Document) -> Result<Conditions> {
        Self::from_value(&Value::Object(document.0.clone()))
    }

    /// A document matches when every condition matches (logical AND).
    pub fn matches(&self, document: &Document) -> bool {
        self.items
            .iter()
            .all(|(field, condition)| condition.matches(document.get(field)))
    }
}

/// One search term against a single field.
#[derive(Debug, Clone)]
pub enum SearchTerm {
    /// Case-insensitive substring containment (the needle is stored
    /// pre-lowercased).
    Contains(String),
    Regex(regex::Regex),
}

impl SearchTerm {
    /// Compile a regex term from a pattern and `$options`-style flags.
    pub fn regex(pattern: &str, flags: &str) -> Result<SearchTerm> {
        let mut builder = RegexBuilder::new(pattern);
        builder
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'));
        let compiled = builder
            .build()
            .map_err(|e| StoreError::Validation(format!("invalid search pattern: {}", e)))?;
        Ok(SearchTerm::Regex(compiled))
    }

    fn matches(&self, field: &Value) -> bool {
        let text = field.render_text();
        match self {
            SearchTerm::Contains(needle) => text.to_lowercase().contains(needle),
            SearchTerm::Regex(re) => re.is_match(&text),
        }
    }
}

/// Field search terms, AND-combined. Absent or null fields never match.
#[derive(Debug, Clone, Default)]
pub struct SearchConditions {
    items: Vec<(String, SearchTerm)>,
}

impl SearchConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, term: SearchTerm) -> Self {
        self.items.push((name.into(), term));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse search conditions: plain values become substring terms,
    /// `{"$regex": pattern, "$options": flags}` objects become regex terms
    /// (flags default to case-insensitive).
    pub fn from_value(value: &Value) -> Result<SearchConditions> {
        let Value::Object(map) = value else {
            return Err(StoreError::Validation(
                "search conditions must be an object".to_string(),
            ));
        };
        let mut items = Vec::new();
        for (field, operand) in map {
            let term = match operand {
                Value::Object(ops) if ops.contains_key("$regex") => {
                    for key in ops.keys() {
                        if key != "$regex" && key != "$options" {
                            return Err(StoreError::Validation(format!(
                                "unknown search option '{}'",
                                key
                            )));
                        }
                    }
                    let pattern = ops
                        .get("$regex")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            StoreError::Validation("$regex requires a string pattern".to_string())
                        })?;
                    let flags = ops
                        .get("$options")
                        .and_then(Value::as_str)
                        .unwrap_or("i");
                    SearchTerm::regex(pattern, flags)?
                }
                other => SearchTerm::Contains(other.render_text().to_lowercase()),
            };
            items.push((field.clone(), term));
        }
        Ok(SearchConditions { items })
    }

    pub fn from_document(document: &Document) -> Result<SearchConditions> {
        Self::from_value(&Value::Object(document.0.clone()))
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.items.iter().all(|(field, term)| {
            match document.get(field) {
                None | Some(Value::Null) => false,
                Some(value) => term.matches(value),
            }
        })
    }
}
