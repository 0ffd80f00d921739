//! Predicate Builder - Core builder implementation
//!
//! Conditions, ordering and paging collected by a query filter. Clause
//! templates stay unresolved here; aliases and column names are substituted
//! when the query is rendered against the schema.

use super::types::*;

/// A leaf condition: a clause template and its positional arguments
///
/// Column references in the template may be bare (`name`), rooted
/// (`this.name`) or qualified by a join alias or association path
/// (`g.name`, `group.name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    clause: String,
    args: Vec<String>,
}

impl Predicate {
    pub fn new(clause: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            clause: clause.into(),
            args,
        }
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// A group of conditions combined with AND or OR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub kind: JunctionKind,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Predicate(Predicate),
    Junction(Junction),
}

/// Conditions, ordering and paging for one query
#[derive(Debug, Clone, Default)]
pub struct PredicateBuilder {
    pub(crate) conditions: Vec<Condition>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) page_size: Option<u64>,
    pub(crate) page: u64,
}

impl PredicateBuilder {
    /// Create a new predicate builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level conditions, combined with AND
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub(crate) fn push(&mut self, predicate: Predicate) -> &mut Self {
        self.conditions.push(Condition::Predicate(predicate));
        self
    }

    fn group<F>(&mut self, kind: JunctionKind, build: F) -> &mut Self
    where
        F: FnOnce(&mut PredicateBuilder),
    {
        let mut nested = PredicateBuilder::new();
        build(&mut nested);
        if !nested.conditions.is_empty() {
            self.conditions.push(Condition::Junction(Junction {
                kind,
                conditions: nested.conditions,
            }));
        }
        self
    }

    /// Parenthesized group whose members are combined with AND
    pub fn and<F>(&mut self, build: F) -> &mut Self
    where
        F: FnOnce(&mut PredicateBuilder),
    {
        self.group(JunctionKind::And, build)
    }

    /// Parenthesized group whose members are combined with OR
    pub fn or<F>(&mut self, build: F) -> &mut Self
    where
        F: FnOnce(&mut PredicateBuilder),
    {
        self.group(JunctionKind::Or, build)
    }
}
