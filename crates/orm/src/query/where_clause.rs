//! Predicate Builder WHERE clause operations

use super::builder::{Predicate, PredicateBuilder};
use crate::backends::DatabaseValue;

fn arg<T: Into<DatabaseValue>>(value: T) -> String {
    value.into().to_arg()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl PredicateBuilder {
    /// Add condition with equality
    pub fn eq<T: Into<DatabaseValue>>(&mut self, column: &str, value: T) -> &mut Self {
        self.push(Predicate::new(format!("{} = ?", column), vec![arg(value)]))
    }

    /// Add condition with not equal
    pub fn not_eq<T: Into<DatabaseValue>>(&mut self, column: &str, value: T) -> &mut Self {
        self.push(Predicate::new(format!("{} != ?", column), vec![arg(value)]))
    }

    /// Add condition with greater than
    pub fn gt<T: Into<DatabaseValue>>(&mut self, column: &str, value: T) -> &mut Self {
        self.push(Predicate::new(format!("{} > ?", column), vec![arg(value)]))
    }

    /// Add condition with greater than or equal
    pub fn ge<T: Into<DatabaseValue>>(&mut self, column: &str, value: T) -> &mut Self {
        self.push(Predicate::new(format!("{} >= ?", column), vec![arg(value)]))
    }

    /// Add condition with less than
    pub fn lt<T: Into<DatabaseValue>>(&mut self, column: &str, value: T) -> &mut Self {
        self.push(Predicate::new(format!("{} < ?", column), vec![arg(value)]))
    }

    /// Add condition with less than or equal
    pub fn le<T: Into<DatabaseValue>>(&mut self, column: &str, value: T) -> &mut Self {
        self.push(Predicate::new(format!("{} <= ?", column), vec![arg(value)]))
    }

    /// Add condition with IN
    pub fn in_values<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<DatabaseValue>,
    {
        let args: Vec<String> = values.into_iter().map(arg).collect();
        self.push(Predicate::new(
            format!("{} IN ({})", column, placeholders(args.len())),
            args,
        ))
    }

    /// Add condition with NOT IN
    pub fn not_in<I, T>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<DatabaseValue>,
    {
        let args: Vec<String> = values.into_iter().map(arg).collect();
        self.push(Predicate::new(
            format!("{} NOT IN ({})", column, placeholders(args.len())),
            args,
        ))
    }

    /// Add condition with LIKE
    pub fn like(&mut self, column: &str, pattern: &str) -> &mut Self {
        self.push(Predicate::new(format!("{} LIKE ?", column), vec![pattern.to_string()]))
    }

    /// Add condition with NOT LIKE
    pub fn not_like(&mut self, column: &str, pattern: &str) -> &mut Self {
        self.push(Predicate::new(format!("{} NOT LIKE ?", column), vec![pattern.to_string()]))
    }

    /// Add condition with BETWEEN
    pub fn between<T: Into<DatabaseValue>>(&mut self, column: &str, low: T, high: T) -> &mut Self {
        self.push(Predicate::new(
            format!("{} BETWEEN ? AND ?", column),
            vec![arg(low), arg(high)],
        ))
    }

    /// Add condition with NOT BETWEEN
    pub fn not_between<T: Into<DatabaseValue>>(&mut self, column: &str, low: T, high: T) -> &mut Self {
        self.push(Predicate::new(
            format!("{} NOT BETWEEN ? AND ?", column),
            vec![arg(low), arg(high)],
        ))
    }

    /// Add condition with IS NULL
    pub fn is_null(&mut self, column: &str) -> &mut Self {
        self.push(Predicate::new(format!("{} IS NULL", column), Vec::new()))
    }

    /// Add condition with IS NOT NULL
    pub fn is_not_null(&mut self, column: &str) -> &mut Self {
        self.push(Predicate::new(format!("{} IS NOT NULL", column), Vec::new()))
    }

    /// Add a raw clause template with its positional arguments
    pub fn raw<I, T>(&mut self, clause: &str, args: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<DatabaseValue>,
    {
        self.push(Predicate::new(clause, args.into_iter().map(arg).collect()))
    }
}
