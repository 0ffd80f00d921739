//! Identifier safety for generated SQL
//!
//! This module provides functions for:
//! - Rejecting schema names that collide with SQL statement keywords
//! - Quoting identifiers that SQLite would otherwise parse as keywords
//! - Recognising expression keywords inside predicate templates

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::error::{ModelError, ModelResult};

/// Characters allowed in SQL identifiers (alphanumeric, underscore)
const ALLOWED_IDENTIFIER_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

/// Keywords that must never be used as a table or column name
static RESERVED_WORDS: &[&str] = &[
    "ALTER",
    "AND",
    "AS",
    "BEGIN",
    "BETWEEN",
    "BY",
    "CHECK",
    "COMMIT",
    "CONSTRAINT",
    "CREATE",
    "DEFAULT",
    "DELETE",
    "DROP",
    "EXISTS",
    "FOREIGN",
    "FROM",
    "IN",
    "INDEX",
    "INSERT",
    "INTO",
    "IS",
    "JOIN",
    "LIKE",
    "NOT",
    "NULL",
    "ON",
    "OR",
    "PRAGMA",
    "PRIMARY",
    "REFERENCES",
    "ROLLBACK",
    "SELECT",
    "SET",
    "TABLE",
    "TRANSACTION",
    "UNION",
    "UNIQUE",
    "UPDATE",
    "VALUES",
    "WHERE",
];

/// Full SQLite keyword list; names in here are quoted when emitted
static SQLITE_KEYWORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ALWAYS", "ANALYZE", "AND", "AS", "ASC",
    "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST",
    "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DEFAULT",
    "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH", "DISTINCT", "DO", "DROP", "EACH",
    "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUDE", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL",
    "FILTER", "FIRST", "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL", "GENERATED", "GLOB",
    "GROUP", "GROUPS", "HAVING", "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED",
    "INITIALLY", "INNER", "INSERT", "INSTEAD", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN",
    "KEY", "LAST", "LEFT", "LIKE", "LIMIT", "MATCH", "MATERIALIZED", "NATURAL", "NO", "NOT",
    "NOTHING", "NOTNULL", "NULL", "NULLS", "OF", "OFFSET", "ON", "OR", "ORDER", "OTHERS",
    "OUTER", "OVER", "PARTITION", "PLAN", "PRAGMA", "PRECEDING", "PRIMARY", "QUERY", "RAISE",
    "RANGE", "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE",
    "RESTRICT", "RETURNING", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT", "SELECT", "SET",
    "TABLE", "TEMP", "TEMPORARY", "THEN", "TIES", "TO", "TRANSACTION", "TRIGGER", "UNBOUNDED",
    "UNION", "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL", "WHEN",
    "WHERE", "WINDOW", "WITH", "WITHOUT",
];

/// Keywords that may appear inside a predicate expression
static EXPRESSION_KEYWORDS: &[&str] = &[
    "AND", "ASC", "BETWEEN", "CASE", "COLLATE", "DESC", "DISTINCT", "ELSE", "END", "ESCAPE",
    "EXISTS", "FALSE", "GLOB", "IN", "IS", "ISNULL", "LIKE", "MATCH", "NOCASE", "NOT",
    "NOTNULL", "NULL", "OR", "REGEXP", "THEN", "TRUE", "WHEN",
];

static RESERVED_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| RESERVED_WORDS.iter().copied().collect());
static KEYWORD_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| SQLITE_KEYWORDS.iter().copied().collect());
static EXPRESSION_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| EXPRESSION_KEYWORDS.iter().copied().collect());

/// Whether `word` may not be used as a schema name
pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_SET.contains(word.to_ascii_uppercase().as_str())
}

/// Whether `word` is any SQLite keyword
pub fn is_keyword(word: &str) -> bool {
    KEYWORD_SET.contains(word.to_ascii_uppercase().as_str())
}

/// Whether `word` is an expression keyword that must not be aliased
pub fn is_expression_keyword(word: &str) -> bool {
    EXPRESSION_SET.contains(word.to_ascii_uppercase().as_str())
}

/// Validate that a table or column name is safe to synthesize into DDL
pub fn validate_identifier(identifier: &str) -> ModelResult<()> {
    if identifier.is_empty() {
        return Err(ModelError::SchemaInit(
            "Identifier cannot be empty".to_string(),
        ));
    }

    for c in identifier.chars() {
        if !ALLOWED_IDENTIFIER_CHARS.contains(c) {
            return Err(ModelError::SchemaInit(format!(
                "Identifier '{}' contains invalid character '{}'",
                identifier, c
            )));
        }
    }

    if identifier.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(ModelError::SchemaInit(format!(
            "Identifier '{}' cannot start with a number",
            identifier
        )));
    }

    if is_reserved_word(identifier) {
        return Err(ModelError::SchemaInit(format!(
            "Identifier '{}' is a reserved SQL keyword",
            identifier
        )));
    }

    Ok(())
}

/// Escape a SQL identifier by doubling embedded quotes and wrapping it
pub fn escape_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quote an identifier only when SQLite would read it as a keyword
pub fn quote_identifier(identifier: &str) -> String {
    if is_keyword(identifier) {
        escape_identifier(identifier)
    } else {
        identifier.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_words_are_rejected() {
        assert!(validate_identifier("select").is_err());
        assert!(validate_identifier("Table").is_err());
        assert!(validate_identifier("person").is_ok());
        assert!(validate_identifier("_id").is_ok());
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("user-name").is_err());
        assert!(validate_identifier("1st").is_err());
        assert!(validate_identifier("drop;table").is_err());
    }

    #[test]
    fn test_quote_only_keywords() {
        assert_eq!(quote_identifier("group"), "\"group\"");
        assert_eq!(quote_identifier("order"), "\"order\"");
        assert_eq!(quote_identifier("person"), "person");
        assert_eq!(escape_identifier("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_expression_keywords() {
        assert!(is_expression_keyword("and"));
        assert!(is_expression_keyword("NULL"));
        assert!(!is_expression_keyword("name"));
        assert!(!is_expression_keyword("group"));
    }
}
