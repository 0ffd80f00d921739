//! Table aliases for one rendered query
//!
//! A fresh [`AliasContext`] is created for every render and dropped with it,
//! so aliases never leak between queries.

use std::collections::{HashMap, HashSet};

use crate::error::{ModelError, ModelResult};
use crate::security::is_keyword;

#[derive(Debug, Default)]
pub struct AliasContext {
    used: HashSet<String>,
    by_table: HashMap<String, String>,
    owners: HashMap<String, String>,
}

impl AliasContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for the next occurrence of `table`
    ///
    /// An explicit alias always wins; it may be repeated for the same table
    /// but not reused for a different one.
    pub fn assign(&mut self, table: &str, explicit: Option<&str>) -> ModelResult<String> {
        let alias = match explicit {
            Some(alias) => {
                if let Some(owner) = self.owners.get(alias) {
                    if owner != table {
                        return Err(ModelError::QueryBuild(format!(
                            "alias '{}' is already used for table '{}'",
                            alias, owner
                        )));
                    }
                }
                alias.to_string()
            }
            None => self.generate(table),
        };
        self.used.insert(alias.clone());
        self.owners.insert(alias.clone(), table.to_string());
        self.by_table
            .entry(table.to_string())
            .or_insert_with(|| alias.clone());
        Ok(alias)
    }

    /// First alias given to `table`
    pub fn alias_of(&self, table: &str) -> Option<&str> {
        self.by_table.get(table).map(String::as_str)
    }

    fn generate(&self, table: &str) -> String {
        let base = initials(table);
        if !self.used.contains(&base) && !is_keyword(&base) {
            return base;
        }
        (1u32..)
            .map(|n| format!("{}{}", base, n))
            .find(|candidate| !self.used.contains(candidate))
            .unwrap_or(base)
    }
}

/// First letter of every underscore-separated segment
fn initials(table: &str) -> String {
    let initials: String = table
        .split('_')
        .filter_map(|segment| segment.chars().next())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if initials.is_empty() {
        "t".to_string()
    } else {
        initials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_aliases() {
        let mut ctx = AliasContext::new();
        assert_eq!(ctx.assign("person", None).unwrap(), "p");
        assert_eq!(ctx.assign("class_room", None).unwrap(), "cr");
        assert_eq!(ctx.assign("passport", None).unwrap(), "p1");
        assert_eq!(ctx.assign("person", None).unwrap(), "p2");
        assert_eq!(ctx.alias_of("person"), Some("p"));
    }

    #[test]
    fn test_keyword_initials_are_skipped() {
        let mut ctx = AliasContext::new();
        assert_eq!(ctx.assign("account_settings", None).unwrap(), "as1");
        assert_eq!(ctx.assign("_id_holder", None).unwrap(), "ih");
    }

    #[test]
    fn test_explicit_alias_wins() {
        let mut ctx = AliasContext::new();
        assert_eq!(ctx.assign("group", Some("grp")).unwrap(), "grp");
        assert_eq!(ctx.assign("group", None).unwrap(), "g");
        assert!(matches!(
            ctx.assign("person", Some("grp")),
            Err(ModelError::QueryBuild(_))
        ));
    }
}
