//! Predicate Builder ORDER BY operations

use super::builder::PredicateBuilder;
use super::types::*;

impl PredicateBuilder {
    /// Add ORDER BY clause (ascending)
    pub fn order_by_asc(&mut self, column: &str) -> &mut Self {
        self.order_by.push((column.to_string(), OrderDirection::Asc));
        self
    }

    /// Add ORDER BY clause (descending)
    pub fn order_by_desc(&mut self, column: &str) -> &mut Self {
        self.order_by.push((column.to_string(), OrderDirection::Desc));
        self
    }

    /// Ordered columns, ascending ones first
    pub(crate) fn ordering(&self) -> Vec<&(String, OrderDirection)> {
        let ascending = self.order_by.iter().filter(|(_, d)| *d == OrderDirection::Asc);
        let descending = self.order_by.iter().filter(|(_, d)| *d == OrderDirection::Desc);
        ascending.chain(descending).collect()
    }
}
