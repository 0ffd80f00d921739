//! Predicate Builder pagination operations

use super::builder::PredicateBuilder;

impl PredicateBuilder {
    /// Rows per page; paging is off until a size is set
    pub fn set_page_size(&mut self, size: u64) -> &mut Self {
        self.page_size = Some(size);
        self
    }

    /// Zero-based page number
    pub fn set_page(&mut self, page: u64) -> &mut Self {
        self.page = page;
        self
    }

    /// `(limit, offset)` when paging is enabled
    pub(crate) fn limit_offset(&self) -> Option<(u64, u64)> {
        self.page_size.map(|size| (size, self.page * size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_offset() {
        let mut builder = PredicateBuilder::new();
        assert_eq!(builder.limit_offset(), None);
        builder.set_page(3);
        assert_eq!(builder.limit_offset(), None);
        builder.set_page_size(20).set_page(1);
        assert_eq!(builder.limit_offset(), Some((20, 20)));
    }
}
