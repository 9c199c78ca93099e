//! Common types used across the backend

use serde::{Deserialize, Serialize};

/// Pagination block returned alongside list results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginationMeta {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl PaginationMeta {
    pub fn new(total: u64, limit: u32, offset: u32) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: (offset as u64 + limit as u64) < total,
        }
    }
}

/// A page of items plus its pagination block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_more() {
        assert!(PaginationMeta::new(5, 2, 0).has_more);
        assert!(PaginationMeta::new(5, 2, 2).has_more);
        assert!(!PaginationMeta::new(5, 2, 4).has_more);
        assert!(!PaginationMeta::new(0, 50, 0).has_more);
    }
}
