//! Pagination types for listing queries.
//!
//! Listing reads (loan history, bookings, item catalogs) are paginated with
//! clamped page sizes; the cached read paths key their entries by these
//! parameters.

use serde::{Deserialize, Serialize};

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Maximum allowed items per page.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Pagination options for database queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    /// Page number (1-indexed).
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Creates a new Pagination, clamping page to >= 1 and per_page to
    /// `[1, MAX_PAGE_SIZE]`.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Creates a Pagination from optional query parameters with defaults.
    pub fn from_query(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self::new(page.unwrap_or(1), per_page.unwrap_or(DEFAULT_PAGE_SIZE))
    }

    /// Offset for LIMIT/OFFSET queries.
    pub fn offset(&self) -> u32 {
        (self.page.saturating_sub(1)) * self.per_page
    }

    /// Limit for LIMIT/OFFSET queries.
    pub fn limit(&self) -> u32 {
        self.per_page
    }

    /// Total pages for a total item count.
    pub fn total_pages(&self, total_items: u64) -> u32 {
        if total_items == 0 {
            return 1;
        }
        ((total_items as f64) / (self.per_page as f64)).ceil() as u32
    }
}

/// A paginated result containing items and pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    /// The items on the current page.
    pub items: Vec<T>,
    /// Total number of items matching the query (across all pages).
    pub total: u64,
    /// Current page number (1-indexed).
    pub page: u32,
    /// Number of items per page.
    pub per_page: u32,
    /// Total number of pages.
    pub total_pages: u32,
}

impl<T> PaginatedResult<T> {
    /// Creates a new PaginatedResult.
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
            total_pages: pagination.total_pages(total),
        }
    }

    /// Returns true if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items on the current page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there is a next page.
    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_default() {
        let p = Pagination::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, DEFAULT_PAGE_SIZE);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_pagination_clamps_values() {
        let p = Pagination::new(0, 50);
        assert_eq!(p.page, 1);

        let p = Pagination::new(1, 500);
        assert_eq!(p.per_page, MAX_PAGE_SIZE);

        let p = Pagination::new(1, 0);
        assert_eq!(p.per_page, 1);
    }

    #[test]
    fn test_pagination_offset() {
        let p = Pagination::new(3, 25);
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn test_total_pages() {
        let p = Pagination::new(1, 10);
        assert_eq!(p.total_pages(0), 1);
        assert_eq!(p.total_pages(10), 1);
        assert_eq!(p.total_pages(11), 2);
        assert_eq!(p.total_pages(101), 11);
    }

    #[test]
    fn test_paginated_result() {
        let pagination = Pagination::new(1, 5);
        let result = PaginatedResult::new(vec![1, 2, 3, 4, 5], 12, &pagination);
        assert_eq!(result.len(), 5);
        assert_eq!(result.total_pages, 3);
        assert!(result.has_next_page());

        let empty: PaginatedResult<i32> = PaginatedResult::new(vec![], 0, &pagination);
        assert!(empty.is_empty());
        assert!(!empty.has_next_page());
    }
}
