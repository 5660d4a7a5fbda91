//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl Pagination {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.clamp(1, Self::MAX_PER_PAGE))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: &Pagination, total_items: u64) -> Self {
        let per_page = pagination.limit().unsigned_abs();
        let total_pages = u32::try_from(total_items.div_ceil(per_page)).unwrap_or(u32::MAX);
        Self {
            data,
            pagination: PaginationMeta {
                page: pagination.page.max(1),
                per_page: pagination.per_page.clamp(1, Pagination::MAX_PER_PAGE),
                total_items,
                total_pages,
            },
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        let page = Pagination { page: 3, per_page: 20 };
        assert_eq!(page.offset(), 40);
        assert_eq!(Pagination { page: 0, per_page: 500 }.limit(), 100);
    }

    #[test]
    fn test_total_pages() {
        let response = PaginatedResponse::new(vec![1, 2], &Pagination::default(), 41);
        assert_eq!(response.pagination.total_pages, 3);
    }
}
