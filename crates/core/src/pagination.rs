//! Page requests and paged results shared by list endpoints.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A validated page request (1-based).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Build a page request, enforcing `1..=max_page` / `1..=max_size`.
    pub fn new(page: u32, page_size: u32, max_page: u32, max_size: u32) -> DomainResult<Self> {
        let mut errors = Vec::new();
        if page < 1 || page > max_page {
            errors.push(format!("Page must be between 1 and {max_page}"));
        }
        if page_size < 1 || page_size > max_size {
            errors.push(format!("Limit must be between 1 and {max_size}"));
        }
        if errors.is_empty() {
            Ok(Self { page, page_size })
        } else {
            Err(DomainError::validation_all(errors))
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

/// Pagination metadata returned alongside a page of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_entries: usize,
    pub page_size: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_entry: usize,
    pub end_entry: usize,
}

impl PageInfo {
    pub fn new(request: PageRequest, total_entries: usize) -> Self {
        let size = request.page_size as usize;
        let total_pages = total_entries.div_ceil(size) as u32;
        // Past the last page there is nothing to show: report 0..0.
        let (start_entry, end_entry) = if request.offset() >= total_entries {
            (0, 0)
        } else {
            (request.offset() + 1, (request.page as usize * size).min(total_entries))
        };
        Self {
            current_page: request.page,
            total_pages,
            total_entries,
            page_size: request.page_size,
            has_next_page: request.page < total_pages,
            has_previous_page: request.page > 1,
            start_entry,
            end_entry,
        }
    }
}

/// One page of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Page<T> {
    /// Slice an already filtered and sorted collection.
    pub fn from_vec(all: Vec<T>, request: PageRequest) -> Self {
        let pagination = PageInfo::new(request, all.len());
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.page_size as usize)
            .collect();
        Self { items, pagination }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_sliced_and_described() {
        let req = PageRequest::new(2, 20, 100, 100).unwrap();
        let page = Page::from_vec((0..45).collect::<Vec<_>>(), req);
        assert_eq!(page.items.len(), 20);
        assert_eq!(page.items[0], 20);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_next_page);
        assert!(page.pagination.has_previous_page);
        assert_eq!(page.pagination.start_entry, 21);
        assert_eq!(page.pagination.end_entry, 40);
    }

    #[test]
    fn empty_collections_have_zero_pages() {
        let req = PageRequest::new(1, 20, 100, 100).unwrap();
        let page = Page::<u8>::from_vec(vec![], req);
        assert_eq!(page.pagination.total_pages, 0);
        assert!(!page.pagination.has_next_page);
        assert_eq!(page.pagination.start_entry, 0);
    }

    #[test]
    fn pages_past_the_end_report_no_entries() {
        let req = PageRequest::new(5, 20, 100, 100).unwrap();
        let page = Page::from_vec((0..45).collect::<Vec<_>>(), req);
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.start_entry, 0);
        assert_eq!(page.pagination.end_entry, 0);
        assert!(!page.pagination.has_next_page);
    }

    #[test]
    fn out_of_range_requests_list_every_problem() {
        let err = PageRequest::new(0, 101, 100, 100).unwrap_err();
        let DomainError::Validation(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("Page must be between 1 and 100"));
        assert!(msg.contains("Limit must be between 1 and 100"));
    }
}
