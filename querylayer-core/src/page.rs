//! Pagination types for [`TableQuery::paginate`](crate::manager::TableQuery::paginate).
//!
//! Pages are 1-indexed. The total row count and the page contents are
//! fetched with two separate queries built from clones of the same
//! expression.

use serde::{Deserialize, Serialize};

/// A single page of results plus navigation metadata.
///
/// # Example
///
/// ```ignore
/// use querylayer::page::{Page, PaginationParams};
///
/// let page = people.paginate(PaginationParams::new(2, 25)).await?;
///
/// assert_eq!(page.previous_page, Some(1));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of items across all pages.
    pub count: u64,
    /// The next page number, if more pages exist.
    pub next_page: Option<u64>,
    /// The previous page number, if this is not the first page.
    pub previous_page: Option<u64>,
}

impl<T> Page<T> {
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Builds a page from its items and the total count of the unpaged query.
    pub fn from_total(items: Vec<T>, count: u64, params: &PaginationParams) -> Self {
        let end = params.offset().saturating_add(items.len() as u64);

        Page::builder(items)
            .with_count(count)
            .with_next_page((end < count).then(|| params.page() + 1))
            .with_previous_page((params.page() > 1).then(|| params.page() - 1))
            .build()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for [`Page`].
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<u64>,
    previous_page: Option<u64>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_next_page(mut self, next_page: Option<u64>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn with_previous_page(mut self, previous_page: Option<u64>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Which page to fetch and how many rows per page.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PaginationParams {
    /// The page number (1-indexed). `0` is read as `1`.
    pub page: u64,
    /// Number of items per page.
    pub per_page: u64,
}

impl PaginationParams {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self { page, per_page }
    }

    pub fn page(&self) -> u64 {
        self.page.max(1)
    }

    /// Number of rows to skip before this page.
    pub fn offset(&self) -> u64 {
        (self.page() - 1).saturating_mul(self.per_page)
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}
