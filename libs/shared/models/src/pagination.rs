use serde::{Deserialize, Serialize};

pub const MAX_PAGE_SIZE: u32 = 100;

/// Query parameters shared by every paginated endpoint. Pages are zero-based.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageParams {
    pub fn resolve(&self, default_size: u32) -> Result<PageRequest, String> {
        PageRequest::new(self.page.unwrap_or(0), self.size.unwrap_or(default_size))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Result<Self, String> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(format!("Page size must be between 1 and {}", MAX_PAGE_SIZE));
        }
        Ok(Self { page, size })
    }

    pub fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }

    pub fn limit(&self) -> usize {
        self.size as usize
    }

    /// Slice an already materialised, already ordered list.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items.iter().skip(self.offset()).take(self.limit()).cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_items: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl Pagination {
    pub fn new(request: PageRequest, total_items: usize) -> Self {
        let total_pages = total_items.div_ceil(request.size as usize) as u32;
        Self {
            current_page: request.page,
            page_size: request.size,
            total_pages,
            total_items,
            has_next_page: total_pages > 0 && request.page < total_pages - 1,
            has_previous_page: request.page > 0,
        }
    }
}
