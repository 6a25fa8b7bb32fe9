//! One-based paging parameters.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u32,
    rows_per_page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("page number must be at least 1, got {0}")]
    Number(u32),
    #[error("rows per page must be at least 1, got {0}")]
    RowsPerPage(u32),
}

impl Page {
    pub fn new(number: u32, rows_per_page: u32) -> Result<Self, PageError> {
        if number < 1 {
            return Err(PageError::Number(number));
        }
        if rows_per_page < 1 {
            return Err(PageError::RowsPerPage(rows_per_page));
        }
        Ok(Self {
            number,
            rows_per_page,
        })
    }

    pub fn number(self) -> u32 {
        self.number
    }

    pub fn rows_per_page(self) -> u32 {
        self.rows_per_page
    }

    pub fn offset(self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.rows_per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            rows_per_page: 10,
        }
    }
}
