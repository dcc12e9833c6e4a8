use serde::{Deserialize, Serialize};

use super::{
    error::{Error, HtmlError, TypeError},
    form::Form,
};
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Requested window into a listing: 1-based `page` of `limit` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn from_form(form: &Form) -> Result<Self, TypeError> {
        let page = form.get_number::<i64>("page")?.unwrap_or(1);
        let limit = form
            .get_number::<i64>("limit")?
            .unwrap_or(DEFAULT_PAGE_SIZE);

        if page < 1 {
            return Err(TypeError::new("Page numbers start at 1"));
        }
        if limit < 1 {
            return Err(TypeError::new("Limit must be positive"));
        }

        let limit = limit.min(MAX_PAGE_SIZE);
        if (page - 1).checked_mul(limit).is_none() {
            return Err(TypeError::new("Page number is too large"));
        }

        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// Builds the page envelope. A page past the end of a non-empty
    /// listing is not found rather than an empty page.
    pub fn from_rows(
        rows: Vec<T>,
        total_rows: i64,
        pagination: Pagination,
    ) -> Result<Self, Error> {
        if rows.is_empty() {
            return match pagination.page {
                1 => Ok(Self::no_rows()),
                _ => Err(HtmlError::NotFound.new("Invalid page.")),
            };
        }

        let shown = pagination.offset() + rows.len() as i64;
        let next = (shown < total_rows).then_some(pagination.page + 1);
        let previous = (pagination.page > 1).then_some(pagination.page - 1);

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        })
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }

    pub fn map<U, F>(self, f: F) -> PageContext<U>
    where
        F: FnMut(T) -> U,
    {
        PageContext {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
