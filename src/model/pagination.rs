use serde::Serialize;

/// `OFFSET` is a signed 64-bit bind in Postgres
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// Offset window for one page, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub per_page: u64,
}

impl PageWindow {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Rows to skip, saturating at the largest offset a SQL backend accepts.
    pub fn offset(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.per_page)
            .min(MAX_OFFSET)
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }
}

/// One page of records plus the numbers needed to navigate.
///
/// `has_previous_page`/`has_next_page` are derived on demand from
/// `current_page` and `last_page`; they are never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedResult<T> {
    pub records: Vec<T>,
    pub current_page: u64,
    pub last_page: u64,
    pub per_page: u64,
    /// 1-indexed position of the first record on this page, `None` when empty
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub total: u64,
}

impl<T> PaginatedResult<T> {
    pub fn new(records: Vec<T>, total: u64, window: PageWindow) -> Self {
        let per_page = window.per_page;
        let last_page = total.div_ceil(per_page).max(1);
        let (from, to) = if records.is_empty() {
            (None, None)
        } else {
            let from = window.offset().saturating_add(1);
            (Some(from), Some(from.saturating_add(records.len() as u64 - 1)))
        };

        Self {
            records,
            current_page: window.page,
            last_page,
            per_page,
            from,
            to,
            total,
        }
    }

    pub fn has_previous_page(&self) -> bool {
        self.current_page > 1
    }

    pub fn has_next_page(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn meta(&self) -> PageMeta {
        PageMeta {
            current_page: self.current_page,
            last_page: self.last_page,
            per_page: self.per_page,
            from: self.from,
            to: self.to,
            total: self.total,
            has_previous_page: self.has_previous_page(),
            has_next_page: self.has_next_page(),
        }
    }

    pub fn map<U, F>(self, f: F) -> PaginatedResult<U>
    where
        F: FnMut(T) -> U,
    {
        PaginatedResult {
            records: self.records.into_iter().map(f).collect(),
            current_page: self.current_page,
            last_page: self.last_page,
            per_page: self.per_page,
            from: self.from,
            to: self.to,
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub current_page: u64,
    pub last_page: u64,
    pub per_page: u64,
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub total: u64,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

/// Wire shape of every list response: `{records, meta}`
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub records: Vec<T>,
    pub meta: PageMeta,
}

impl<T> From<PaginatedResult<T>> for ListResponse<T> {
    fn from(result: PaginatedResult<T>) -> Self {
        let meta = result.meta();
        Self {
            records: result.records,
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_a_normal_page() {
        let result: PaginatedResult<u32> = PaginatedResult::new(vec![], 0, PageWindow::new(1, 10));
        assert_eq!(result.total, 0);
        assert_eq!(result.last_page, 1);
        assert_eq!(result.from, None);
        assert!(!result.has_next_page());
        assert!(!result.has_previous_page());
    }

    #[test]
    fn test_middle_page_numbers() {
        let result = PaginatedResult::new(vec![11, 12, 13, 14, 15, 16, 17, 18, 19, 20], 23, PageWindow::new(2, 10));
        assert_eq!(result.last_page, 3);
        assert_eq!(result.from, Some(11));
        assert_eq!(result.to, Some(20));
        assert!(result.has_previous_page());
        assert!(result.has_next_page());
    }

    #[test]
    fn test_flags_follow_page_numbers() {
        for total in 0..35u64 {
            for page in 1..6u64 {
                let window = PageWindow::new(page, 10);
                let count = total.saturating_sub(window.offset()).min(10) as usize;
                let result = PaginatedResult::new(vec![(); count], total, window);
                let meta = result.meta();
                assert_eq!(meta.has_next_page, meta.current_page < meta.last_page);
                assert_eq!(meta.has_previous_page, meta.current_page > 1);
            }
        }
    }

    #[test]
    fn test_offset_saturates_for_huge_pages() {
        let window = PageWindow::new(u64::MAX, 100);
        assert_eq!(window.offset(), MAX_OFFSET);
        assert_eq!(PageWindow::new(i64::MAX as u64, 100).offset(), MAX_OFFSET);
    }

    #[test]
    fn test_window_clamps_page_below_one() {
        let window = PageWindow::new(0, 10);
        assert_eq!(window.page, 1);
        assert_eq!(window.offset(), 0);
    }
}
