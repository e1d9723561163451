use serde::{Deserialize, Serialize};

const MAX_LIMIT: i64 = 500;

pub(crate) const fn default_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

impl PageQuery {
    pub(crate) fn new(skip: i64, limit: i64) -> Self {
        Self { skip: skip.max(0), limit: limit.clamp(1, MAX_LIMIT) }
    }

    pub(crate) fn clamped(self) -> Self {
        Self::new(self.skip, self.limit)
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self::new(0, default_limit())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaginatedResponse<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total_count: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

impl<T> PaginatedResponse<T> {
    pub(crate) fn new(items: Vec<T>, total_count: i64, page: PageQuery) -> Self {
        Self { items, total_count, skip: page.skip, limit: page.limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_are_clamped() {
        let page = PageQuery { skip: -5, limit: 10_000 }.clamped();
        assert_eq!((page.skip, page.limit), (0, MAX_LIMIT));

        let page = PageQuery { skip: 20, limit: 0 }.clamped();
        assert_eq!((page.skip, page.limit), (20, 1));

        assert_eq!(PageQuery::default().limit, 100);
    }
}
