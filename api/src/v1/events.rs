use serde::{Deserialize, Serialize};

/// A page of rows together with its pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T, M> {
    pub data: Vec<T>,
    pub pagination: M,
}

/// Metadata for keyset (timestamp cursor) pagination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPaginationMeta {
    pub limit: usize,
    pub has_next: bool,
    /// Set whenever a `cursor` was supplied, not when older rows are known to exist.
    pub has_previous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

/// Metadata for page/perPage offset pagination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl PaginationMeta {
    pub fn new(page: usize, per_page: usize, total: usize) -> Self {
        Self {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page.max(1)),
        }
    }

    /// Index range of this page inside a result of `total` rows.
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = (self.page.saturating_sub(1))
            .saturating_mul(self.per_page)
            .min(self.total);
        let end = start.saturating_add(self.per_page).min(self.total);
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(PaginationMeta::new(1, 100, 0).total_pages, 0);
        assert_eq!(PaginationMeta::new(1, 100, 100).total_pages, 1);
        assert_eq!(PaginationMeta::new(1, 100, 101).total_pages, 2);
    }

    #[test]
    fn page_range_past_the_end_is_empty() {
        let meta = PaginationMeta::new(3, 10, 25);
        assert_eq!(meta.range(), 20..25);

        let meta = PaginationMeta::new(4, 10, 25);
        assert!(meta.range().is_empty());
    }

    #[test]
    fn empty_cursors_are_omitted() {
        let meta = CursorPaginationMeta {
            limit: 10,
            ..Default::default()
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["hasNext"], false);
        assert!(value.get("nextCursor").is_none());
        assert!(value.get("totalCount").is_none());
    }
}
