//! Page/sort parameters shared by every list endpoint.

use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(ref s) if s == "asc" => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Raw query string parameters, as sent by list pages and API clients
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Older clients send `limit`
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub search: Option<String>,
}

/// Validated paging window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub search: Option<String>,
}

impl PageQuery {
    /// Clamp paging values and check `sort_by` against `sortable` columns.
    /// The first entry of `sortable` is the fallback.
    pub fn from_params(params: &PageParams, limits: &PaginationConfig, sortable: &[&str]) -> Self {
        let page = params.page.filter(|p| *p >= 1).unwrap_or(1);
        let page_size = match params.page_size.or(params.limit) {
            Some(0) | None => limits.default_page_size,
            Some(size) => size.min(limits.max_page_size),
        };
        let fallback = sortable.first().copied().unwrap_or("created_at");
        let sort_by = params
            .sort_by
            .as_deref()
            .map(str::trim)
            .filter(|s| sortable.contains(s))
            .unwrap_or(fallback)
            .to_string();
        let search = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            page,
            page_size,
            sort_by,
            sort_order: SortOrder::parse(params.sort_order.as_deref()),
            search,
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// `ORDER BY` clause built from whitelisted parts only
    pub fn order_clause(&self) -> String {
        format!("{} {}, id {}", self.sort_by, self.sort_order.as_sql(), self.sort_order.as_sql())
    }

    /// Same as `order_clause`, with columns qualified by a table alias
    pub fn order_clause_for(&self, alias: &str) -> String {
        let dir = self.sort_order.as_sql();
        format!("{alias}.{} {dir}, {alias}.id {dir}", self.sort_by)
    }

    pub fn like_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|s| like_pattern(s))
    }
}

/// `%term%` with LIKE wildcards in the term escaped (use with `ESCAPE '\'`)
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub fn total_pages(total: i64, page_size: u32) -> u32 {
    if total <= 0 || page_size == 0 {
        return 0;
    }
    ((total as u64 + page_size as u64 - 1) / page_size as u64) as u32
}

/// Page numbers to show around `current`, with `None` marking a gap
pub fn page_window(current: u32, total_pages: u32) -> Vec<Option<u32>> {
    const RADIUS: u32 = 2;
    if total_pages == 0 {
        return Vec::new();
    }
    let current = current.clamp(1, total_pages);
    let start = current.saturating_sub(RADIUS).max(1);
    let end = (current + RADIUS).min(total_pages);

    let mut pages = Vec::new();
    if start > 1 {
        pages.push(Some(1));
        if start > 2 {
            pages.push(None);
        }
    }
    pages.extend((start..=end).map(Some));
    if end < total_pages {
        if end + 1 < total_pages {
            pages.push(None);
        }
        pages.push(Some(total_pages));
    }
    pages
}

/// Serializable pagination block for templates
#[derive(Debug, Clone, Serialize)]
pub struct PageNav {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: u32,
    pub has_prev: bool,
    pub has_next: bool,
    pub window: Vec<Option<u32>>,
}

impl PageNav {
    pub fn new(query: &PageQuery, total: i64) -> Self {
        let total_pages = total_pages(total, query.page_size);
        Self {
            page: query.page,
            page_size: query.page_size,
            total,
            total_pages,
            has_prev: query.page > 1,
            has_next: query.page < total_pages,
            window: page_window(query.page, total_pages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SORTABLE: &[&str] = &["created_at", "title", "view_count"];

    fn limits() -> PaginationConfig {
        PaginationConfig {
            default_page_size: 20,
            max_page_size: 100,
        }
    }

    #[test]
    fn test_defaults_and_clamping() {
        let q = PageQuery::from_params(&PageParams::default(), &limits(), SORTABLE);
        assert_eq!(q.page, 1);
        assert_eq!(q.page_size, 20);
        assert_eq!(q.sort_by, "created_at");
        assert_eq!(q.sort_order, SortOrder::Desc);

        let params = PageParams {
            page: Some(0),
            page_size: Some(5000),
            ..Default::default()
        };
        let q = PageQuery::from_params(&params, &limits(), SORTABLE);
        assert_eq!(q.page, 1);
        assert_eq!(q.page_size, 100);
    }

    #[test]
    fn test_legacy_limit_and_unknown_sort_column() {
        let params = PageParams {
            page: Some(3),
            limit: Some(10),
            sort_by: Some("title; DROP TABLE posts".to_string()),
            sort_order: Some("ASC".to_string()),
            search: Some("   ".to_string()),
            ..Default::default()
        };
        let q = PageQuery::from_params(&params, &limits(), SORTABLE);
        assert_eq!(q.page_size, 10);
        assert_eq!(q.offset(), 20);
        assert_eq!(q.sort_by, "created_at");
        assert_eq!(q.sort_order, SortOrder::Asc);
        assert!(q.search.is_none());
        assert_eq!(q.order_clause(), "created_at ASC, id ASC");
        assert_eq!(q.order_clause_for("p"), "p.created_at ASC, p.id ASC");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
    }

    #[test]
    fn test_page_window_gaps() {
        assert_eq!(page_window(1, 3), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(
            page_window(6, 10),
            vec![Some(1), None, Some(4), Some(5), Some(6), Some(7), Some(8), None, Some(10)]
        );
        assert_eq!(page_window(2, 5), vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
        assert!(page_window(1, 0).is_empty());
    }
}
