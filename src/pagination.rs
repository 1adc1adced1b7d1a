// src/pagination.rs
//! 1-indexed page/offset pagination and a small WHERE-clause builder shared
//! by the public catalog and the admin listings.

use serde::{Deserialize, Serialize};

// ==================== QUERY PARAMETERS ====================

/// A normalized page window. `page` is never clamped down to the last page:
/// asking past the end yields an empty page that still reports the requested number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64, max_limit: i64) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(default_limit).clamp(1, max_limit.max(1));
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

// ==================== RESPONSE STRUCTURES ====================

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub page: i64,
    pub pages: i64,
    pub total: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn from_total(total: i64, request: &PageRequest) -> Self {
        let total = total.max(0);
        let pages = (total + request.limit - 1) / request.limit;
        Self {
            page: request.page,
            pages,
            total,
            limit: request.limit,
        }
    }

    pub fn is_past_end(&self) -> bool {
        self.page > self.pages
    }
}

// ==================== QUERY BUILDER ====================

/// Accumulates `AND`-joined conditions with their text parameters and renders
/// matching COUNT and page queries. Callers bind the returned parameters in
/// order, then `limit` and `offset` for the page query.
#[derive(Debug, Clone)]
pub struct OffsetQueryBuilder {
    from: String,
    select_columns: String,
    order_by: String,
    conditions: Vec<String>,
    params: Vec<String>,
}

impl OffsetQueryBuilder {
    pub fn new(from: &str) -> Self {
        Self {
            from: from.to_string(),
            select_columns: "*".to_string(),
            order_by: "created_at DESC".to_string(),
            conditions: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select_columns = columns.to_string();
        self
    }

    pub fn order_by(mut self, order_by: &str) -> Self {
        self.order_by = order_by.to_string();
        self
    }

    pub fn add_condition(&mut self, condition: &str, param: String) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.params.push(param);
        self
    }

    pub fn add_raw_condition(&mut self, condition: &str) -> &mut Self {
        self.conditions.push(condition.to_string());
        self
    }

    /// Condition with several placeholders, e.g. a LIKE over multiple columns.
    pub fn add_condition_with_params(&mut self, condition: &str, params: Vec<String>) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.params.extend(params);
        self
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn build_count(&self) -> (String, Vec<String>) {
        let sql = format!("SELECT COUNT(*) FROM {}{}", self.from, self.where_clause());
        (sql, self.params.clone())
    }

    pub fn build_page(&self) -> (String, Vec<String>) {
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
            self.select_columns,
            self.from,
            self.where_clause(),
            self.order_by,
        );
        (sql, self.params.clone())
    }
}

/// Escapes `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults_and_clamping() {
        let req = PageRequest::new(None, None, 12, 100);
        assert_eq!(req, PageRequest { page: 1, limit: 12 });
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(Some(0), Some(1000), 12, 100);
        assert_eq!(req, PageRequest { page: 1, limit: 100 });

        let req = PageRequest::new(Some(3), Some(10), 12, 100);
        assert_eq!(req.offset(), 20);
    }

    #[test]
    fn test_pagination_counts_pages() {
        let req = PageRequest::new(Some(1), Some(12), 12, 100);
        assert_eq!(Pagination::from_total(0, &req).pages, 0);
        assert_eq!(Pagination::from_total(12, &req).pages, 1);
        assert_eq!(Pagination::from_total(13, &req).pages, 2);
    }

    #[test]
    fn test_page_past_end_echoes_requested_page() {
        let req = PageRequest::new(Some(9), Some(12), 12, 100);
        let pagination = Pagination::from_total(30, &req);
        assert_eq!(pagination.page, 9);
        assert_eq!(pagination.pages, 3);
        assert!(pagination.is_past_end());
    }

    #[test]
    fn test_builder_count_and_page_share_params() {
        let mut builder = OffsetQueryBuilder::new("materials m")
            .select("m.id")
            .order_by("m.name ASC");
        builder
            .add_raw_condition("m.is_active = 1")
            .add_condition("m.unit = ?", "kg".to_string())
            .add_condition_with_params(
                "(m.name LIKE ? ESCAPE '\\' OR m.material_code LIKE ? ESCAPE '\\')",
                vec!["%pet%".to_string(), "%pet%".to_string()],
            );

        let (count_sql, count_params) = builder.build_count();
        assert!(count_sql.starts_with("SELECT COUNT(*) FROM materials m WHERE m.is_active = 1 AND"));
        assert_eq!(count_params.len(), 3);

        let (sql, params) = builder.build_page();
        assert!(sql.ends_with("ORDER BY m.name ASC LIMIT ? OFFSET ?"));
        assert_eq!(params, count_params);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rPET"), "%rPET%");
        assert_eq!(like_pattern("100%_pcr"), "%100\\%\\_pcr%");
    }
}
