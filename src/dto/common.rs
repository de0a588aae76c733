use serde::{Deserialize, Serialize};

/// Envelope for successful admin responses:
/// `{"success": true, "data": ..., "message"?, "pagination"?}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            pagination: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.into()),
            pagination: None,
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data,
            message: None,
            pagination: Some(pagination),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };
        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// `?page=&per_page=` accepted by list endpoints.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageQuery {
    /// Clamped (page, per_page, limit, offset).
    pub fn resolve(&self) -> (i64, i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let limit = per_page;
        let offset = (page - 1) * per_page;
        (page, per_page, limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_up() {
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).total_pages, 1);
        assert_eq!(Pagination::new(1, 20, 21).total_pages, 2);
    }

    #[test]
    fn page_query_clamps() {
        let q = PageQuery {
            page: Some(0),
            per_page: Some(1000),
        };
        let (page, per_page, limit, offset) = q.resolve();
        assert_eq!(page, 1);
        assert_eq!(per_page, 100);
        assert_eq!(limit, 100);
        assert_eq!(offset, 0);

        let q = PageQuery {
            page: Some(3),
            per_page: Some(10),
        };
        let (_, _, limit, offset) = q.resolve();
        assert_eq!(limit, 10);
        assert_eq!(offset, 20);
    }
}
