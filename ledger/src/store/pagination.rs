//! Cursor-based pagination for list queries.

use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;

/// A page request. `key` is the opaque cursor returned as `next_key` by the
/// previous page; `limit == 0` selects the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub key: Option<Vec<u8>>,
    pub limit: u64,
    pub count_total: bool,
}

impl PageRequest {
    pub fn first(limit: u64) -> Self {
        Self {
            key: None,
            limit,
            count_total: false,
        }
    }

    /// Continues from a previous response's cursor.
    pub fn after(key: Vec<u8>, limit: u64) -> Self {
        Self {
            key: Some(key),
            limit,
            count_total: false,
        }
    }

    pub fn with_total(mut self) -> Self {
        self.count_total = true;
        self
    }

    /// Requested limit, defaulted and clamped to the configured maximum.
    pub fn effective_limit(&self, cfg: &PaginationConfig) -> usize {
        let limit = if self.limit == 0 {
            cfg.default_limit
        } else {
            self.limit.min(cfg.max_limit)
        };
        usize::try_from(limit).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    /// Cursor for the next page; `None` on the last page.
    pub next_key: Option<Vec<u8>>,
    /// Total matching rows, only when requested on the first page.
    pub total: Option<u64>,
}
