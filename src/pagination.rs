//! Opaque cursors for paged queries over ordered key spaces.
//!
//! A cursor encodes the sort key and id of the last item a page returned.
//! Because sort keys (timestamps) are not unique, the item id acts as a
//! tie-breaker: pages keep making forward progress even when rows with an
//! identical sort key are inserted mid-walk.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

/// Opaque resume position in an ordered paged query.
///
/// Callers treat the token as a black box; only the store that issued a
/// cursor interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    /// Build a cursor from the last returned item's `(sort_key, item_id)`.
    pub fn new(sort_key: DateTime<Utc>, item_id: Uuid) -> Self {
        let raw = format!("{}:{}", sort_key.timestamp_micros(), item_id);
        PageCursor(general_purpose::STANDARD.encode(raw))
    }

    /// Decode the `(sort_key, item_id)` pair this cursor was built from.
    pub fn parts(&self) -> ServiceResult<(DateTime<Utc>, Uuid)> {
        let decoded = general_purpose::STANDARD
            .decode(&self.0)
            .map_err(|_| ServiceError::InvalidInput("invalid cursor format".to_string()))?;
        let raw = String::from_utf8(decoded)
            .map_err(|_| ServiceError::InvalidInput("invalid cursor encoding".to_string()))?;
        let (micros, id) = raw
            .split_once(':')
            .ok_or_else(|| ServiceError::InvalidInput("invalid cursor value".to_string()))?;
        let micros: i64 = micros
            .parse()
            .map_err(|_| ServiceError::InvalidInput("invalid cursor sort key".to_string()))?;
        let sort_key = DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| ServiceError::InvalidInput("cursor sort key out of range".to_string()))?;
        let item_id = Uuid::parse_str(id)
            .map_err(|_| ServiceError::InvalidInput("invalid cursor item id".to_string()))?;
        Ok((sort_key, item_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of an ordered query result. `next_cursor = None` signals the
/// end of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<PageCursor>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Page {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Build a page from a `page_size + 1` lookahead fetch: when the store
    /// returned more rows than requested, truncate to `page_size` and point
    /// the cursor at the last kept item.
    pub fn from_lookahead(
        mut rows: Vec<T>,
        page_size: usize,
        cursor_of: impl Fn(&T) -> PageCursor,
    ) -> Self {
        if rows.len() > page_size {
            rows.truncate(page_size);
            let next_cursor = rows.last().map(&cursor_of);
            Page {
                items: rows,
                next_cursor,
            }
        } else {
            Page {
                items: rows,
                next_cursor: None,
            }
        }
    }
}
