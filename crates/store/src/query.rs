//! Path queries over the authenticated store.

use std::ops::{Range, RangeFrom, RangeInclusive, RangeTo, RangeToInclusive};

/// A single key selector evaluated against the raw keys under one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryItem {
    Key(Vec<u8>),
    Range(Range<Vec<u8>>),
    RangeInclusive(RangeInclusive<Vec<u8>>),
    RangeFull,
    RangeFrom(RangeFrom<Vec<u8>>),
    RangeTo(RangeTo<Vec<u8>>),
    RangeToInclusive(RangeToInclusive<Vec<u8>>),
    /// Keys strictly greater than the start.
    RangeAfter(RangeFrom<Vec<u8>>),
    /// Keys strictly greater than the start and strictly less than the end.
    RangeAfterTo(Range<Vec<u8>>),
    /// Keys strictly greater than the start and up to the end inclusive.
    RangeAfterToInclusive(RangeInclusive<Vec<u8>>),
}

impl QueryItem {
    pub fn contains(&self, key: &[u8]) -> bool {
        match self {
            QueryItem::Key(k) => k.as_slice() == key,
            QueryItem::Range(r) => r.start.as_slice() <= key && key < r.end.as_slice(),
            QueryItem::RangeInclusive(r) => {
                r.start().as_slice() <= key && key <= r.end().as_slice()
            }
            QueryItem::RangeFull => true,
            QueryItem::RangeFrom(r) => r.start.as_slice() <= key,
            QueryItem::RangeTo(r) => key < r.end.as_slice(),
            QueryItem::RangeToInclusive(r) => key <= r.end.as_slice(),
            QueryItem::RangeAfter(r) => r.start.as_slice() < key,
            QueryItem::RangeAfterTo(r) => r.start.as_slice() < key && key < r.end.as_slice(),
            QueryItem::RangeAfterToInclusive(r) => {
                r.start().as_slice() < key && key <= r.end().as_slice()
            }
        }
    }
}

/// A set of key selectors plus the traversal direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub items: Vec<QueryItem>,
    pub left_to_right: bool,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            left_to_right: true,
        }
    }

    pub fn new_with_direction(left_to_right: bool) -> Self {
        Self {
            items: Vec::new(),
            left_to_right,
        }
    }

    pub fn insert_key(&mut self, key: Vec<u8>) {
        self.items.push(QueryItem::Key(key));
    }

    pub fn insert_item(&mut self, item: QueryItem) {
        self.items.push(item);
    }

    pub fn insert_all(&mut self) {
        self.items.push(QueryItem::RangeFull);
    }

    pub fn matches(&self, key: &[u8]) -> bool {
        self.items.iter().any(|item| item.contains(key))
    }
}

/// A query scoped to one path with optional paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    pub path: Vec<Vec<u8>>,
    pub query: Query,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PathQuery {
    pub fn new(path: Vec<Vec<u8>>, query: Query) -> Self {
        Self {
            path,
            query,
            limit: None,
            offset: None,
        }
    }

    pub fn new_unsized(path: Vec<Vec<u8>>, query: Query) -> Self {
        Self::new(path, query)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn path_segments(&self) -> Vec<&[u8]> {
        self.path.iter().map(Vec::as_slice).collect()
    }

    /// Filters key-sorted entries, then applies direction, offset and limit.
    pub(crate) fn apply(&self, sorted: Vec<(Vec<u8>, Vec<u8>)>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut matched: Vec<_> = sorted
            .into_iter()
            .filter(|(key, _)| self.query.matches(key))
            .collect();
        if !self.query.left_to_right {
            matched.reverse();
        }
        matched
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}
