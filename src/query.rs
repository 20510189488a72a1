//! Query options, filters and paginated results.
//!
//! Filters are typed conditions rather than ad-hoc strings, so every
//! backend receives the same structure: the relational backend renders
//! them to parameterized SQL, the memory backend evaluates them directly.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::value::FieldValue;

/// Hard cap on result set size; larger requests are clamped.
pub const MAX_LIMIT: usize = 1000;

/// Sort order for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// A typed filter condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Eq(String, FieldValue),
    Ne(String, FieldValue),
    Gt(String, FieldValue),
    Gte(String, FieldValue),
    Lt(String, FieldValue),
    Lte(String, FieldValue),
    In(String, Vec<FieldValue>),
    /// SQL-style pattern with `%` wildcards.
    Like(String, String),
    IsNull(String),
    NotNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Equality shorthand.
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    /// Combine with another filter under `And`.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Evaluate the filter against an in-memory record.
    ///
    /// An absent field behaves like `Null`: it matches `IsNull`, fails
    /// ordered comparisons and equals nothing but `Null`.
    pub fn matches(&self, record: &Record) -> bool {
        self.matches_fields(record.fields())
    }

    pub(crate) fn matches_fields(
        &self,
        fields: &std::collections::BTreeMap<String, FieldValue>,
    ) -> bool {
        match self {
            Filter::Eq(field, value) => match fields.get(field) {
                Some(current) => current == value,
                None => value.is_null(),
            },
            Filter::Ne(field, value) => {
                !Filter::Eq(field.clone(), value.clone()).matches_fields(fields)
            }
            Filter::Gt(field, value) => compare_field(fields, field, value)
                .is_some_and(|ordering| ordering == Ordering::Greater),
            Filter::Gte(field, value) => compare_field(fields, field, value)
                .is_some_and(|ordering| ordering != Ordering::Less),
            Filter::Lt(field, value) => compare_field(fields, field, value)
                .is_some_and(|ordering| ordering == Ordering::Less),
            Filter::Lte(field, value) => compare_field(fields, field, value)
                .is_some_and(|ordering| ordering != Ordering::Greater),
            Filter::In(field, values) => fields
                .get(field)
                .is_some_and(|current| values.contains(current)),
            Filter::Like(field, pattern) => fields
                .get(field)
                .and_then(FieldValue::as_str)
                .is_some_and(|text| like_match(pattern, text)),
            Filter::IsNull(field) => fields.get(field).is_none_or(FieldValue::is_null),
            Filter::NotNull(field) => fields.get(field).is_some_and(|v| !v.is_null()),
            Filter::And(filters) => filters.iter().all(|filter| filter.matches_fields(fields)),
            Filter::Or(filters) => filters.iter().any(|filter| filter.matches_fields(fields)),
        }
    }
}

fn compare_field(
    fields: &std::collections::BTreeMap<String, FieldValue>,
    field: &str,
    value: &FieldValue,
) -> Option<Ordering> {
    fields.get(field)?.compare(value)
}

/// Case-insensitive SQL LIKE match supporting `%` wildcards.
pub(crate) fn like_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();

    if !pattern.contains('%') {
        return pattern == text;
    }

    let segments: Vec<&str> = pattern.split('%').collect();
    let mut rest = text.as_str();

    for (index, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if index == 0 {
            // Anchored prefix.
            match rest.strip_prefix(segment) {
                Some(remaining) => rest = remaining,
                None => return false,
            }
        } else if index == segments.len() - 1 {
            // Anchored suffix.
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(position) => rest = &rest[position + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Options for list and lookup queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub filter: Option<Filter>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// 1-based page number; when set, the offset is derived from it.
    pub page: Option<usize>,
    /// Include soft-deleted records.
    pub with_deleted: bool,
    /// Cache entry lifetime in seconds for read-through caching.
    pub cache_ttl: Option<u64>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    pub fn cache_ttl(mut self, seconds: u64) -> Self {
        self.cache_ttl = Some(seconds);
        self
    }

    /// Requested limit clamped to [`MAX_LIMIT`].
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(limit) if limit > 0 && limit < MAX_LIMIT => limit,
            _ => MAX_LIMIT,
        }
    }

    /// Offset derived from `page` when present, else the explicit offset.
    pub fn effective_offset(&self) -> usize {
        match self.page {
            Some(page) => page.saturating_sub(1) * self.effective_limit(),
            None => self.offset.unwrap_or(0),
        }
    }

    /// Narrow the filter with an additional condition.
    pub(crate) fn and_filter(mut self, extra: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(extra),
            None => extra,
        });
        self
    }
}

/// One page of a paginated list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total count of matching items before pagination.
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}
