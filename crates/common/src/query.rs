//! Filtered, ordered and paginated listing queries.
//!
//! A [`ListQuery`] is built either programmatically or from raw key/value
//! parameters using these conventions:
//!
//! - `field=value` equality, `*` in a text value makes it a wildcard match
//! - `_min_<field>` / `_max_<field>` inclusive range bounds
//! - `_order="date desc, user_id"`
//! - `_page` (1-based) and `_size`
//!
//! Field names are checked against the [`FieldSpec`] schema of the listed
//! document, so storage can embed them in queries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Type of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Timestamp,
    Uuid,
    Bool,
}

/// A field that documents expose for filtering and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

fn lookup(schema: &[FieldSpec], name: &str) -> Result<FieldSpec, QueryError> {
    schema
        .iter()
        .find(|spec| spec.name == name)
        .copied()
        .ok_or_else(|| QueryError::UnknownField(name.to_string()))
}

/// Errors raised while building or checking a list query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("invalid value '{value}' for field '{field}' (expected {expected:?})")]
    InvalidValue {
        field: String,
        value: String,
        expected: FieldKind,
    },

    #[error("wildcards are only supported on text fields, not '{0}'")]
    WildcardNotSupported(String),

    #[error("invalid ordering '{0}'")]
    InvalidOrder(String),

    #[error("invalid paging: {0}")]
    InvalidPaging(String),
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Bool(bool),
}

impl FieldValue {
    /// Parses a raw parameter for a field of the given kind.
    pub fn parse(field: &str, kind: FieldKind, raw: &str) -> Result<Self, QueryError> {
        let invalid = || QueryError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            expected: kind,
        };
        let raw = raw.trim();
        Ok(match kind {
            FieldKind::Text => FieldValue::Text(raw.to_string()),
            FieldKind::Integer => FieldValue::Integer(raw.parse().map_err(|_| invalid())?),
            FieldKind::Decimal => FieldValue::Decimal(raw.parse().map_err(|_| invalid())?),
            FieldKind::Timestamp => FieldValue::Timestamp(
                DateTime::parse_from_rfc3339(raw)
                    .map(|t| t.with_timezone(&Utc))
                    .or_else(|_| {
                        chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| {
                            d.and_hms_opt(0, 0, 0)
                                .map(|t| t.and_utc())
                                .unwrap_or_default()
                        })
                    })
                    .map_err(|_| invalid())?,
            ),
            FieldKind::Uuid => FieldValue::Uuid(raw.parse().map_err(|_| invalid())?),
            FieldKind::Bool => FieldValue::Bool(raw.parse().map_err(|_| invalid())?),
        })
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Decimal(_) => FieldKind::Decimal,
            FieldValue::Timestamp(_) => FieldKind::Timestamp,
            FieldValue::Uuid(_) => FieldKind::Uuid,
            FieldValue::Bool(_) => FieldKind::Bool,
        }
    }

    /// Textual form used when binding the value as a query parameter.
    pub fn to_query_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(n) => n.to_string(),
            FieldValue::Decimal(d) => d.to_string(),
            FieldValue::Timestamp(t) => t.to_rfc3339(),
            FieldValue::Uuid(u) => u.to_string(),
            FieldValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        FieldValue::Decimal(d)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(t: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(t)
    }
}

impl From<Uuid> for FieldValue {
    fn from(u: Uuid) -> Self {
        FieldValue::Uuid(u)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// A single listing predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq {
        field: &'static str,
        value: FieldValue,
    },
    Min {
        field: &'static str,
        value: FieldValue,
    },
    Max {
        field: &'static str,
        value: FieldValue,
    },
    /// Case-insensitive match where `*` stands for any run of characters.
    Like {
        field: &'static str,
        pattern: String,
    },
    /// Matches documents carrying the given index term.
    Term(String),
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Filter::Eq {
            field,
            value: value.into(),
        }
    }

    pub fn min(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Filter::Min {
            field,
            value: value.into(),
        }
    }

    pub fn max(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Filter::Max {
            field,
            value: value.into(),
        }
    }

    pub fn like(field: &'static str, pattern: impl Into<String>) -> Self {
        Filter::Like {
            field,
            pattern: pattern.into(),
        }
    }

    pub fn term(term: impl Into<String>) -> Self {
        Filter::Term(term.into())
    }

    /// Field the filter reads, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Filter::Eq { field, .. }
            | Filter::Min { field, .. }
            | Filter::Max { field, .. }
            | Filter::Like { field, .. } => Some(*field),
            Filter::Term(_) => None,
        }
    }

    /// Evaluates the filter against a document's field accessor and terms.
    pub fn matches<F>(&self, field_value: F, terms: &[String]) -> bool
    where
        F: Fn(&str) -> Option<FieldValue>,
    {
        match self {
            Filter::Eq { field, value } => field_value(*field).is_some_and(|v| &v == value),
            Filter::Min { field, value } => field_value(*field).is_some_and(|v| v >= *value),
            Filter::Max { field, value } => field_value(*field).is_some_and(|v| v <= *value),
            Filter::Like { field, pattern } => match field_value(*field) {
                Some(FieldValue::Text(text)) => wildcard_match(pattern, &text),
                _ => false,
            },
            Filter::Term(term) => terms.iter().any(|t| t == term),
        }
    }

    fn check(&self, schema: &[FieldSpec]) -> Result<(), QueryError> {
        match self {
            Filter::Eq { field, value }
            | Filter::Min { field, value }
            | Filter::Max { field, value } => {
                let spec = lookup(schema, field)?;
                if spec.kind != value.kind() {
                    return Err(QueryError::InvalidValue {
                        field: field.to_string(),
                        value: value.to_query_text(),
                        expected: spec.kind,
                    });
                }
                Ok(())
            }
            Filter::Like { field, .. } => {
                if lookup(schema, field)?.kind != FieldKind::Text {
                    return Err(QueryError::WildcardNotSupported(field.to_string()));
                }
                Ok(())
            }
            Filter::Term(_) => Ok(()),
        }
    }
}

/// Case-insensitive glob match supporting `*` only.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) {
        return false;
    }
    let mut rest = &text[first.len()..];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// One ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: &'static str) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: &'static str) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    /// Parses `"date desc, user_id"` against a schema.
    pub fn parse_list(schema: &[FieldSpec], raw: &str) -> Result<Vec<OrderBy>, QueryError> {
        let mut order = Vec::new();
        for term in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let mut words = term.split_whitespace();
            let name = words
                .next()
                .ok_or_else(|| QueryError::InvalidOrder(term.to_string()))?;
            let descending = match words.next().map(str::to_ascii_lowercase).as_deref() {
                None | Some("asc") => false,
                Some("desc") => true,
                Some(_) => return Err(QueryError::InvalidOrder(term.to_string())),
            };
            if words.next().is_some() {
                return Err(QueryError::InvalidOrder(term.to_string()));
            }
            let spec = lookup(schema, name)?;
            order.push(OrderBy {
                field: spec.name,
                descending,
            });
        }
        Ok(order)
    }
}

/// A filtered, ordered, paginated listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub page: u32,
    pub size: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order_by: Vec::new(),
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query returning every match on one page of the maximum size.
    pub fn all() -> Self {
        Self {
            size: MAX_PAGE_SIZE,
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Number of records skipped before the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }

    /// Checks paging bounds and that every field exists with a matching type.
    pub fn validate(&self, schema: &[FieldSpec]) -> Result<(), QueryError> {
        if self.page == 0 {
            return Err(QueryError::InvalidPaging("page must be at least 1".into()));
        }
        if self.size == 0 || self.size > MAX_PAGE_SIZE {
            return Err(QueryError::InvalidPaging(format!(
                "size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        for filter in &self.filters {
            filter.check(schema)?;
        }
        for order in &self.order_by {
            lookup(schema, order.field)?;
        }
        Ok(())
    }

    /// Builds a query from raw request parameters.
    pub fn parse<I, K, V>(schema: &[FieldSpec], params: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = ListQuery::new();
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "_page" => {
                    query.page = value
                        .trim()
                        .parse()
                        .map_err(|_| QueryError::InvalidPaging(format!("_page={value}")))?;
                }
                "_size" => {
                    query.size = value
                        .trim()
                        .parse()
                        .map_err(|_| QueryError::InvalidPaging(format!("_size={value}")))?;
                }
                "_order" => query.order_by = OrderBy::parse_list(schema, value)?,
                _ => {
                    if let Some(name) = key.strip_prefix("_min_") {
                        let spec = lookup(schema, name)?;
                        let value = FieldValue::parse(name, spec.kind, value)?;
                        query.filters.push(Filter::min(spec.name, value));
                    } else if let Some(name) = key.strip_prefix("_max_") {
                        let spec = lookup(schema, name)?;
                        let value = FieldValue::parse(name, spec.kind, value)?;
                        query.filters.push(Filter::max(spec.name, value));
                    } else {
                        let spec = lookup(schema, key)?;
                        if value.contains('*') {
                            if spec.kind != FieldKind::Text {
                                return Err(QueryError::WildcardNotSupported(key.to_string()));
                            }
                            query.filters.push(Filter::like(spec.name, value));
                        } else {
                            let value = FieldValue::parse(key, spec.kind, value)?;
                            query.filters.push(Filter::eq(spec.name, value));
                        }
                    }
                }
            }
        }
        query.validate(schema)?;
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[FieldSpec] = &[
        FieldSpec::new("title", FieldKind::Text),
        FieldSpec::new("price", FieldKind::Decimal),
        FieldSpec::new("number", FieldKind::Integer),
        FieldSpec::new("date", FieldKind::Timestamp),
    ];

    #[test]
    fn parse_builds_filters_order_and_paging() {
        let query = ListQuery::parse(
            SCHEMA,
            [
                ("title", "Shirt*"),
                ("_min_price", "10.5"),
                ("_max_number", "40"),
                ("_order", "date desc, title"),
                ("_page", "2"),
                ("_size", "5"),
            ],
        )
        .unwrap();

        assert_eq!(query.page, 2);
        assert_eq!(query.size, 5);
        assert_eq!(query.offset(), 5);
        assert_eq!(
            query.filters,
            vec![
                Filter::like("title", "Shirt*"),
                Filter::min("price", Decimal::new(105, 1)),
                Filter::max("number", 40i64),
            ]
        );
        assert_eq!(
            query.order_by,
            vec![OrderBy::desc("date"), OrderBy::asc("title")]
        );
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let err = ListQuery::parse(SCHEMA, [("colour", "red")]).unwrap_err();
        assert_eq!(err, QueryError::UnknownField("colour".into()));

        let err = ListQuery::parse(SCHEMA, [("_order", "colour desc")]).unwrap_err();
        assert_eq!(err, QueryError::UnknownField("colour".into()));
    }

    #[test]
    fn parse_rejects_malformed_values() {
        assert!(matches!(
            ListQuery::parse(SCHEMA, [("_min_price", "cheap")]),
            Err(QueryError::InvalidValue { .. })
        ));
        assert!(matches!(
            ListQuery::parse(SCHEMA, [("number", "4*")]),
            Err(QueryError::WildcardNotSupported(_))
        ));
        assert!(matches!(
            ListQuery::parse(SCHEMA, [("_order", "title sideways")]),
            Err(QueryError::InvalidOrder(_))
        ));
        assert!(matches!(
            ListQuery::parse(SCHEMA, [("_size", "500")]),
            Err(QueryError::InvalidPaging(_))
        ));
        assert!(matches!(
            ListQuery::parse(SCHEMA, [("_page", "0")]),
            Err(QueryError::InvalidPaging(_))
        ));
    }

    #[test]
    fn parse_accepts_plain_dates() {
        let query = ListQuery::parse(SCHEMA, [("_min_date", "2024-03-01")]).unwrap();
        let Filter::Min { value, .. } = &query.filters[0] else {
            panic!("expected a min filter");
        };
        assert_eq!(
            value,
            &FieldValue::Timestamp("2024-03-01T00:00:00Z".parse().unwrap())
        );
    }

    #[test]
    fn validate_rejects_kind_mismatch() {
        let query = ListQuery::new().filter(Filter::eq("number", "seven"));
        assert!(matches!(
            query.validate(SCHEMA),
            Err(QueryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn filters_match_field_values() {
        let fields = |name: &str| match name {
            "title" => Some(FieldValue::Text("Blue Shirt".into())),
            "number" => Some(FieldValue::Integer(7)),
            _ => None,
        };
        let terms = vec!["product:1".to_string()];

        assert!(Filter::eq("number", 7i64).matches(fields, &terms));
        assert!(Filter::min("number", 7i64).matches(fields, &terms));
        assert!(!Filter::max("number", 6i64).matches(fields, &terms));
        assert!(Filter::like("title", "*shirt").matches(fields, &terms));
        assert!(!Filter::like("title", "red*").matches(fields, &terms));
        assert!(Filter::term("product:1").matches(fields, &terms));
        assert!(!Filter::term("product:2").matches(fields, &terms));
        assert!(!Filter::eq("missing", 1i64).matches(fields, &terms));
    }

    #[test]
    fn wildcard_patterns() {
        assert!(wildcard_match("abc", "ABC"));
        assert!(wildcard_match("a*", "apple"));
        assert!(wildcard_match("*le", "apple"));
        assert!(wildcard_match("*pp*", "apple"));
        assert!(wildcard_match("a*p*e", "apple"));
        assert!(!wildcard_match("a*x", "apple"));
        assert!(!wildcard_match("ab*ba", "aba"));
    }
}
