//! Query parameter parsing, filtering and pagination
//!
//! [`ArgumentParser::parse`] turns a request's raw query parameters into a
//! typed [`QueryDescriptor`]. Every recognized option is guaranteed present
//! with a default even when absent from the input, so downstream code never
//! branches on "key missing". Filter fields are validated against an explicit
//! allow-list per entity; unknown fields are silently dropped and never
//! forwarded to storage.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel page size meaning "all matching records", capped server-side.
pub const UNBOUNDED: i64 = -1;

/// Parameter names consumed by the parser itself. Everything else is either
/// an allow-listed filter field or dropped.
const RESERVED: &[&str] = &[
    "page", "per_page", "order", "q", "intent", "next", "render", "out", "debug", "method",
];

/// Filter operators, parsed from `field__op` suffixes (`eq` is implicit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Exists,
    Contains,
}

impl FilterOp {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "eq" => Some(FilterOp::Eq),
            "ne" => Some(FilterOp::Ne),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "in" => Some(FilterOp::In),
            "exists" => Some(FilterOp::Exists),
            "contains" => Some(FilterOp::Contains),
            _ => None,
        }
    }
}

/// A single `(field, operator, value)` filter clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// An ordering key, parsed from `field` or `field:desc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub field: String,
    pub descending: bool,
}

/// Per-entity configuration enumerating the recognized options.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Page size applied when the request does not name one
    pub default_page_size: usize,
    /// Hard cap applied to the unbounded sentinel and oversized requests
    pub max_page_size: usize,
    /// Allow-listed sortable field names
    pub sortable: BTreeSet<String>,
    /// Allow-listed filterable field names
    pub filterable: BTreeSet<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 1000,
            sortable: BTreeSet::new(),
            filterable: BTreeSet::new(),
        }
    }
}

impl QueryOptions {
    pub fn with_sortable<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.sortable = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filterable<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        fields: I,
    ) -> Self {
        self.filterable = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// The typed, validated query configuration for one request.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    /// Page number, always ≥ 1
    pub page: usize,
    /// Requested page size; [`UNBOUNDED`] means all records up to the cap
    pub page_size: i64,
    /// Validated ordering keys, in request order
    pub order: Vec<OrderKey>,
    /// Free-text query string
    pub free_text: Option<String>,
    /// Ordered filter clauses over allow-listed fields
    pub clauses: Vec<FilterClause>,
    /// Desired next verb, used to pre-render the right form
    pub intent: Option<String>,
    /// Post-success redirect target, validated to be same-origin
    pub next: Option<String>,
    /// Forced representation (`json` or `view`), overriding Accept
    pub render: Option<String>,
    /// Root template hint for view responses (page / modal / fragment)
    pub out: Option<String>,
    pub debug: bool,
}

impl QueryDescriptor {
    /// The effective row limit after applying the cap.
    pub fn limit(&self, options: &QueryOptions) -> usize {
        if self.page_size == UNBOUNDED {
            options.max_page_size
        } else {
            (self.page_size as usize).min(options.max_page_size)
        }
    }

    /// The row offset implied by the page number.
    ///
    /// Saturates rather than overflows: a page far beyond the data simply
    /// skips every row and yields an empty set.
    pub fn offset(&self, options: &QueryOptions) -> usize {
        // An unbounded query always starts at the first record
        if self.page_size == UNBOUNDED {
            0
        } else {
            self.page.saturating_sub(1).saturating_mul(self.limit(options))
        }
    }
}

/// Parses raw query parameters against a [`QueryOptions`] configuration.
pub struct ArgumentParser;

impl ArgumentParser {
    pub fn parse(raw: &HashMap<String, String>, options: &QueryOptions) -> QueryDescriptor {
        let page = raw
            .get("page")
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1) as usize;

        // 0 or negative (other than the unbounded sentinel) clamps to the
        // default, never errors.
        let page_size = raw
            .get("per_page")
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|s| *s == UNBOUNDED || *s > 0)
            .unwrap_or(options.default_page_size as i64);

        let order = raw
            .get("order")
            .map(|s| Self::parse_order(s, options))
            .unwrap_or_default();

        let free_text = raw.get("q").filter(|s| !s.is_empty()).cloned();

        let clauses = Self::parse_clauses(raw, options);

        QueryDescriptor {
            page,
            page_size,
            order,
            free_text,
            clauses,
            intent: raw.get("intent").filter(|s| !s.is_empty()).cloned(),
            next: raw.get("next").and_then(|s| Self::same_origin(s)),
            render: raw.get("render").filter(|s| !s.is_empty()).cloned(),
            out: raw.get("out").filter(|s| !s.is_empty()).cloned(),
            debug: raw.get("debug").is_some_and(|s| s == "1" || s == "true"),
        }
    }

    /// Validate ordering keys against the sortable allow-list; invalid keys
    /// are dropped.
    fn parse_order(raw: &str, options: &QueryOptions) -> Vec<OrderKey> {
        raw.split(',')
            .filter_map(|part| {
                let part = part.trim();
                let (field, descending) = match part.split_once(':') {
                    Some((f, "desc")) => (f, true),
                    Some((f, _)) => (f, false),
                    None => (part, false),
                };
                if options.sortable.contains(field) {
                    Some(OrderKey {
                        field: field.to_string(),
                        descending,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Capture unrecognized parameters matching allow-listed filterable
    /// fields (optionally suffixed with an operator token) into filter
    /// clauses. Everything else is dropped. Clauses are emitted in sorted
    /// key order so identical requests parse identically.
    fn parse_clauses(raw: &HashMap<String, String>, options: &QueryOptions) -> Vec<FilterClause> {
        let mut keys: Vec<&String> = raw
            .keys()
            .filter(|k| !RESERVED.contains(&k.as_str()))
            .collect();
        keys.sort();

        keys.into_iter()
            .filter_map(|key| {
                let (field, op) = match key.split_once("__") {
                    Some((field, token)) => (field, FilterOp::from_token(token)?),
                    None => (key.as_str(), FilterOp::Eq),
                };
                if !options.filterable.contains(field) {
                    return None;
                }
                let value = Self::coerce_value(op, &raw[key]);
                Some(FilterClause {
                    field: field.to_string(),
                    op,
                    value,
                })
            })
            .collect()
    }

    /// Coerce a raw parameter string into a typed JSON value. Numbers and
    /// booleans are recognized; everything else stays a string. `in` values
    /// split on commas.
    fn coerce_value(op: FilterOp, raw: &str) -> Value {
        match op {
            FilterOp::In => Value::Array(raw.split(',').map(|v| Self::scalar(v.trim())).collect()),
            FilterOp::Exists => Value::Bool(raw != "false" && raw != "0"),
            _ => Self::scalar(raw),
        }
    }

    fn scalar(raw: &str) -> Value {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::from(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Value::from(f);
        }
        match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        }
    }

    /// Accept only same-origin redirect targets: absolute paths that are not
    /// protocol-relative.
    fn same_origin(target: &str) -> Option<String> {
        if target.starts_with('/') && !target.starts_with("//") {
            Some(target.to_string())
        } else {
            None
        }
    }
}

/// Pagination metadata attached to collection responses.
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        let limit = limit.max(1);
        let total_pages = if total == 0 { 0 } else { total.div_ceil(limit) };
        let start = page.saturating_sub(1).saturating_mul(limit);

        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: start.saturating_add(limit) < total,
            has_prev: page > 1,
        }
    }
}
