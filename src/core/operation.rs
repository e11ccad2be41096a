//! Canonical operation vocabulary
//!
//! Every inbound request is normalized to exactly one [`Operation`] before
//! authorization runs. There is a single translation table from HTTP verb +
//! route kind to operation; no other part of the engine maps verbs itself.

use axum::http::Method;
use serde::{Deserialize, Serialize};

/// The kind of route a request matched: the collection URL or an item URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// The plural collection route (e.g. `/articles`)
    Collection,
    /// A single-item route parameterized by an identifier (e.g. `/articles/{id}`)
    Item,
}

/// Canonical action, independent of HTTP verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// List the collection
    List,
    /// View a single resource (or an empty creation form when no resource is given)
    View,
    /// Create a new resource
    Create,
    /// Partial update: only submitted fields are written
    Edit,
    /// Full update: absent fields reset to schema defaults
    Replace,
    /// Delete a resource. Authorized under the same predicate as Edit.
    Delete,
    /// An entity-specific custom operation, named at route registration
    Custom(String),
}

impl Operation {
    /// Whether this operation mutates persisted state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Edit | Operation::Replace | Operation::Delete
        )
    }

    /// The action name used in audit entries and logs.
    pub fn action(&self) -> &str {
        match self {
            Operation::List => "list",
            Operation::View => "view",
            Operation::Create => "create",
            Operation::Edit => "edit",
            Operation::Replace => "replace",
            Operation::Delete => "delete",
            Operation::Custom(name) => name,
        }
    }
}

/// Apply the method override rule: a POST carrying a `method` query parameter
/// whose value is one of PUT, PATCH or DELETE is treated as that verb.
///
/// Any other value leaves the request a POST.
pub fn effective_method(method: &Method, method_override: Option<&str>) -> Method {
    if *method != Method::POST {
        return method.clone();
    }
    match method_override {
        Some("PUT") => Method::PUT,
        Some("PATCH") => Method::PATCH,
        Some("DELETE") => Method::DELETE,
        _ => Method::POST,
    }
}

/// The canonical translation table.
///
/// | Verb   | Collection | Item    |
/// |--------|------------|---------|
/// | GET    | List       | View    |
/// | POST   | Create     | —       |
/// | PATCH  | —          | Edit    |
/// | PUT    | —          | Replace |
/// | DELETE | —          | Delete  |
///
/// Returns `None` for combinations the table does not define; the router
/// never registers those, so a `None` here means a malformed dispatch.
pub fn operation_for(method: &Method, kind: RouteKind) -> Option<Operation> {
    match (method, kind) {
        (&Method::GET, RouteKind::Collection) => Some(Operation::List),
        (&Method::GET, RouteKind::Item) => Some(Operation::View),
        (&Method::POST, RouteKind::Collection) => Some(Operation::Create),
        (&Method::PATCH, RouteKind::Item) => Some(Operation::Edit),
        (&Method::PUT, RouteKind::Item) => Some(Operation::Replace),
        (&Method::DELETE, RouteKind::Item) => Some(Operation::Delete),
        _ => None,
    }
}
