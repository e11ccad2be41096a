//! Storage layer: the [`EntityStore`] trait and its backends
//!
//! The engine never post-filters query results for visibility: the scope an
//! actor is allowed to see travels inside the [`StoreQuery`] and the backend
//! applies it, together with filters, ordering, free-text search and
//! pagination. A backend that cannot push a constraint down must still honor
//! it before returning.

pub mod in_memory;

pub use in_memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::core::query::{FilterClause, OrderKey};
use crate::core::resource::Resource;

/// Errors surfaced by storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{resource_type} with id '{id}' not found")]
    NotFound { resource_type: String, id: Uuid },

    #[error("unique constraint on {resource_type} '{field}' violated")]
    UniqueViolation { resource_type: String, field: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for crate::core::error::EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { resource_type, id } => {
                crate::core::error::EngineError::NotFound { resource_type, id }
            }
            StoreError::UniqueViolation {
                resource_type,
                field,
            } => crate::core::error::EngineError::UniquenessViolation {
                resource_type,
                field,
            },
            StoreError::Backend(message) => {
                crate::core::error::EngineError::Storage { message }
            }
        }
    }
}

/// What an actor is allowed to see of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityScope {
    /// No restriction (admins, editors)
    All,
    /// Public resources, plus those owned by the given actor
    PublicOrOwned(Option<Uuid>),
}

/// A fully-resolved collection query, ready for a backend
#[derive(Debug, Clone)]
pub struct StoreQuery {
    pub resource_type: String,
    /// Restrict to a tenant; `None` matches only untenanted resources
    /// when `tenant_scoped` is set
    pub tenant_id: Option<String>,
    pub tenant_scoped: bool,
    /// Restrict to children of a parent resource, as an `(id_field, id)` pair
    pub parent: Option<(String, Uuid)>,
    pub clauses: Vec<FilterClause>,
    pub order: Vec<OrderKey>,
    pub free_text: Option<String>,
    pub scope: VisibilityScope,
    pub include_deleted: bool,
    pub offset: usize,
    pub limit: usize,
}

impl StoreQuery {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            tenant_id: None,
            tenant_scoped: false,
            parent: None,
            clauses: Vec::new(),
            order: Vec::new(),
            free_text: None,
            scope: VisibilityScope::All,
            include_deleted: false,
            offset: 0,
            limit: 20,
        }
    }

    pub fn with_scope(mut self, scope: VisibilityScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self.tenant_scoped = true;
        self
    }

    pub fn with_parent(mut self, id_field: impl Into<String>, id: Uuid) -> Self {
        self.parent = Some((id_field.into(), id));
        self
    }

    pub fn with_clauses(mut self, clauses: Vec<FilterClause>) -> Self {
        self.clauses = clauses;
        self
    }

    pub fn with_order(mut self, order: Vec<OrderKey>) -> Self {
        self.order = order;
        self
    }

    pub fn with_free_text(mut self, text: Option<String>) -> Self {
        self.free_text = text;
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// One page of query results
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub items: Vec<Resource>,
    /// Total matching rows before pagination
    pub total: usize,
}

/// Persistence abstraction for resources
///
/// Implementations must apply every constraint in [`StoreQuery`] themselves,
/// including the visibility scope.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert a new resource, enforcing unique constraints
    async fn insert(&self, resource: Resource) -> Result<Resource, StoreError>;

    /// Fetch a resource by type and id. Soft-deleted resources are `None`.
    async fn get(&self, resource_type: &str, id: &Uuid) -> Result<Option<Resource>, StoreError>;

    /// Overwrite an existing resource, enforcing unique constraints
    async fn update(&self, resource: Resource) -> Result<Resource, StoreError>;

    /// Mark a resource deleted without removing it
    async fn soft_delete(&self, resource_type: &str, id: &Uuid) -> Result<(), StoreError>;

    /// Remove a resource permanently
    async fn delete(&self, resource_type: &str, id: &Uuid) -> Result<(), StoreError>;

    /// Run a collection query
    async fn query(&self, query: &StoreQuery) -> Result<QueryPage, StoreError>;

    /// Compare-and-swap a single field.
    ///
    /// Writes `new` only when the field currently equals `expected`; returns
    /// whether the swap was applied. This is the primitive counters build on.
    async fn update_field_conditional(
        &self,
        resource_type: &str,
        id: &Uuid,
        field: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError>;
}
