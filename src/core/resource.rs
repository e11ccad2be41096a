//! The generic resource representation the engine dispatches over
//!
//! The engine is entity-agnostic: business entities (articles, products,
//! orders...) are carried as a [`Resource`] with a dynamic field map, so the
//! same authorization, binding and query machinery serves every entity type.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A persisted data entity, as seen by the dispatch engine.
///
/// Intrinsic metadata (identity, ownership, visibility, timestamps) lives in
/// named fields; everything schema-driven lives in `fields`, an ordered map
/// keyed by field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,

    /// Singular entity type name (e.g. "article")
    pub resource_type: String,

    /// Owning tenant slug, for tenant-scoped resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Actor that owns/created this resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,

    /// Publicly readable without authentication
    #[serde(default)]
    pub public: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft deletion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Schema-driven field values, in schema order
    pub fields: IndexMap<String, Value>,
}

impl Resource {
    /// Create a fresh resource of the given type with empty fields.
    pub fn new(resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            resource_type: resource_type.into(),
            tenant_id: None,
            owner_id: None,
            public: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            fields: IndexMap::new(),
        }
    }

    pub fn with_owner(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Get a field value by name. Missing fields read as `None`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Write a field value and bump `updated_at`.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the given actor id owns this resource.
    pub fn is_owned_by(&self, actor_id: Uuid) -> bool {
        self.owner_id == Some(actor_id)
    }
}
