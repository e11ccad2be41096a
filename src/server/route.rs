//! Route descriptors: URL shapes for registered resources
//!
//! A [`ResourceSpec`] declares a resource; the registry resolves specs into
//! [`RouteDescriptor`]s carrying the concrete path templates. Children nest
//! under their parent's item path, and a resource anywhere under a
//! tenant-scoped ancestor inherits the `/t/{tenant}` prefix.

use std::collections::BTreeSet;

use crate::core::pluralize::Pluralizer;
use crate::core::policy::ResourcePolicy;
use crate::core::query::QueryOptions;
use crate::core::schema::FieldSchema;

/// Declaration of a single resource type
#[derive(Clone)]
pub struct ResourceSpec {
    /// Singular resource name, e.g. "article"
    pub name: String,
    /// Plural route segment; derived from `name` when not set
    pub plural: Option<String>,
    pub schema: FieldSchema,
    pub policy: ResourcePolicy,
    pub query: QueryOptions,
    /// Parent resource name for nested routes
    pub parent: Option<String>,
    /// Foreign-key field linking a child to its parent; defaults to
    /// `{parent}_id`
    pub parent_field: Option<String>,
    /// Whether routes live under the `/t/{tenant}` prefix
    pub tenant_scoped: bool,
    /// Fields with a uniqueness constraint
    pub unique_fields: Vec<String>,
    /// Fields a patch may write; `None` means the whole schema
    pub patch_fields: Option<BTreeSet<String>>,
    /// Item-level custom operation names, dispatched via POST
    pub custom_operations: Vec<String>,
    /// Delete marks instead of removing
    pub soft_delete: bool,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, schema: FieldSchema) -> Self {
        Self {
            name: name.into(),
            plural: None,
            schema,
            policy: ResourcePolicy::default(),
            query: QueryOptions::default(),
            parent: None,
            parent_field: None,
            tenant_scoped: false,
            unique_fields: Vec::new(),
            patch_fields: None,
            custom_operations: Vec::new(),
            soft_delete: true,
        }
    }

    pub fn with_plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }

    pub fn with_policy(mut self, policy: ResourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_query(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_parent_field(mut self, field: impl Into<String>) -> Self {
        self.parent_field = Some(field.into());
        self
    }

    pub fn tenant_scoped(mut self) -> Self {
        self.tenant_scoped = true;
        self
    }

    pub fn with_unique(mut self, field: impl Into<String>) -> Self {
        self.unique_fields.push(field.into());
        self
    }

    pub fn with_patch_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patch_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_custom_operation(mut self, name: impl Into<String>) -> Self {
        self.custom_operations.push(name.into());
        self
    }

    pub fn hard_delete(mut self) -> Self {
        self.soft_delete = false;
        self
    }

    /// The plural route segment
    pub fn plural_segment(&self) -> String {
        self.plural
            .clone()
            .unwrap_or_else(|| Pluralizer::pluralize(&self.name))
    }

    /// The foreign-key field a child of this spec's parent uses
    pub fn parent_field_name(&self) -> Option<String> {
        self.parent.as_ref().map(|parent| {
            self.parent_field
                .clone()
                .unwrap_or_else(|| format!("{}_id", parent))
        })
    }
}

/// Resolved path templates for one resource
///
/// Parameter names use axum's `{param}` syntax so templates double as route
/// registrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub name: String,
    pub plural: String,
    /// Path parameter for this resource's id, `{name}_id`
    pub id_param: String,
    /// `(plural, id_param)` pairs for each ancestor, outermost first
    pub ancestors: Vec<(String, String)>,
    /// Whether this resource or any ancestor is tenant scoped
    pub tenant_prefixed: bool,
}

impl RouteDescriptor {
    fn prefix(&self) -> String {
        let mut path = String::new();
        if self.tenant_prefixed {
            path.push_str("/t/{tenant}");
        }
        for (plural, param) in &self.ancestors {
            path.push_str(&format!("/{}/{{{}}}", plural, param));
        }
        path
    }

    /// `GET` list / `POST` create
    pub fn collection_path(&self) -> String {
        format!("{}/{}", self.prefix(), self.plural)
    }

    /// `GET` view / `PUT` replace / `PATCH` edit / `DELETE`
    pub fn item_path(&self) -> String {
        format!("{}/{{{}}}", self.collection_path(), self.id_param)
    }

    /// `GET` the empty creation form
    pub fn new_path(&self) -> String {
        format!("{}/new", self.collection_path())
    }

    /// `GET` the pre-filled edit form
    pub fn edit_path(&self) -> String {
        format!("{}/edit", self.item_path())
    }

    /// `POST` a custom item operation
    pub fn custom_path(&self, operation: &str) -> String {
        format!("{}/{}", self.item_path(), operation)
    }

    /// Concrete item URL for a given id, used for post-mutation redirects.
    /// Ancestor parameters are filled from `fills`, in ancestor order.
    pub fn item_url(&self, fills: &[String], id: &str) -> String {
        let mut path = String::new();
        if self.tenant_prefixed {
            if let Some(tenant) = fills.first() {
                path.push_str(&format!("/t/{}", tenant));
            }
        }
        let offset = usize::from(self.tenant_prefixed);
        for (i, (plural, _)) in self.ancestors.iter().enumerate() {
            let fill = fills.get(offset + i).map(String::as_str).unwrap_or("");
            path.push_str(&format!("/{}/{}", plural, fill));
        }
        format!("{}/{}/{}", path, self.plural, id)
    }
}
