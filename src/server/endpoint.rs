//! Resource endpoint: the operation state machine
//!
//! One [`ResourceEndpoint`] serves every registered resource. Each operation
//! follows the same order: resolve the spec, fetch the target if the
//! operation has one, authorize, and only then touch state. Collection
//! visibility is pushed into the [`StoreQuery`] scope so the store never
//! returns rows the actor may not see.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use uuid::Uuid;

use crate::core::audit::{AuditBus, AuditEntry};
use crate::core::binding::{BindMode, EntityBinding, FieldErrors};
use crate::core::context::RequestContext;
use crate::core::error::{EngineError, EngineResult};
use crate::core::operation::Operation;
use crate::core::policy::Verdict;
use crate::core::query::{ArgumentParser, PaginationMeta, QueryDescriptor};
use crate::core::resource::Resource;
use crate::server::registry::ResourceRegistry;
use crate::server::route::ResourceSpec;
use crate::storage::{EntityStore, StoreError, StoreQuery, VisibilityScope};

/// Path-derived scope: the tenant and ancestor ids a nested route carries
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    pub tenant: Option<String>,
    /// Ancestor resource ids, outermost first
    pub ancestors: Vec<Uuid>,
}

impl RequestScope {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_ancestor(mut self, id: Uuid) -> Self {
        self.ancestors.push(id);
        self
    }

    fn parent_id(&self) -> Option<Uuid> {
        self.ancestors.last().copied()
    }

    fn url_fills(&self, tenant_prefixed: bool) -> Vec<String> {
        let mut fills = Vec::new();
        if tenant_prefixed {
            fills.push(self.tenant.clone().unwrap_or_default());
        }
        fills.extend(self.ancestors.iter().map(Uuid::to_string));
        fills
    }
}

/// Result of a successful list operation
#[derive(Debug, Clone)]
pub struct ListOutcome {
    pub items: Vec<Resource>,
    pub meta: PaginationMeta,
    pub descriptor: QueryDescriptor,
}

/// Result of a successful mutation
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub resource: Resource,
    /// Flash notice for view responses
    pub notice: String,
    /// Post-mutation redirect target
    pub location: String,
}

/// Serves all registered resources against one store
#[derive(Clone)]
pub struct ResourceEndpoint {
    registry: Arc<ResourceRegistry>,
    store: Arc<dyn EntityStore>,
    audit: AuditBus,
}

impl ResourceEndpoint {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        store: Arc<dyn EntityStore>,
        audit: AuditBus,
    ) -> Self {
        Self {
            registry,
            store,
            audit,
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// List a collection, scoped to what the actor may see
    pub async fn list(
        &self,
        resource_type: &str,
        ctx: &RequestContext,
        scope: &RequestScope,
        raw_params: &HashMap<String, String>,
    ) -> EngineResult<ListOutcome> {
        let spec = self.registry.spec(resource_type)?;

        let verdict = spec.policy.authorize(&Operation::List, ctx, None);
        if verdict.is_denied() {
            return Err(EngineError::from_denied(&verdict));
        }

        let descriptor = ArgumentParser::parse(raw_params, &spec.query);
        let limit = descriptor.limit(&spec.query);
        let offset = descriptor.offset(&spec.query);

        let mut query = StoreQuery::new(resource_type)
            .with_scope(visibility_for(ctx))
            .with_clauses(descriptor.clauses.clone())
            .with_order(descriptor.order.clone())
            .with_free_text(descriptor.free_text.clone())
            .with_page(offset, limit);
        // A child of a tenant-scoped parent is tenant-bound too, so the
        // route flag decides, not the spec's own flag.
        if self.registry.route(resource_type)?.tenant_prefixed {
            query = query.with_tenant(scope.tenant.clone());
        }
        if let Some(field) = spec.parent_field_name() {
            let parent_id = scope.parent_id().ok_or_else(|| EngineError::BadRequest {
                message: format!("'{}' requires a parent in the path", resource_type),
            })?;
            query = query.with_parent(field, parent_id);
        }

        let page = self.store.query(&query).await?;
        let meta = PaginationMeta::new(descriptor.page, limit, page.total);
        let items = page
            .items
            .into_iter()
            .map(|item| restrict(item, &verdict))
            .collect();

        Ok(ListOutcome {
            items,
            meta,
            descriptor,
        })
    }

    /// View a single resource
    pub async fn view(
        &self,
        resource_type: &str,
        ctx: &RequestContext,
        scope: &RequestScope,
        id: &Uuid,
    ) -> EngineResult<Resource> {
        let spec = self.registry.spec(resource_type)?;
        let resource = self.fetch(resource_type, id).await?;
        self.enforce_scope(resource_type, &resource, scope)?;

        let verdict = spec.policy.authorize(&Operation::View, ctx, Some(&resource));
        if verdict.is_denied() {
            return Err(EngineError::from_denied(&verdict));
        }
        Ok(restrict(resource, &verdict))
    }

    /// Create a resource from a submission
    pub async fn create(
        &self,
        resource_type: &str,
        ctx: &RequestContext,
        scope: &RequestScope,
        submitted: &IndexMap<String, Value>,
    ) -> EngineResult<MutationOutcome> {
        let spec = self.registry.spec(resource_type)?;

        let verdict = spec.policy.authorize(&Operation::Create, ctx, None);
        if verdict.is_denied() {
            return Err(EngineError::from_denied(&verdict));
        }

        let binding = EntityBinding::bind_full(&spec.schema, submitted, None, BindMode::Replace);
        if !binding.is_valid() {
            return Err(validation_error(binding.errors().clone(), submitted));
        }

        let mut resource = Resource::new(resource_type);
        if let Some(actor_id) = ctx.actor_id() {
            resource = resource.with_owner(actor_id);
        }
        if self.registry.route(resource_type)?.tenant_prefixed {
            resource.tenant_id = scope.tenant.clone();
        }
        binding
            .populate(&mut resource)
            .map_err(|errors| validation_error(errors, submitted))?;
        if let Some(field) = spec.parent_field_name() {
            let parent_id = scope.parent_id().ok_or_else(|| EngineError::BadRequest {
                message: format!("'{}' requires a parent in the path", resource_type),
            })?;
            resource.set_field(field, Value::String(parent_id.to_string()));
        }
        sync_meta(&mut resource);

        let created = self
            .store
            .insert(resource)
            .await
            .map_err(|err| remap_uniqueness(err, submitted))?;

        self.audit(ctx, "create", &created);
        Ok(self.mutation_outcome(spec, scope, created, "created"))
    }

    /// Patch a resource: only submitted, allowed fields change
    pub async fn edit(
        &self,
        resource_type: &str,
        ctx: &RequestContext,
        scope: &RequestScope,
        id: &Uuid,
        submitted: &IndexMap<String, Value>,
    ) -> EngineResult<MutationOutcome> {
        self.modify(resource_type, ctx, scope, id, submitted, BindMode::Patch)
            .await
    }

    /// Replace a resource: absent fields reset to schema defaults
    pub async fn replace(
        &self,
        resource_type: &str,
        ctx: &RequestContext,
        scope: &RequestScope,
        id: &Uuid,
        submitted: &IndexMap<String, Value>,
    ) -> EngineResult<MutationOutcome> {
        self.modify(resource_type, ctx, scope, id, submitted, BindMode::Replace)
            .await
    }

    async fn modify(
        &self,
        resource_type: &str,
        ctx: &RequestContext,
        scope: &RequestScope,
        id: &Uuid,
        submitted: &IndexMap<String, Value>,
        mode: BindMode,
    ) -> EngineResult<MutationOutcome> {
        let spec = self.registry.spec(resource_type)?;
        let mut resource = self.fetch(resource_type, id).await?;
        self.enforce_scope(resource_type, &resource, scope)?;

        let operation = match mode {
            BindMode::Patch => Operation::Edit,
            BindMode::Replace => Operation::Replace,
        };
        let verdict = spec.policy.authorize(&operation, ctx, Some(&resource));
        if verdict.is_denied() {
            return Err(EngineError::from_denied(&verdict));
        }

        let allowed = match mode {
            BindMode::Patch => spec.patch_fields.as_ref(),
            BindMode::Replace => None,
        };
        let binding =
            EntityBinding::bind(&spec.schema, submitted, Some(&resource), allowed, mode);
        if !binding.is_valid() {
            return Err(validation_error(binding.errors().clone(), submitted));
        }
        binding
            .populate(&mut resource)
            .map_err(|errors| validation_error(errors, submitted))?;
        sync_meta(&mut resource);

        let updated = self
            .store
            .update(resource)
            .await
            .map_err(|err| remap_uniqueness(err, submitted))?;

        self.audit(ctx, operation.action(), &updated);
        Ok(self.mutation_outcome(spec, scope, updated, "updated"))
    }

    /// Delete a resource. Soft by default, per the spec's declaration.
    pub async fn delete(
        &self,
        resource_type: &str,
        ctx: &RequestContext,
        scope: &RequestScope,
        id: &Uuid,
    ) -> EngineResult<MutationOutcome> {
        let spec = self.registry.spec(resource_type)?;
        let resource = self.fetch(resource_type, id).await?;
        self.enforce_scope(resource_type, &resource, scope)?;

        let verdict = spec.policy.authorize(&Operation::Delete, ctx, Some(&resource));
        if verdict.is_denied() {
            return Err(EngineError::from_denied(&verdict));
        }

        if spec.soft_delete {
            self.store.soft_delete(resource_type, id).await?;
        } else {
            self.store.delete(resource_type, id).await?;
        }

        self.audit(ctx, "delete", &resource);

        let route = self.registry.route(resource_type)?;
        let fills = scope.url_fills(route.tenant_prefixed);
        let location = route
            .item_url(&fills, "")
            .trim_end_matches('/')
            .to_string();
        Ok(MutationOutcome {
            notice: format!("{} deleted", title_case(&spec.name)),
            resource,
            location,
        })
    }

    /// Run a registered custom item operation
    pub async fn custom(
        &self,
        resource_type: &str,
        ctx: &RequestContext,
        scope: &RequestScope,
        id: &Uuid,
        operation: &str,
    ) -> EngineResult<MutationOutcome> {
        let spec = self.registry.spec(resource_type)?;
        if !spec.custom_operations.iter().any(|op| op == operation) {
            return Err(EngineError::BadRequest {
                message: format!(
                    "unknown operation '{}' on '{}'",
                    operation, resource_type
                ),
            });
        }

        let resource = self.fetch(resource_type, id).await?;
        self.enforce_scope(resource_type, &resource, scope)?;
        let op = Operation::Custom(operation.to_string());
        let verdict = spec.policy.authorize(&op, ctx, Some(&resource));
        if verdict.is_denied() {
            return Err(EngineError::from_denied(&verdict));
        }

        self.audit(ctx, operation, &resource);
        Ok(self.mutation_outcome(spec, scope, resource, operation))
    }

    /// Atomically bump a numeric field, retrying on contention.
    ///
    /// Built on the store's compare-and-swap so concurrent bumps never lose
    /// increments.
    pub async fn increment_field(
        &self,
        resource_type: &str,
        id: &Uuid,
        field: &str,
        delta: i64,
    ) -> EngineResult<i64> {
        const MAX_RETRIES: usize = 16;

        for _ in 0..MAX_RETRIES {
            let resource = self.fetch(resource_type, id).await?;
            let current = resource
                .field(field)
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let expected = resource.field(field).cloned().unwrap_or(Value::Null);
            let next = current + delta;
            let applied = self
                .store
                .update_field_conditional(resource_type, id, field, &expected, Value::from(next))
                .await?;
            if applied {
                return Ok(next);
            }
        }
        Err(EngineError::Storage {
            message: format!("contention bumping '{}' on {}", field, resource_type),
        })
    }

    /// A resource reached through a nested or tenant-prefixed path must
    /// actually belong to that path. A mismatch reads as not found, the
    /// same as a row that does not exist.
    fn enforce_scope(
        &self,
        resource_type: &str,
        resource: &Resource,
        scope: &RequestScope,
    ) -> EngineResult<()> {
        let spec = self.registry.spec(resource_type)?;
        let route = self.registry.route(resource_type)?;

        let mut matches = true;
        if route.tenant_prefixed {
            matches &= resource.tenant_id == scope.tenant;
        }
        if let Some(field) = spec.parent_field_name() {
            let expected = scope.parent_id().map(|id| Value::String(id.to_string()));
            matches &= resource.field(&field) == expected.as_ref();
        }

        if matches {
            Ok(())
        } else {
            Err(EngineError::NotFound {
                resource_type: resource_type.to_string(),
                id: resource.id,
            })
        }
    }

    async fn fetch(&self, resource_type: &str, id: &Uuid) -> EngineResult<Resource> {
        self.store
            .get(resource_type, id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                resource_type: resource_type.to_string(),
                id: *id,
            })
    }

    fn mutation_outcome(
        &self,
        spec: &ResourceSpec,
        scope: &RequestScope,
        resource: Resource,
        action: &str,
    ) -> MutationOutcome {
        let location = self
            .registry
            .route(&spec.name)
            .map(|route| {
                let fills = scope.url_fills(route.tenant_prefixed);
                route.item_url(&fills, &resource.id.to_string())
            })
            .unwrap_or_default();
        MutationOutcome {
            notice: format!("{} {}", title_case(&spec.name), action),
            resource,
            location,
        }
    }

    fn audit(&self, ctx: &RequestContext, action: &str, resource: &Resource) {
        let mut entry = AuditEntry::new(action, &resource.resource_type, resource.id);
        if let Some(actor_id) = ctx.actor_id() {
            entry = entry.with_actor(actor_id);
        }
        self.audit.record(entry);
    }
}

/// Collection scope for this actor: admins see everything, everyone else
/// sees public rows plus their own.
fn visibility_for(ctx: &RequestContext) -> VisibilityScope {
    if ctx.is_admin() {
        VisibilityScope::All
    } else {
        VisibilityScope::PublicOrOwned(ctx.actor_id())
    }
}

/// Strip fields the verdict marked as restricted
fn restrict(mut resource: Resource, verdict: &Verdict) -> Resource {
    if let Some(restricted) = &verdict.restricted_fields {
        resource.fields.retain(|name, _| !restricted.contains(name));
    }
    resource
}

/// Mirror well-known schema fields onto the resource metadata
fn sync_meta(resource: &mut Resource) {
    if let Some(public) = resource.field("public").and_then(Value::as_bool) {
        resource.public = public;
    }
}

fn validation_error(errors: FieldErrors, submitted: &IndexMap<String, Value>) -> EngineError {
    EngineError::ValidationFailed {
        errors,
        values: submitted
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

/// Uniqueness failures surface as field errors on the form, not as a
/// storage fault.
fn remap_uniqueness(err: StoreError, submitted: &IndexMap<String, Value>) -> EngineError {
    match err {
        StoreError::UniqueViolation { field, .. } => {
            let mut errors = FieldErrors::new();
            errors.insert(field.clone(), vec![format!("'{}' is already taken", field)]);
            validation_error(errors, submitted)
        }
        other => other.into(),
    }
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
