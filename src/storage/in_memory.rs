//! In-memory implementation of EntityStore for testing and development

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::core::query::{FilterClause, FilterOp, OrderKey};
use crate::core::resource::Resource;
use crate::storage::{EntityStore, QueryPage, StoreError, StoreQuery, VisibilityScope};

/// In-memory entity store
///
/// Useful for testing and single-process deployments. Uses RwLock for
/// thread-safe access. Unique constraints are declared per resource type via
/// [`MemoryStore::with_unique`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    resources: Arc<RwLock<HashMap<(String, Uuid), Resource>>>,
    unique_fields: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a unique field for a resource type
    pub fn with_unique(self, resource_type: impl Into<String>, field: impl Into<String>) -> Self {
        if let Ok(mut unique) = self.unique_fields.write() {
            unique
                .entry(resource_type.into())
                .or_default()
                .push(field.into());
        }
        self
    }

    fn check_unique(
        &self,
        resources: &HashMap<(String, Uuid), Resource>,
        candidate: &Resource,
    ) -> Result<(), StoreError> {
        let unique = self
            .unique_fields
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;
        let Some(fields) = unique.get(&candidate.resource_type) else {
            return Ok(());
        };

        for field in fields {
            let Some(value) = candidate.field(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let clash = resources.values().any(|other| {
                other.resource_type == candidate.resource_type
                    && other.id != candidate.id
                    && !other.is_deleted()
                    && other.field(field) == Some(value)
            });
            if clash {
                return Err(StoreError::UniqueViolation {
                    resource_type: candidate.resource_type.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert(&self, resource: Resource) -> Result<Resource, StoreError> {
        let mut resources = self
            .resources
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;

        self.check_unique(&resources, &resource)?;
        resources.insert(
            (resource.resource_type.clone(), resource.id),
            resource.clone(),
        );
        Ok(resource)
    }

    async fn get(&self, resource_type: &str, id: &Uuid) -> Result<Option<Resource>, StoreError> {
        let resources = self
            .resources
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;

        Ok(resources
            .get(&(resource_type.to_string(), *id))
            .filter(|r| !r.is_deleted())
            .cloned())
    }

    async fn update(&self, resource: Resource) -> Result<Resource, StoreError> {
        let mut resources = self
            .resources
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;

        let key = (resource.resource_type.clone(), resource.id);
        if !resources.contains_key(&key) {
            return Err(StoreError::NotFound {
                resource_type: resource.resource_type.clone(),
                id: resource.id,
            });
        }
        self.check_unique(&resources, &resource)?;
        resources.insert(key, resource.clone());
        Ok(resource)
    }

    async fn soft_delete(&self, resource_type: &str, id: &Uuid) -> Result<(), StoreError> {
        let mut resources = self
            .resources
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;

        let resource = resources
            .get_mut(&(resource_type.to_string(), *id))
            .ok_or_else(|| StoreError::NotFound {
                resource_type: resource_type.to_string(),
                id: *id,
            })?;
        resource.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn delete(&self, resource_type: &str, id: &Uuid) -> Result<(), StoreError> {
        let mut resources = self
            .resources
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;

        resources.remove(&(resource_type.to_string(), *id));
        Ok(())
    }

    async fn query(&self, query: &StoreQuery) -> Result<QueryPage, StoreError> {
        let resources = self
            .resources
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;

        let mut matches: Vec<Resource> = resources
            .values()
            .filter(|r| r.resource_type == query.resource_type)
            .filter(|r| query.include_deleted || !r.is_deleted())
            .filter(|r| !query.tenant_scoped || r.tenant_id == query.tenant_id)
            .filter(|r| match &query.parent {
                Some((id_field, id)) => {
                    lookup(r, id_field) == Some(Value::String(id.to_string()))
                }
                None => true,
            })
            .filter(|r| match &query.scope {
                VisibilityScope::All => true,
                VisibilityScope::PublicOrOwned(owner) => {
                    r.public || (owner.is_some() && r.owner_id == *owner)
                }
            })
            .filter(|r| query.clauses.iter().all(|clause| matches_clause(r, clause)))
            .filter(|r| match &query.free_text {
                Some(text) => matches_free_text(r, text),
                None => true,
            })
            .cloned()
            .collect();

        sort_resources(&mut matches, &query.order);
        let total = matches.len();
        let items = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();

        Ok(QueryPage { items, total })
    }

    async fn update_field_conditional(
        &self,
        resource_type: &str,
        id: &Uuid,
        field: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError> {
        let mut resources = self
            .resources
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;

        let resource = resources
            .get_mut(&(resource_type.to_string(), *id))
            .ok_or_else(|| StoreError::NotFound {
                resource_type: resource_type.to_string(),
                id: *id,
            })?;

        let current = resource.field(field).cloned().unwrap_or(Value::Null);
        if &current != expected {
            return Ok(false);
        }
        resource.set_field(field.to_string(), new);
        Ok(true)
    }
}

/// Resolve a field name against a resource, covering both the built-in
/// metadata columns and the dynamic field map.
fn lookup(resource: &Resource, field: &str) -> Option<Value> {
    match field {
        "id" => Some(Value::String(resource.id.to_string())),
        "owner_id" => resource.owner_id.map(|id| Value::String(id.to_string())),
        "tenant_id" => resource.tenant_id.clone().map(Value::String),
        "public" => Some(Value::Bool(resource.public)),
        "created_at" => Some(Value::String(resource.created_at.to_rfc3339())),
        "updated_at" => Some(Value::String(resource.updated_at.to_rfc3339())),
        _ => resource.field(field).cloned(),
    }
}

fn matches_clause(resource: &Resource, clause: &FilterClause) -> bool {
    let current = lookup(resource, &clause.field);

    match clause.op {
        FilterOp::Exists => {
            let wanted = clause.value.as_bool().unwrap_or(true);
            let present = current.as_ref().is_some_and(|v| !v.is_null());
            present == wanted
        }
        FilterOp::Eq => current.as_ref() == Some(&clause.value),
        FilterOp::Ne => current.as_ref() != Some(&clause.value),
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let Some(current) = current else { return false };
            let Some(ordering) = compare_values(&current, &clause.value) else {
                return false;
            };
            match clause.op {
                FilterOp::Gt => ordering == Ordering::Greater,
                FilterOp::Gte => ordering != Ordering::Less,
                FilterOp::Lt => ordering == Ordering::Less,
                FilterOp::Lte => ordering != Ordering::Greater,
                _ => unreachable!(),
            }
        }
        FilterOp::In => {
            let Some(current) = current else { return false };
            match &clause.value {
                Value::Array(candidates) => candidates.contains(&current),
                // A scalar `in` is a comma-separated list
                Value::String(s) => s
                    .split(',')
                    .any(|candidate| Some(candidate.trim()) == current.as_str()),
                other => &current == other,
            }
        }
        FilterOp::Contains => {
            let Some(current) = current else { return false };
            match (&current, &clause.value) {
                (Value::String(haystack), Value::String(needle)) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                (Value::Array(items), needle) => items.contains(needle),
                _ => false,
            }
        }
    }
}

fn matches_free_text(resource: &Resource, text: &str) -> bool {
    let needle = text.to_lowercase();
    resource.fields.values().any(|value| match value {
        Value::String(s) => s.to_lowercase().contains(&needle),
        _ => false,
    })
}

/// Total order over JSON values: numbers numerically, strings
/// lexicographically, mixed types are incomparable.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64().partial_cmp(&y.as_f64()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn sort_resources(resources: &mut [Resource], order: &[OrderKey]) {
    resources.sort_by(|a, b| {
        for key in order {
            let va = lookup(a, &key.field).unwrap_or(Value::Null);
            let vb = lookup(b, &key.field).unwrap_or(Value::Null);
            let ordering = compare_values(&va, &vb).unwrap_or(Ordering::Equal);
            let ordering = if key.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        // Stable tiebreak so identical queries paginate identically
        a.id.cmp(&b.id)
    });
}
