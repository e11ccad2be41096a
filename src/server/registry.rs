//! Resource registry: fail-fast validation and route resolution
//!
//! All resource specs are registered up front; [`RegistryBuilder::build`]
//! validates the whole set and resolves every route descriptor before the
//! server accepts a single request. A misconfigured registry is a startup
//! error, never a runtime 500.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::core::error::{EngineError, EngineResult};
use crate::server::route::{ResourceSpec, RouteDescriptor};

/// Collects specs, then validates and freezes them into a registry
#[derive(Default)]
pub struct RegistryBuilder {
    specs: Vec<ResourceSpec>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, spec: ResourceSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Validate the spec set and resolve route descriptors.
    ///
    /// Fails on duplicate names, colliding route segments, unknown parents
    /// and cyclic parent chains.
    pub fn build(self) -> EngineResult<ResourceRegistry> {
        let mut specs: IndexMap<String, ResourceSpec> = IndexMap::new();
        for spec in self.specs {
            if specs.contains_key(&spec.name) {
                return Err(EngineError::Config {
                    message: format!("duplicate resource name '{}'", spec.name),
                });
            }
            specs.insert(spec.name.clone(), spec);
        }

        // Unknown parents
        for spec in specs.values() {
            if let Some(parent) = &spec.parent {
                if !specs.contains_key(parent) {
                    return Err(EngineError::Config {
                        message: format!(
                            "resource '{}' names unknown parent '{}'",
                            spec.name, parent
                        ),
                    });
                }
            }
        }

        // Cyclic parent chains
        for spec in specs.values() {
            let mut seen = HashSet::new();
            let mut current = Some(spec.name.clone());
            while let Some(name) = current {
                if !seen.insert(name.clone()) {
                    return Err(EngineError::Config {
                        message: format!(
                            "cyclic parent chain involving resource '{}'",
                            spec.name
                        ),
                    });
                }
                current = specs.get(&name).and_then(|s| s.parent.clone());
            }
        }

        // Resolve descriptors, outermost ancestor first
        let mut routes: HashMap<String, RouteDescriptor> = HashMap::new();
        for spec in specs.values() {
            let mut chain = Vec::new();
            let mut tenant_prefixed = spec.tenant_scoped;
            let mut current = spec.parent.clone();
            while let Some(name) = current {
                // Chain membership was validated above
                let parent = &specs[&name];
                tenant_prefixed |= parent.tenant_scoped;
                chain.push((parent.plural_segment(), format!("{}_id", parent.name)));
                current = parent.parent.clone();
            }
            chain.reverse();

            routes.insert(
                spec.name.clone(),
                RouteDescriptor {
                    name: spec.name.clone(),
                    plural: spec.plural_segment(),
                    id_param: format!("{}_id", spec.name),
                    ancestors: chain,
                    tenant_prefixed,
                },
            );
        }

        // Colliding collection paths
        let mut paths: HashMap<String, String> = HashMap::new();
        for descriptor in routes.values() {
            let path = descriptor.collection_path();
            if let Some(existing) = paths.insert(path.clone(), descriptor.name.clone()) {
                return Err(EngineError::Config {
                    message: format!(
                        "resources '{}' and '{}' collide on route '{}'",
                        existing, descriptor.name, path
                    ),
                });
            }
        }

        Ok(ResourceRegistry { specs, routes })
    }
}

/// The validated, immutable set of registered resources
pub struct ResourceRegistry {
    specs: IndexMap<String, ResourceSpec>,
    routes: HashMap<String, RouteDescriptor>,
}

impl ResourceRegistry {
    pub fn spec(&self, name: &str) -> EngineResult<&ResourceSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| EngineError::UnknownResourceType {
                resource_type: name.to_string(),
            })
    }

    pub fn route(&self, name: &str) -> EngineResult<&RouteDescriptor> {
        self.routes
            .get(name)
            .ok_or_else(|| EngineError::UnknownResourceType {
                resource_type: name.to_string(),
            })
    }

    /// Registered resource names, in registration order
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
