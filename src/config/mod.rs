//! Configuration loading and management
//!
//! Resources can be declared in YAML instead of code. A [`ResourcesConfig`]
//! carries everything a [`ResourceSpec`] needs except the policy closures,
//! which are looked up by name from a [`PolicySet`] at conversion time.

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::core::error::{EngineError, EngineResult};
use crate::core::policy::ResourcePolicy;
use crate::core::query::QueryOptions;
use crate::core::schema::{FieldFormat, FieldSchema, FieldSpec, FieldType};
use crate::server::route::ResourceSpec;

/// Declared constraints for one field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// One of: string, integer, float, boolean, uuid, datetime
    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub min_length: Option<usize>,

    #[serde(default)]
    pub max_length: Option<usize>,

    /// One of: email, url, slug
    #[serde(default)]
    pub format: Option<String>,

    /// Closed value set
    #[serde(default)]
    pub one_of: Option<Vec<String>>,

    #[serde(default)]
    pub default: Option<Value>,

    /// Variant sub-schema this field belongs to
    #[serde(default)]
    pub variant: Option<String>,
}

impl FieldConfig {
    fn into_spec(self) -> EngineResult<FieldSpec> {
        let mut spec = match self.field_type.as_str() {
            "string" => FieldSpec::string(),
            "integer" => FieldSpec::integer(),
            "float" => FieldSpec::float(),
            "boolean" => FieldSpec::boolean(),
            "uuid" => FieldSpec::uuid(),
            "datetime" => FieldSpec::datetime(),
            other => {
                return Err(EngineError::Config {
                    message: format!("unknown field type '{}'", other),
                });
            }
        };
        if self.required {
            spec = spec.required();
        }
        if let Some(min) = self.min_length {
            spec = spec.min_len(min);
        }
        if let Some(max) = self.max_length {
            spec = spec.max_len(max);
        }
        if let Some(format) = self.format {
            spec = spec.format(match format.as_str() {
                "email" => FieldFormat::Email,
                "url" => FieldFormat::Url,
                "slug" => FieldFormat::Slug,
                other => {
                    return Err(EngineError::Config {
                        message: format!("unknown field format '{}'", other),
                    });
                }
            });
        }
        if let Some(values) = self.one_of {
            spec = spec.one_of(values);
        }
        if let Some(default) = self.default {
            spec = spec.default_value(default);
        }
        if let Some(variant) = self.variant {
            spec = spec.in_variant(variant);
        }
        Ok(spec)
    }
}

fn default_page_size() -> usize {
    QueryOptions::default().default_page_size
}

fn default_max_page_size() -> usize {
    QueryOptions::default().max_page_size
}

fn default_soft_delete() -> bool {
    true
}

/// Declared configuration for one resource type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Singular name (e.g. "article")
    pub name: String,

    /// Plural route segment; derived from the name when omitted
    #[serde(default)]
    pub plural: Option<String>,

    /// Named policy resolved against the [`PolicySet`]
    #[serde(default)]
    pub policy: Option<String>,

    /// Ordered field declarations
    #[serde(default)]
    pub fields: IndexMap<String, FieldConfig>,

    /// Field selecting the active variant sub-schema
    #[serde(default)]
    pub discriminant: Option<String>,

    /// Parent resource name for nested routes
    #[serde(default)]
    pub parent: Option<String>,

    /// Foreign-key field linking to the parent
    #[serde(default)]
    pub parent_field: Option<String>,

    #[serde(default)]
    pub tenant_scoped: bool,

    /// Fields with a uniqueness constraint
    #[serde(default)]
    pub unique: Vec<String>,

    /// Fields a patch may write; omitted means the whole schema
    #[serde(default)]
    pub patch_fields: Option<Vec<String>>,

    /// Item-level custom operation names
    #[serde(default)]
    pub custom_operations: Vec<String>,

    #[serde(default = "default_soft_delete")]
    pub soft_delete: bool,

    /// Allow-listed sortable field names
    #[serde(default)]
    pub sortable: Vec<String>,

    /// Allow-listed filterable field names
    #[serde(default)]
    pub filterable: Vec<String>,

    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

/// Named policies a config file can refer to.
///
/// Policies carry closures, so they live in code; the set maps the names a
/// YAML file uses onto them. "owner_edits" is always available.
#[derive(Default)]
pub struct PolicySet {
    policies: HashMap<String, ResourcePolicy>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, policy: ResourcePolicy) -> Self {
        self.policies.insert(name.into(), policy);
        self
    }

    fn resolve(&self, name: &str) -> EngineResult<ResourcePolicy> {
        if let Some(policy) = self.policies.get(name) {
            return Ok(policy.clone());
        }
        if name == "owner_edits" {
            return Ok(ResourcePolicy::owner_edits());
        }
        Err(EngineError::Config {
            message: format!("unknown policy '{}'", name),
        })
    }
}

/// Complete resource configuration, usually loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    pub resources: Vec<ResourceConfig>,
}

impl ResourcesConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Overlay `other` onto this config. A resource in `other` with the same
    /// name replaces the one declared here.
    pub fn merge(mut self, other: Self) -> Self {
        for resource in other.resources {
            if let Some(slot) = self
                .resources
                .iter_mut()
                .find(|existing| existing.name == resource.name)
            {
                *slot = resource;
            } else {
                self.resources.push(resource);
            }
        }
        self
    }

    /// Convert every declared resource into a [`ResourceSpec`], resolving
    /// policy names against `policies`.
    pub fn into_specs(self, policies: &PolicySet) -> EngineResult<Vec<ResourceSpec>> {
        self.resources
            .into_iter()
            .map(|resource| resource.into_spec(policies))
            .collect()
    }
}

impl ResourceConfig {
    pub fn into_spec(self, policies: &PolicySet) -> EngineResult<ResourceSpec> {
        let mut schema = FieldSchema::new();
        for (name, field) in self.fields {
            schema = schema.field(name, field.into_spec()?);
        }
        if let Some(discriminant) = self.discriminant {
            schema = schema.discriminated_by(discriminant);
        }

        let mut query = QueryOptions::default()
            .with_sortable(self.sortable)
            .with_filterable(self.filterable);
        query.default_page_size = self.default_page_size;
        query.max_page_size = self.max_page_size;

        let mut spec = ResourceSpec::new(self.name, schema).with_query(query);
        if let Some(name) = self.policy {
            spec = spec.with_policy(policies.resolve(&name)?);
        }
        if let Some(plural) = self.plural {
            spec = spec.with_plural(plural);
        }
        if let Some(parent) = self.parent {
            spec = spec.with_parent(parent);
        }
        if let Some(field) = self.parent_field {
            spec = spec.with_parent_field(field);
        }
        if self.tenant_scoped {
            spec = spec.tenant_scoped();
        }
        for field in self.unique {
            spec = spec.with_unique(field);
        }
        if let Some(fields) = self.patch_fields {
            spec = spec.with_patch_fields(fields);
        }
        for operation in self.custom_operations {
            spec = spec.with_custom_operation(operation);
        }
        if !self.soft_delete {
            spec = spec.hard_delete();
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_YAML: &str = r#"
resources:
  - name: article
    policy: owner_edits
    fields:
      title:
        type: string
        required: true
        max_length: 200
      slug:
        type: string
        format: slug
      kind:
        type: string
        one_of: [text, video]
        default: text
      body:
        type: string
        variant: text
      video_url:
        type: string
        format: url
        variant: video
    discriminant: kind
    unique: [slug]
    sortable: [title, created_at]
    filterable: [kind]
  - name: comment
    parent: article
    fields:
      body:
        type: string
        required: true
"#;

    #[test]
    fn test_parse_yaml() {
        let config = ResourcesConfig::from_yaml_str(ARTICLE_YAML).unwrap();
        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.resources[0].name, "article");
        assert_eq!(config.resources[0].unique, vec!["slug"]);
        assert_eq!(config.resources[1].parent.as_deref(), Some("article"));
    }

    #[test]
    fn test_into_specs() {
        let config = ResourcesConfig::from_yaml_str(ARTICLE_YAML).unwrap();
        let specs = config.into_specs(&PolicySet::new()).unwrap();
        assert_eq!(specs.len(), 2);

        let article = &specs[0];
        assert_eq!(article.schema.discriminant(), Some("kind"));
        assert!(article.schema.get("title").unwrap().required);
        assert_eq!(
            article.schema.get("body").unwrap().variant.as_deref(),
            Some("text")
        );
        assert!(article.query.sortable.contains("title"));

        let comment = &specs[1];
        assert_eq!(comment.parent_field_name().as_deref(), Some("article_id"));
    }

    #[test]
    fn test_unknown_field_type_rejected() {
        let yaml = r#"
resources:
  - name: widget
    fields:
      size:
        type: decimal
"#;
        let config = ResourcesConfig::from_yaml_str(yaml).unwrap();
        let result = config.into_specs(&PolicySet::new());
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let yaml = r#"
resources:
  - name: widget
    policy: nonexistent
"#;
        let config = ResourcesConfig::from_yaml_str(yaml).unwrap();
        let result = config.into_specs(&PolicySet::new());
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[test]
    fn test_named_policy_resolved() {
        let yaml = r#"
resources:
  - name: widget
    policy: open
"#;
        let config = ResourcesConfig::from_yaml_str(yaml).unwrap();
        let policies =
            PolicySet::new().with("open", ResourcePolicy::default().with_public(|_, _| true));
        assert!(config.into_specs(&policies).is_ok());
    }

    #[test]
    fn test_merge_replaces_by_name() {
        let base = ResourcesConfig::from_yaml_str(ARTICLE_YAML).unwrap();
        let overlay = ResourcesConfig::from_yaml_str(
            r#"
resources:
  - name: article
    soft_delete: false
"#,
        )
        .unwrap();
        let merged = base.merge(overlay);
        assert_eq!(merged.resources.len(), 2);
        let article = merged
            .resources
            .iter()
            .find(|r| r.name == "article")
            .unwrap();
        assert!(!article.soft_delete);
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.yaml");
        std::fs::write(&path, ARTICLE_YAML).unwrap();

        let config = ResourcesConfig::from_yaml_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.resources.len(), 2);
    }

    #[test]
    fn test_from_yaml_file_missing_is_error() {
        assert!(ResourcesConfig::from_yaml_file("/nonexistent/resources.yaml").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = ResourcesConfig::from_yaml_str(ARTICLE_YAML).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = ResourcesConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.resources.len(), config.resources.len());
    }
}
