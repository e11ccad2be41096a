//! Entity field schemas
//!
//! A [`FieldSchema`] enumerates an entity's editable fields with their type,
//! format and length constraints. Binding validates submitted values against
//! the schema and produces field-keyed errors.
//!
//! Polymorphic entities carry a discriminant field selecting an embedded
//! variant sub-schema; fields may be tagged with the variant they belong to.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use uuid::Uuid;

/// The primitive type a field value must conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
}

/// Format validators applied to string fields.
#[derive(Debug, Clone)]
pub enum FieldFormat {
    Email,
    Url,
    Slug,
    Custom(Regex),
}

impl FieldFormat {
    /// Validate a string value against this format.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            FieldFormat::Email => Self::email_regex().is_match(value),
            FieldFormat::Url => Self::url_regex().is_match(value),
            FieldFormat::Slug => Self::slug_regex().is_match(value),
            FieldFormat::Custom(regex) => regex.is_match(value),
        }
    }

    fn email_regex() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
        })
    }

    fn url_regex() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap())
    }

    fn slug_regex() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap())
    }

    fn name(&self) -> &str {
        match self {
            FieldFormat::Email => "email",
            FieldFormat::Url => "url",
            FieldFormat::Slug => "slug",
            FieldFormat::Custom(_) => "custom",
        }
    }
}

/// Constraints for one editable field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub format: Option<FieldFormat>,
    /// Closed value set, when the field is an enumeration
    pub allowed_values: Option<Vec<String>>,
    /// Schema default, applied by replace semantics when the field is absent
    pub default: Value,
    /// Variant sub-schema this field belongs to; `None` means common
    pub variant: Option<String>,
}

impl FieldSpec {
    fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            min_length: None,
            max_length: None,
            format: None,
            allowed_values: None,
            default: Value::Null,
            variant: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn float() -> Self {
        Self::of(FieldType::Float)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn uuid() -> Self {
        Self::of(FieldType::Uuid)
    }

    pub fn datetime() -> Self {
        Self::of(FieldType::DateTime)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min_len(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_len(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn one_of<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = value;
        self
    }

    pub fn in_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Validate and coerce a submitted value. Returns the coerced value on
    /// success, or the list of constraint violations.
    ///
    /// Coercion is deliberately lenient about form-encoded input: numeric and
    /// boolean strings are converted to their typed values.
    pub fn check(&self, field: &str, value: &Value) -> Result<Value, Vec<String>> {
        if value.is_null() {
            if self.required {
                return Err(vec![format!("'{}' is required", field)]);
            }
            return Ok(Value::Null);
        }

        let coerced = match self.coerce(value) {
            Some(v) => v,
            None => {
                return Err(vec![format!(
                    "'{}' must be of type {:?}",
                    field, self.field_type
                )]);
            }
        };

        let mut errors = Vec::new();

        if let Some(s) = coerced.as_str() {
            if let Some(min) = self.min_length
                && s.len() < min
            {
                errors.push(format!("'{}' must be at least {} characters", field, min));
            }
            if let Some(max) = self.max_length
                && s.len() > max
            {
                errors.push(format!("'{}' must not exceed {} characters", field, max));
            }
            if let Some(format) = &self.format
                && !format.matches(s)
            {
                errors.push(format!("'{}' is not a valid {}", field, format.name()));
            }
            if let Some(allowed) = &self.allowed_values
                && !allowed.iter().any(|a| a == s)
            {
                errors.push(format!("'{}' must be one of {:?}", field, allowed));
            }
        }

        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(errors)
        }
    }

    fn coerce(&self, value: &Value) -> Option<Value> {
        match self.field_type {
            FieldType::String => value.as_str().map(|s| Value::String(s.to_string())),
            FieldType::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
                Value::String(s) => s.parse::<i64>().ok().map(Value::from),
                _ => None,
            },
            FieldType::Float => match value {
                Value::Number(_) => value.as_f64().map(Value::from),
                Value::String(s) => s.parse::<f64>().ok().map(Value::from),
                _ => None,
            },
            FieldType::Boolean => match value {
                Value::Bool(_) => Some(value.clone()),
                Value::String(s) => match s.as_str() {
                    "true" | "1" | "on" => Some(Value::Bool(true)),
                    "false" | "0" | "off" | "" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            FieldType::Uuid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(|u| Value::String(u.to_string())),
            FieldType::DateTime => value
                .as_str()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| Value::String(dt.to_rfc3339())),
        }
    }
}

/// The ordered field set for one entity type.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: IndexMap<String, FieldSpec>,
    /// Field whose value selects the active variant sub-schema
    discriminant: Option<String>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Declare `name` as the discriminant selecting the variant sub-schema.
    /// The discriminant field itself must be declared with [`Self::field`].
    pub fn discriminated_by(mut self, name: impl Into<String>) -> Self {
        self.discriminant = Some(name.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn discriminant(&self) -> Option<&str> {
        self.discriminant.as_deref()
    }

    /// Schema defaults for every field, in schema order.
    pub fn defaults(&self) -> IndexMap<String, Value> {
        self.fields
            .iter()
            .map(|(name, spec)| (name.clone(), spec.default.clone()))
            .collect()
    }

    /// Resolve the active variant from submitted or existing values.
    pub fn resolve_variant(&self, values: &IndexMap<String, Value>) -> Option<String> {
        let discriminant = self.discriminant.as_deref()?;
        values
            .get(discriminant)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// Fields belonging to variants other than `active` — these are masked
    /// out before validation and nulled on a variant switch.
    pub fn inactive_variant_fields(&self, active: Option<&str>) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|(_, spec)| match (&spec.variant, active) {
                (Some(v), Some(active)) => v != active,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product_schema() -> FieldSchema {
        FieldSchema::new()
            .field("name", FieldSpec::string().required().min_len(2).max_len(80))
            .field(
                "status",
                FieldSpec::string()
                    .one_of(["draft", "active", "archived"])
                    .default_value(json!("draft")),
            )
            .field("price", FieldSpec::float())
            .field("contact", FieldSpec::string().format(FieldFormat::Email))
    }

    #[test]
    fn test_required_null_rejected() {
        let schema = product_schema();
        let spec = schema.get("name").unwrap();
        let errors = spec.check("name", &Value::Null).unwrap_err();
        assert!(errors[0].contains("required"));
    }

    #[test]
    fn test_optional_null_passes() {
        let schema = product_schema();
        let spec = schema.get("price").unwrap();
        assert_eq!(spec.check("price", &Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let spec = FieldSpec::integer();
        let errors = spec.check("count", &json!("not-a-number")).unwrap_err();
        assert!(errors[0].contains("type"));
    }

    #[test]
    fn test_numeric_string_coerced() {
        let spec = FieldSpec::integer();
        assert_eq!(spec.check("count", &json!("42")).unwrap(), json!(42));

        let spec = FieldSpec::float();
        assert_eq!(spec.check("price", &json!("19.90")).unwrap(), json!(19.90));
    }

    #[test]
    fn test_boolean_coercion_from_form_values() {
        let spec = FieldSpec::boolean();
        assert_eq!(spec.check("flag", &json!("on")).unwrap(), json!(true));
        assert_eq!(spec.check("flag", &json!("")).unwrap(), json!(false));
        assert_eq!(spec.check("flag", &json!(true)).unwrap(), json!(true));
        assert!(spec.check("flag", &json!("maybe")).is_err());
    }

    #[test]
    fn test_length_bounds() {
        let schema = product_schema();
        let spec = schema.get("name").unwrap();
        assert!(spec.check("name", &json!("a")).is_err());
        assert!(spec.check("name", &json!("a".repeat(81))).is_err());
        assert!(spec.check("name", &json!("Chair")).is_ok());
    }

    #[test]
    fn test_email_format() {
        let schema = product_schema();
        let spec = schema.get("contact").unwrap();
        assert!(spec.check("contact", &json!("a@example.com")).is_ok());
        let errors = spec.check("contact", &json!("not-an-email")).unwrap_err();
        assert!(errors[0].contains("email"));
    }

    #[test]
    fn test_slug_format() {
        let spec = FieldSpec::string().format(FieldFormat::Slug);
        assert!(spec.check("slug", &json!("my-first-post")).is_ok());
        assert!(spec.check("slug", &json!("My Post")).is_err());
        assert!(spec.check("slug", &json!("-leading")).is_err());
    }

    #[test]
    fn test_allowed_values() {
        let schema = product_schema();
        let spec = schema.get("status").unwrap();
        assert!(spec.check("status", &json!("active")).is_ok());
        assert!(spec.check("status", &json!("deleted")).is_err());
    }

    #[test]
    fn test_uuid_coercion() {
        let spec = FieldSpec::uuid();
        let id = Uuid::new_v4();
        assert_eq!(
            spec.check("ref", &json!(id.to_string())).unwrap(),
            json!(id.to_string())
        );
        assert!(spec.check("ref", &json!("nope")).is_err());
    }

    #[test]
    fn test_datetime_coercion() {
        let spec = FieldSpec::datetime();
        assert!(spec.check("at", &json!("2024-06-01T12:00:00Z")).is_ok());
        assert!(spec.check("at", &json!("June 1st")).is_err());
    }

    #[test]
    fn test_defaults_in_schema_order() {
        let schema = product_schema();
        let defaults = schema.defaults();
        let keys: Vec<&str> = defaults.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["name", "status", "price", "contact"]);
        assert_eq!(defaults["status"], json!("draft"));
        assert_eq!(defaults["name"], Value::Null);
    }

    // --- variant sub-schemas ---

    fn media_schema() -> FieldSchema {
        FieldSchema::new()
            .field("title", FieldSpec::string().required())
            .field(
                "kind",
                FieldSpec::string().required().one_of(["image", "video"]),
            )
            .field("alt_text", FieldSpec::string().in_variant("image"))
            .field("duration", FieldSpec::integer().in_variant("video"))
            .discriminated_by("kind")
    }

    #[test]
    fn test_resolve_variant() {
        let schema = media_schema();
        let mut values = IndexMap::new();
        values.insert("kind".to_string(), json!("video"));
        assert_eq!(schema.resolve_variant(&values).as_deref(), Some("video"));
    }

    #[test]
    fn test_inactive_variant_fields() {
        let schema = media_schema();
        let masked = schema.inactive_variant_fields(Some("video"));
        assert!(masked.contains("alt_text"));
        assert!(!masked.contains("duration"));
        assert!(!masked.contains("title"));
    }

    #[test]
    fn test_no_active_variant_masks_all_variant_fields() {
        let schema = media_schema();
        let masked = schema.inactive_variant_fields(None);
        assert!(masked.contains("alt_text"));
        assert!(masked.contains("duration"));
    }
}
