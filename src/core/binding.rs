//! Binding submitted data onto entities
//!
//! [`EntityBinding::bind`] validates a submitted payload against a
//! [`FieldSchema`] and produces field-keyed error lists, never a single flat
//! error string. [`EntityBinding::populate`] then writes the validated values
//! onto a [`Resource`].
//!
//! The defining difference between the two bind modes:
//! - **Patch**: only fields present in the target set are ever written;
//!   absence is never treated as "set to empty".
//! - **Replace**: all schema fields are targeted; fields absent from the
//!   submission reset to their schema defaults.
//!
//! Polymorphic schemas resolve their discriminant first, mask out fields of
//! inactive variants before validating, and on successful population switch
//! the entity's variant: the old variant's payload is nulled and the new
//! variant's is default-constructed.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde_json::Value;

use crate::core::resource::Resource;
use crate::core::schema::FieldSchema;

/// Validation errors keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Whether absent fields are preserved (patch) or reset (replace).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    Patch,
    Replace,
}

/// Variant transition computed at bind time.
#[derive(Debug, Clone)]
struct VariantSwitch {
    /// Fields of the previous/inactive variants, nulled on populate
    null_fields: BTreeSet<String>,
    /// Fields of the new variant absent from the submission,
    /// default-constructed on populate
    defaults: IndexMap<String, Value>,
}

/// The result of binding a submission against a schema.
#[derive(Debug, Clone)]
pub struct EntityBinding {
    /// Fields that will be written by [`Self::populate`]
    target_fields: BTreeSet<String>,
    /// Raw submitted values, preserved for form re-rendering
    submitted: IndexMap<String, Value>,
    /// Validated, coerced values in schema order
    validated: IndexMap<String, Value>,
    errors: FieldErrors,
    variant_switch: Option<VariantSwitch>,
}

impl EntityBinding {
    /// Bind `submitted` against `schema`.
    ///
    /// `existing` supplies the current variant for polymorphic schemas when
    /// the submission does not name one. `allowed_fields` further restricts
    /// which fields may be written in patch mode; it is ignored for replace.
    pub fn bind(
        schema: &FieldSchema,
        submitted: &IndexMap<String, Value>,
        existing: Option<&Resource>,
        allowed_fields: Option<&BTreeSet<String>>,
        mode: BindMode,
    ) -> Self {
        // Resolve the discriminant first: submission wins, existing entity
        // is the fallback.
        let active_variant = schema.resolve_variant(submitted).or_else(|| {
            existing.and_then(|resource| schema.resolve_variant(&resource.fields))
        });
        let masked = schema.inactive_variant_fields(active_variant.as_deref());

        let target_fields: BTreeSet<String> = match mode {
            BindMode::Patch => submitted
                .keys()
                .filter(|name| schema.contains(name))
                .filter(|name| !masked.contains(*name))
                .filter(|name| allowed_fields.is_none_or(|allowed| allowed.contains(*name)))
                .cloned()
                .collect(),
            BindMode::Replace => schema
                .field_names()
                .filter(|name| !masked.contains(*name))
                .map(|name| name.to_string())
                .collect(),
        };

        let mut validated = IndexMap::new();
        let mut errors = FieldErrors::new();

        // Validate in schema order so error reporting is stable.
        for (name, spec) in schema.iter() {
            if !target_fields.contains(name) {
                continue;
            }
            let value = match (submitted.get(name), mode) {
                (Some(value), _) => value.clone(),
                // Replace: absent resets to the schema default
                (None, BindMode::Replace) => spec.default.clone(),
                (None, BindMode::Patch) => continue,
            };
            match spec.check(name, &value) {
                Ok(coerced) => {
                    validated.insert(name.to_string(), coerced);
                }
                Err(messages) => {
                    errors.insert(name.to_string(), messages);
                }
            }
        }

        // A patch may target fields the submission never named (allowed but
        // absent): drop them from the target set so populate leaves them be.
        let target_fields = match mode {
            BindMode::Patch => target_fields
                .into_iter()
                .filter(|name| submitted.contains_key(name))
                .collect(),
            BindMode::Replace => target_fields,
        };

        // Record the variant transition when the active variant differs from
        // the existing entity's.
        let variant_switch = match (&active_variant, schema.discriminant()) {
            (Some(active), Some(_)) => {
                let existing_variant =
                    existing.and_then(|resource| schema.resolve_variant(&resource.fields));
                if existing_variant.as_deref() != Some(active.as_str()) {
                    let defaults = schema
                        .iter()
                        .filter(|(name, spec)| {
                            spec.variant.as_deref() == Some(active.as_str())
                                && !validated.contains_key(*name)
                        })
                        .map(|(name, spec)| (name.to_string(), spec.default.clone()))
                        .collect();
                    Some(VariantSwitch {
                        null_fields: masked,
                        defaults,
                    })
                } else {
                    None
                }
            }
            _ => None,
        };

        Self {
            target_fields,
            submitted: submitted.clone(),
            validated,
            errors,
            variant_switch,
        }
    }

    /// Convenience: bind with no field restriction.
    pub fn bind_full(
        schema: &FieldSchema,
        submitted: &IndexMap<String, Value>,
        existing: Option<&Resource>,
        mode: BindMode,
    ) -> Self {
        Self::bind(schema, submitted, existing, None, mode)
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// The raw submitted values, for echoing back into a re-rendered form.
    pub fn submitted_values(&self) -> &IndexMap<String, Value> {
        &self.submitted
    }

    /// The validated, coerced values that populate will write.
    pub fn validated_values(&self) -> &IndexMap<String, Value> {
        &self.validated
    }

    pub fn target_fields(&self) -> &BTreeSet<String> {
        &self.target_fields
    }

    /// Write the validated values onto `resource`.
    ///
    /// Only fields in the target set are touched; every other field on the
    /// resource is preserved byte-identical. Fails with the field errors when
    /// the binding is invalid — a failed validation never partially writes.
    pub fn populate(&self, resource: &mut Resource) -> Result<(), FieldErrors> {
        if !self.is_valid() {
            return Err(self.errors.clone());
        }

        // Variant switch: null the outgoing variant's payload, then
        // default-construct the incoming variant's unsubmitted fields.
        if let Some(switch) = &self.variant_switch {
            for name in &switch.null_fields {
                resource.set_field(name.clone(), Value::Null);
            }
            for (name, default) in &switch.defaults {
                resource.set_field(name.clone(), default.clone());
            }
        }

        for (name, value) in &self.validated {
            resource.set_field(name.clone(), value.clone());
        }

        Ok(())
    }
}
