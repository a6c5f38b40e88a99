//! Field mapping from source records to feature attributes.
//!
//! [`FieldMapper`] is the seam callers plug their own translation into. Plain
//! closures implement it, and [`FieldMapping`] is the table-driven mapper the
//! CLI builds from the `[mapping]` config section.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::MappingError;
use crate::models::{Attributes, SourceRecord};

/// Transforms a source record into the attributes the feature service expects.
pub trait FieldMapper: Send + Sync {
    fn map(&self, record: &SourceRecord) -> Result<Attributes, MappingError>;
}

impl<F> FieldMapper for F
where
    F: Fn(&SourceRecord) -> Result<Attributes, MappingError> + Send + Sync,
{
    fn map(&self, record: &SourceRecord) -> Result<Attributes, MappingError> {
        self(record)
    }
}

/// `[mapping]` config section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Remote attribute name -> source field name. Empty means passthrough.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Leave out attributes whose source field is absent instead of failing.
    #[serde(default)]
    pub skip_missing: bool,
}

impl MappingConfig {
    /// Reject mappings that would overwrite the update's target id.
    /// Attribute names are compared case-insensitively, as the service does.
    pub fn check_reserved(&self, object_id_field: &str) -> Result<(), MappingError> {
        match self
            .fields
            .keys()
            .find(|target| target.eq_ignore_ascii_case(object_id_field))
        {
            Some(target) => Err(MappingError::ReservedField(target.clone())),
            None => Ok(()),
        }
    }
}

/// Table-driven [`FieldMapper`].
#[derive(Debug, Clone)]
pub struct FieldMapping {
    fields: BTreeMap<String, String>,
    skip_missing: bool,
    name_field: String,
}

impl FieldMapping {
    /// `name_field` is the source natural key; passthrough mode leaves it out.
    pub fn new(config: &MappingConfig, name_field: impl Into<String>) -> Self {
        Self {
            fields: config.fields.clone(),
            skip_missing: config.skip_missing,
            name_field: name_field.into(),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.fields.is_empty()
    }

    fn passthrough(&self, record: &SourceRecord) -> Attributes {
        record
            .fields
            .iter()
            .filter(|(key, _)| **key != self.name_field)
            .filter(|(key, value)| {
                let scalar = is_scalar(value);
                if !scalar {
                    debug!(field = %key, "passthrough skips non-scalar field");
                }
                scalar
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl FieldMapper for FieldMapping {
    fn map(&self, record: &SourceRecord) -> Result<Attributes, MappingError> {
        if self.is_passthrough() {
            return Ok(self.passthrough(record));
        }

        let mut attributes = Attributes::new();
        for (target, source_field) in &self.fields {
            match record.get(source_field) {
                Some(value) if is_scalar(value) => {
                    attributes.insert(target.clone(), value.clone());
                }
                Some(_) => return Err(MappingError::NotScalar(source_field.clone())),
                None if self.skip_missing => {
                    debug!(record = %record.name, field = %source_field, "skipping missing field");
                }
                None => return Err(MappingError::MissingField(source_field.clone())),
            }
        }
        Ok(attributes)
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}
