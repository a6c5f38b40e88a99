//! Domain model types used throughout FeatureSync.
//!
//! These types bridge the loaders, the update applier and the reconciliation
//! report handed back to callers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::AuthMode;
use crate::errors::SourceError;

/// Attribute set sent to the feature service for one feature.
pub type Attributes = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Source records
// ---------------------------------------------------------------------------

/// A record from the authoritative source dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    /// Natural key, used verbatim for matching.
    pub name: String,
    /// Every field of the record as delivered, including the natural key.
    pub fields: Attributes,
}

impl SourceRecord {
    /// Build a record from one element of the source array.
    ///
    /// `index` is the element's position and only feeds the error message.
    pub fn from_value(index: usize, value: Value, name_field: &str) -> Result<Self, SourceError> {
        let missing = || SourceError::MissingName {
            index,
            field: name_field.to_string(),
        };
        let Value::Object(fields) = value else {
            return Err(missing());
        };
        let name = fields
            .get(name_field)
            .and_then(Value::as_str)
            .ok_or_else(missing)?
            .to_string();
        Ok(Self { name, fields })
    }

    /// Look up a field of the record.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

// ---------------------------------------------------------------------------
// Remote features
// ---------------------------------------------------------------------------

/// Opaque identifier of a remote feature (its object id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Accept numeric or string object ids as returned by the query endpoint.
    /// Whole-number floats (`101.0`) are written in integer form.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if n.is_f64() => {
                let f = n.as_f64()?;
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
                    Some(Self(format!("{}", f as i64)))
                } else {
                    Some(Self(n.to_string()))
                }
            }
            Value::Number(n) => Some(Self(n.to_string())),
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lookup from natural key to remote identifier, built once per run.
///
/// Later inserts for the same name replace earlier ones; the replaced names
/// are remembered so callers can report or reject them.
#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
    entries: HashMap<String, RemoteId>,
    duplicates: Vec<String>,
}

impl RemoteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `name -> id`, returning the id it replaced, if any.
    pub fn insert(&mut self, name: impl Into<String>, id: RemoteId) -> Option<RemoteId> {
        let name = name.into();
        let previous = self.entries.insert(name.clone(), id);
        if previous.is_some() {
            self.duplicates.push(name);
        }
        previous
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&RemoteId> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names that were inserted more than once, in the order they were overwritten.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// Entries sorted by name, for display.
    pub fn sorted_entries(&self) -> Vec<(&str, &RemoteId)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(name, id)| (name.as_str(), id))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl FromIterator<(String, RemoteId)> for RemoteIndex {
    fn from_iter<I: IntoIterator<Item = (String, RemoteId)>>(iter: I) -> Self {
        let mut index = Self::new();
        for (name, id) in iter {
            index.insert(name, id);
        }
        index
    }
}

/// Error object returned in-band by ArcGIS endpoints (`{"error": {...}}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceFault {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

impl ServiceFault {
    /// Message plus any detail lines, for error reporting.
    pub fn describe(&self) -> String {
        if self.details.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, self.details.join("; "))
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Classification of one source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Matched and accepted by the feature service.
    Sent,
    /// No remote feature carries this name.
    Unmatched,
    /// Matched, but the update response carried an `error`.
    Rejected,
    /// Matched, and the update response was neither success nor error.
    Ambiguous,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Unmatched => write!(f, "failure"),
            Self::Rejected => write!(f, "error"),
            Self::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Result of a reconciliation run: every source name lands in exactly one
/// bucket, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub sent: Vec<String>,
    pub failures: Vec<String>,
    pub errors: Vec<String>,
    pub ambiguous: Vec<String>,
}

impl ReconciliationReport {
    /// Append `name` to the bucket for `outcome`.
    pub fn record(&mut self, name: impl Into<String>, outcome: Outcome) {
        let bucket = match outcome {
            Outcome::Sent => &mut self.sent,
            Outcome::Unmatched => &mut self.failures,
            Outcome::Rejected => &mut self.errors,
            Outcome::Ambiguous => &mut self.ambiguous,
        };
        bucket.push(name.into());
    }

    /// Number of classified records across all buckets.
    pub fn total(&self) -> usize {
        self.sent.len() + self.failures.len() + self.errors.len() + self.ambiguous.len()
    }

    /// True when every record was sent.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty() && self.ambiguous.is_empty()
    }
}

/// A report together with metadata about the run that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub auth_mode: AuthMode,
    pub source_count: usize,
    pub index_size: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub report: ReconciliationReport,
}

/// What a run would do, computed without issuing any update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    /// Matched names with their target ids, in source order.
    pub matched: Vec<(String, RemoteId)>,
    /// Names with no remote counterpart, in source order.
    pub failures: Vec<String>,
}
