//! Loads the authoritative record set from a JSON URL.

use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::SourceError;
use crate::models::SourceRecord;

/// Fetches and parses the source dataset.
#[derive(Clone)]
pub struct SourceLoader {
    http: reqwest::Client,
    name_field: String,
}

impl SourceLoader {
    pub fn new(http: reqwest::Client, name_field: impl Into<String>) -> Self {
        Self {
            http,
            name_field: name_field.into(),
        }
    }

    /// GET the source URL and parse its body as an array of records.
    #[instrument(skip(self))]
    pub async fn load(&self, url: &str) -> Result<Vec<SourceRecord>, SourceError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = resp.bytes().await?;
        let records = parse_records(&body, &self.name_field)?;
        debug!(count = records.len(), "loaded source records");
        Ok(records)
    }
}

/// Parse a JSON array of records, each carrying a string `name_field`.
pub fn parse_records(body: &[u8], name_field: &str) -> Result<Vec<SourceRecord>, SourceError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| SourceError::Parse(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(SourceError::NotAnArray);
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| SourceRecord::from_value(index, item, name_field))
        .collect()
}
