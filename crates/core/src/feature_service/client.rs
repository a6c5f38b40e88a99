//! Feature layer REST client.

use reqwest::multipart::Form;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::edits::{build_updates, failed_edit_count, UpdateResult};
use super::query::{build_index, query_params};
use crate::errors::{RemoteError, UpdateError};
use crate::models::{Attributes, RemoteId, RemoteIndex};

/// Client for one feature layer, bound to the token of the current run.
#[derive(Clone)]
pub struct FeatureServiceClient {
    http: reqwest::Client,
    layer_url: String,
    token: String,
    name_field: String,
    object_id_field: String,
}

impl FeatureServiceClient {
    pub fn new(
        http: reqwest::Client,
        layer_url: impl Into<String>,
        token: impl Into<String>,
        name_field: impl Into<String>,
        object_id_field: impl Into<String>,
    ) -> Self {
        let layer_url = layer_url.into().trim_end_matches('/').to_string();
        debug!(layer_url = %layer_url, "created FeatureServiceClient");
        Self {
            http,
            layer_url,
            token: token.into(),
            name_field: name_field.into(),
            object_id_field: object_id_field.into(),
        }
    }

    pub fn layer_url(&self) -> &str {
        &self.layer_url
    }

    pub fn object_id_field(&self) -> &str {
        &self.object_id_field
    }

    /// Query every feature and index it by name.
    #[instrument(skip(self), fields(layer_url = %self.layer_url))]
    pub async fn query_index(&self, strict_duplicates: bool) -> Result<RemoteIndex, RemoteError> {
        let url = format!("{}/query", self.layer_url);
        let params = query_params(&self.name_field, &self.object_id_field, &self.token);
        let resp = self.http.get(&url).query(&params).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await?;
        let body: Value =
            serde_json::from_slice(&bytes).map_err(|e| RemoteError::Parse(e.to_string()))?;
        let index = build_index(
            &body,
            &self.name_field,
            &self.object_id_field,
            strict_duplicates,
        )?;
        info!(features = index.len(), "loaded remote index");
        Ok(index)
    }

    /// Send one feature update and classify the response.
    ///
    /// Only transport failures and non-2xx statuses are errors; an in-band
    /// `error` field comes back as `errored`. A body that does not decode is
    /// treated as `null` and therefore classifies as ambiguous.
    #[instrument(skip(self, attributes), fields(target = %id))]
    pub async fn apply_update(
        &self,
        id: &RemoteId,
        attributes: Attributes,
    ) -> Result<UpdateResult, UpdateError> {
        let url = format!("{}/applyEdits", self.layer_url);
        let updates = build_updates(id, &self.object_id_field, attributes);
        let form = Form::new()
            .text("f", "json")
            .text("updates", updates.to_string())
            .text("token", self.token.clone());

        let resp = self.http.post(&url).multipart(form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpdateError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await?;
        let body: Value = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "applyEdits response is not JSON");
                Value::Null
            }
        };

        let failed = failed_edit_count(&body);
        if failed > 0 {
            warn!(failed, "service reported unsuccessful edit results");
        }

        Ok(UpdateResult::interpret(&body))
    }
}
