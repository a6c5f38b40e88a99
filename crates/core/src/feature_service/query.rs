//! The "all features" query and the index built from its response.

use serde_json::Value;
use tracing::warn;

use super::edits::error_message;
use crate::errors::RemoteError;
use crate::models::{RemoteId, RemoteIndex, ServiceFault};

/// Fixed parameters of the "all features" query. `outFields` and `token` are
/// filled in per run; empty parameters are sent explicitly and the service
/// treats them as unset.
const QUERY_PARAMS: &[(&str, &str)] = &[
    ("where", "1=1"),
    ("objectIds", ""),
    ("time", ""),
    ("geometry", ""),
    ("geometryType", "esriGeometryEnvelope"),
    ("inSR", ""),
    ("spatialRel", "esriSpatialRelIntersects"),
    ("resultType", "none"),
    ("distance", ""),
    ("units", "esriSRUnit_Meter"),
    ("outFields", ""),
    ("returnGeometry", "false"),
    ("returnCentroid", "false"),
    ("multipatchOption", ""),
    ("maxAllowableOffset", ""),
    ("geometryPrecision", ""),
    ("outSR", ""),
    ("returnIdsOnly", "false"),
    ("returnCountOnly", "false"),
    ("returnExtentOnly", "false"),
    ("returnDistinctValues", "false"),
    ("orderByFields", ""),
    ("groupByFieldsForStatistics", ""),
    ("outStatistics", ""),
    ("resultOffset", ""),
    ("resultRecordCount", ""),
    ("returnZ", "false"),
    ("returnM", "false"),
    ("quantizationParameters", ""),
    ("f", "json"),
    ("token", ""),
];

/// Query parameters selecting every feature with only the key and id fields.
pub fn query_params(
    name_field: &str,
    object_id_field: &str,
    token: &str,
) -> Vec<(&'static str, String)> {
    QUERY_PARAMS
        .iter()
        .map(|&(key, value)| {
            let value = match key {
                "outFields" => format!("{}, {}", name_field, object_id_field),
                "token" => token.to_string(),
                _ => value.to_string(),
            };
            (key, value)
        })
        .collect()
}

/// Build the name -> object id index from a query response body.
///
/// Features missing either field are skipped. With `strict_duplicates` a
/// repeated name is an error; otherwise the later feature wins.
pub fn build_index(
    body: &Value,
    name_field: &str,
    object_id_field: &str,
    strict_duplicates: bool,
) -> Result<RemoteIndex, RemoteError> {
    if let Some(fault) = body.get("error").filter(|e| !e.is_null()) {
        let (code, message) = match serde_json::from_value::<ServiceFault>(fault.clone()) {
            Ok(parsed) if !parsed.message.is_empty() => (parsed.code, parsed.describe()),
            Ok(parsed) => (parsed.code, error_message(fault)),
            Err(_) => (0, error_message(fault)),
        };
        return Err(RemoteError::Service { code, message });
    }

    let features = body
        .get("features")
        .and_then(Value::as_array)
        .ok_or(RemoteError::MissingFeatures)?;

    let mut index = RemoteIndex::new();
    for (position, feature) in features.iter().enumerate() {
        let attributes = feature.get("attributes");
        let name = attributes
            .and_then(|a| field(a, name_field))
            .and_then(Value::as_str);
        let id = attributes
            .and_then(|a| field(a, object_id_field))
            .and_then(RemoteId::from_value);

        let (Some(name), Some(id)) = (name, id) else {
            warn!(position, "skipping feature without name or object id");
            continue;
        };

        if index.insert(name, id).is_some() && strict_duplicates {
            return Err(RemoteError::DuplicateName {
                name: name.to_string(),
            });
        }
    }

    if !index.duplicates().is_empty() {
        warn!(
            count = index.duplicates().len(),
            "remote features share names; later features win"
        );
    }

    Ok(index)
}

/// Attribute lookup by field name. Field names are matched exactly first and
/// then case-insensitively, since the service may echo a different case than
/// was requested in `outFields`.
fn field<'a>(attributes: &'a Value, name: &str) -> Option<&'a Value> {
    let map = attributes.as_object()?;
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}
