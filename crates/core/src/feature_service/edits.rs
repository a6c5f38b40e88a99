//! `applyEdits` payload construction and response classification.

use serde_json::{json, Value};
use tracing::warn;

use crate::models::{Attributes, Outcome, RemoteId};

/// Build the single-element `updates` array for one feature.
///
/// The target id always wins: a mapped attribute with the same name as the
/// object id field (compared case-insensitively) is dropped.
pub fn build_updates(id: &RemoteId, object_id_field: &str, attributes: Attributes) -> Value {
    let mut merged: Attributes = attributes
        .into_iter()
        .filter(|(key, _)| {
            let reserved = key.eq_ignore_ascii_case(object_id_field);
            if reserved {
                warn!(field = %key, target = %id, "dropping mapped attribute that collides with the object id");
            }
            !reserved
        })
        .collect();
    merged.insert(object_id_field.to_string(), Value::String(id.to_string()));
    json!([{ "attributes": merged }])
}

/// How the service answered one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Truthy response without an `error` field.
    pub ok: bool,
    /// Response carried an `error` field.
    pub errored: bool,
    /// Message of the `error` field, when there is one.
    pub message: Option<String>,
}

impl UpdateResult {
    /// Classify a decoded response body.
    ///
    /// `errored` requires a non-null `error` member on an object body. `ok`
    /// follows loose truthiness: `null`, `false`, zero, `""`, `"0"` and `[]`
    /// are falsy, every object (including `{}`) is truthy.
    pub fn interpret(body: &Value) -> Self {
        let error = body
            .as_object()
            .and_then(|o| o.get("error"))
            .filter(|e| !e.is_null());

        match error {
            Some(error) => Self {
                ok: false,
                errored: true,
                message: Some(error_message(error)),
            },
            None => Self {
                ok: is_truthy(body),
                errored: false,
                message: None,
            },
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.errored {
            Outcome::Rejected
        } else if self.ok {
            Outcome::Sent
        } else {
            Outcome::Ambiguous
        }
    }
}

/// Number of entries in `updateResults` reporting `success: false`.
///
/// These do not change the classification; the client only logs them.
pub fn failed_edit_count(body: &Value) -> usize {
    body.get("updateResults")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter(|r| r.get("success") == Some(&Value::Bool(false)))
                .count()
        })
        .unwrap_or(0)
}

/// Human-readable text of an in-band `error` value: its `message` when it is an
/// object, the string itself, or the raw JSON otherwise.
pub(super) fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(o) => o
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_build_updates_single_element_with_string_id() {
        let updates = build_updates(
            &RemoteId::new("101"),
            "OBJECTID",
            attrs(json!({"STATUS": "open", "VOTES": 4})),
        );
        assert_eq!(
            updates,
            json!([{"attributes": {"OBJECTID": "101", "STATUS": "open", "VOTES": 4}}])
        );
    }

    #[test]
    fn test_build_updates_target_id_wins() {
        let updates = build_updates(
            &RemoteId::new("7"),
            "OBJECTID",
            attrs(json!({"OBJECTID": 999, "objectid": 998, "STATUS": "x"})),
        );
        let merged = &updates[0]["attributes"];
        assert_eq!(merged["OBJECTID"], json!("7"));
        assert!(merged.get("objectid").is_none());
        assert_eq!(merged.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_interpret_empty_object_is_sent() {
        let result = UpdateResult::interpret(&json!({}));
        assert!(result.ok);
        assert!(!result.errored);
        assert_eq!(result.outcome(), Outcome::Sent);
    }

    #[test]
    fn test_interpret_error_field_is_rejected() {
        let result = UpdateResult::interpret(&json!({"error": "x"}));
        assert!(result.errored);
        assert!(!result.ok);
        assert_eq!(result.message.as_deref(), Some("x"));
        assert_eq!(result.outcome(), Outcome::Rejected);

        let result = UpdateResult::interpret(&json!({
            "error": {"code": 400, "message": "Unable to complete operation.", "details": []}
        }));
        assert_eq!(result.message.as_deref(), Some("Unable to complete operation."));
    }

    #[test]
    fn test_interpret_null_error_is_not_an_error() {
        let result = UpdateResult::interpret(&json!({"error": null, "updateResults": []}));
        assert!(!result.errored);
        assert!(result.ok);
    }

    #[test]
    fn test_interpret_falsy_bodies_are_ambiguous() {
        for body in [json!(null), json!(false), json!(0), json!(""), json!("0"), json!([])] {
            let result = UpdateResult::interpret(&body);
            assert_eq!(result.outcome(), Outcome::Ambiguous, "body: {}", body);
        }
    }

    #[test]
    fn test_interpret_truthy_scalars_are_sent() {
        for body in [json!(true), json!(1), json!("ok"), json!([1])] {
            assert_eq!(UpdateResult::interpret(&body).outcome(), Outcome::Sent);
        }
    }

    #[test]
    fn test_failed_edit_count() {
        let body = json!({
            "updateResults": [
                {"objectId": 1, "success": true},
                {"objectId": 2, "success": false, "error": {"code": 1000}}
            ]
        });
        assert_eq!(failed_edit_count(&body), 1);
        assert_eq!(failed_edit_count(&json!({})), 0);
    }
}
