//! Wire Protocol Types
//!
//! This module defines the JSON messages exchanged between clients and the
//! server. Every message travels inside a length-prefixed frame (see
//! [`crate::protocol::framing`]); the types here describe the frame bodies.
//!
//! ## Message Shapes
//!
//! Request: `{"UUID": "<client>", "ACTION": "get", "ID": "x1"}`
//! Success: `{"OK": true, "DATA": {...}}`
//! Failure: `{"OK": false, "Error": "NotFound"}`
//! Subscribe ack: `{"OK": true, "ACTION": "subscribe"}`
//! Change push: `{"ACTION": "change", "DATA": {...}}`
//!
//! Field names are part of the wire contract and are mapped onto idiomatic
//! Rust names with serde renames. Unknown request fields are ignored so the
//! envelope stays open to client-side extras.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// The `ACTION` value carried by every change push.
pub const CHANGE_ACTION: &str = "change";

/// Operations a client may request, selected by the `ACTION` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Park the connection and stream every future record change to it.
    Subscribe,
    /// Fetch one record by `ID`.
    Get,
    /// Fetch every stored record.
    List,
    /// Insert or field-wise update the record in `DATA`.
    Set,
}

impl Action {
    /// Parses a raw `ACTION` field. Surrounding whitespace and letter case
    /// are forgiven; anything unrecognized is `None`.
    pub fn parse(raw: &str) -> Option<Action> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "subscribe" => Some(Action::Subscribe),
            "get" => Some(Action::Get),
            "list" => Some(Action::List),
            "set" => Some(Action::Set),
            _ => None,
        }
    }

    /// The canonical lowercase spelling used in audit entries and acks.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Subscribe => "subscribe",
            Action::Get => "get",
            Action::List => "list",
            Action::Set => "set",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request envelope exactly as it arrived on the wire.
///
/// Every field is optional at this stage; [`RawRequest::validate`] checks
/// the envelope and produces a [`Request`]. Keeping the raw shape separate
/// means a malformed envelope can still be inspected and reported verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRequest {
    /// Caller-chosen identity. Required; also the subscription key.
    #[serde(rename = "UUID", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Which operation to run.
    #[serde(rename = "ACTION", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Record id for `get`.
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Record payload for `set`.
    #[serde(rename = "DATA", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RawRequest {
    /// Builds a `subscribe` request.
    pub fn subscribe(client_id: impl Into<String>) -> Self {
        RawRequest {
            client_id: Some(client_id.into()),
            action: Some(Action::Subscribe.as_str().to_string()),
            ..RawRequest::default()
        }
    }

    /// Builds a `get` request for one record id.
    pub fn get(client_id: impl Into<String>, id: impl Into<String>) -> Self {
        RawRequest {
            client_id: Some(client_id.into()),
            action: Some(Action::Get.as_str().to_string()),
            id: Some(id.into()),
            ..RawRequest::default()
        }
    }

    /// Builds a `list` request.
    pub fn list(client_id: impl Into<String>) -> Self {
        RawRequest {
            client_id: Some(client_id.into()),
            action: Some(Action::List.as_str().to_string()),
            ..RawRequest::default()
        }
    }

    /// Builds a `set` request carrying a record payload.
    pub fn set(client_id: impl Into<String>, data: Value) -> Self {
        RawRequest {
            client_id: Some(client_id.into()),
            action: Some(Action::Set.as_str().to_string()),
            data: Some(data),
            ..RawRequest::default()
        }
    }

    /// Envelope validation: identity present and action recognized.
    ///
    /// Action-specific fields (`ID`, `DATA`) are deliberately not checked
    /// here; those checks run after the attempt has been written to the
    /// audit log, so the log also records requests that fail them.
    pub fn validate(self) -> Result<Request, EnvelopeError> {
        let client_id = match self.client_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(EnvelopeError::MissingClientId),
        };
        let raw_action = self.action.unwrap_or_default();
        let action = match Action::parse(&raw_action) {
            Some(action) => action,
            None => return Err(EnvelopeError::UnknownAction(raw_action)),
        };
        Ok(Request {
            client_id,
            action,
            id: self.id,
            data: self.data,
        })
    }
}

/// Why an envelope was rejected before dispatch.
///
/// The `Display` strings are the exact `Error` values sent back on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Every request must carry a non-empty `UUID`.
    #[error("Missing UUID")]
    MissingClientId,

    /// `ACTION` was absent or named no known operation. Carries the raw
    /// value so the peer sees exactly what the server could not place.
    #[error("Unknown ACTION '{0}'")]
    UnknownAction(String),
}

/// An envelope that passed validation.
///
/// `id` and `data` stay optional: each action checks its own requirements
/// once the attempt has been logged.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub client_id: String,
    pub action: Action,
    pub id: Option<String>,
    pub data: Option<Value>,
}

/// A response frame.
///
/// `DATA` carries the result of a successful `get`/`list`/`set`; the
/// subscribe acknowledgement echoes its action instead; failures carry
/// `Error` with `OK` false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "OK")]
    pub ok: bool,

    #[serde(rename = "ACTION", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(rename = "DATA", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Successful response carrying a result payload.
    pub fn with_data(data: Value) -> Self {
        Response {
            ok: true,
            action: None,
            data: Some(data),
            error: None,
        }
    }

    /// The acknowledgement a subscriber receives before its connection is
    /// parked: `{"OK": true, "ACTION": "subscribe"}`.
    pub fn subscribed() -> Self {
        Response {
            ok: true,
            action: Some(Action::Subscribe.as_str().to_string()),
            data: None,
            error: None,
        }
    }

    /// Failure response with an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Response {
            ok: false,
            action: None,
            data: None,
            error: Some(message.into()),
        }
    }

    /// The fixed failure sent when a `get` finds no record.
    pub fn not_found() -> Self {
        Response::error("NotFound")
    }
}

/// The unsolicited frame pushed to every subscriber when a record is stored.
///
/// `DATA` holds the full post-merge record, so late subscribers that missed
/// earlier changes still see complete state in the next push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotice {
    #[serde(rename = "ACTION")]
    pub action: String,

    #[serde(rename = "DATA")]
    pub data: Record,
}

impl ChangeNotice {
    /// Wraps a stored record in the push envelope.
    pub fn new(record: Record) -> Self {
        ChangeNotice {
            action: CHANGE_ACTION.to_string(),
            data: record,
        }
    }
}

/// One stored record: an open-ended field map whose `id` field is the
/// store's primary key.
///
/// The envelope around records is typed; the records themselves are
/// legitimately schema-less, so this is a transparent newtype over a JSON
/// object rather than a fixed struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    /// The primary key, when present as a non-empty string.
    pub fn id(&self) -> Option<&str> {
        match self.0.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    /// Field-wise merge: every field of `incoming` lands in this record,
    /// overwriting same-named fields and adding new ones. Fields the
    /// incoming record does not mention are kept untouched, so partial
    /// updates never erase the rest of a record.
    pub fn merge(&mut self, incoming: Record) {
        for (key, value) in incoming.0 {
            self.0.insert(key, value);
        }
    }

    /// Builds a record from a JSON value; anything but an object is `None`.
    pub fn from_value(value: Value) -> Option<Record> {
        match value {
            Value::Object(map) => Some(Record(map)),
            _ => None,
        }
    }

    /// Unwraps back into a plain JSON value for response payloads.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// One immutable audit entry: who attempted which action against which id,
/// and when.
///
/// `ts` is a millisecond Unix timestamp. Callers normally leave it unset
/// and let the event log stamp it at append time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The caller's identity, as taken from the request envelope.
    #[serde(rename = "UUID")]
    pub client_id: String,

    /// Server-issued token unique to this attempt.
    pub session: String,

    /// Canonical action name.
    pub action: String,

    /// Target record id, when the action names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<u64>,
}

impl LogEntry {
    /// A new unstamped entry; the event log assigns `ts` on append.
    pub fn attempt(
        client_id: impl Into<String>,
        session: impl Into<String>,
        action: Action,
        id: Option<String>,
    ) -> Self {
        LogEntry {
            client_id: client_id.into(),
            session: session.into(),
            action: action.as_str().to_string(),
            id,
            ts: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_parse_is_trimmed_and_case_insensitive() {
        assert_eq!(Action::parse("set"), Some(Action::Set));
        assert_eq!(Action::parse("  GET "), Some(Action::Get));
        assert_eq!(Action::parse("Subscribe"), Some(Action::Subscribe));
        assert_eq!(Action::parse("LIST"), Some(Action::List));
        assert_eq!(Action::parse("frobnicate"), None);
        assert_eq!(Action::parse(""), None);
    }

    #[test]
    fn test_request_parses_wire_field_names() {
        let raw: RawRequest = serde_json::from_value(json!({
            "UUID": "client-1",
            "ACTION": "get",
            "ID": "x1",
        }))
        .unwrap();
        assert_eq!(raw.client_id.as_deref(), Some("client-1"));
        assert_eq!(raw.action.as_deref(), Some("get"));
        assert_eq!(raw.id.as_deref(), Some("x1"));
        assert!(raw.data.is_none());
    }

    #[test]
    fn test_request_ignores_unknown_fields() {
        let raw: RawRequest = serde_json::from_value(json!({
            "UUID": "client-1",
            "ACTION": "list",
            "client_version": "2.4",
        }))
        .unwrap();
        assert!(raw.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_identity() {
        let missing = RawRequest {
            action: Some("list".to_string()),
            ..RawRequest::default()
        };
        assert_eq!(missing.validate(), Err(EnvelopeError::MissingClientId));

        let empty = RawRequest {
            client_id: Some(String::new()),
            action: Some("list".to_string()),
            ..RawRequest::default()
        };
        assert_eq!(empty.validate(), Err(EnvelopeError::MissingClientId));
        assert_eq!(EnvelopeError::MissingClientId.to_string(), "Missing UUID");
    }

    #[test]
    fn test_validate_reports_raw_unknown_action() {
        let raw = RawRequest {
            client_id: Some("client-1".to_string()),
            action: Some("Frobnicate".to_string()),
            ..RawRequest::default()
        };
        let err = raw.validate().unwrap_err();
        assert_eq!(err.to_string(), "Unknown ACTION 'Frobnicate'");
    }

    #[test]
    fn test_validate_treats_absent_action_as_unknown() {
        let raw = RawRequest {
            client_id: Some("client-1".to_string()),
            ..RawRequest::default()
        };
        assert_eq!(
            raw.validate().unwrap_err().to_string(),
            "Unknown ACTION ''"
        );
    }

    #[test]
    fn test_response_serializes_without_absent_fields() {
        let ok = serde_json::to_value(Response::with_data(json!({"id": "x1"}))).unwrap();
        assert_eq!(ok, json!({"OK": true, "DATA": {"id": "x1"}}));

        let err = serde_json::to_value(Response::not_found()).unwrap();
        assert_eq!(err, json!({"OK": false, "Error": "NotFound"}));

        let ack = serde_json::to_value(Response::subscribed()).unwrap();
        assert_eq!(ack, json!({"OK": true, "ACTION": "subscribe"}));
    }

    #[test]
    fn test_change_notice_wire_shape() {
        let record = Record::from_value(json!({"id": "x1", "name": "Ann"})).unwrap();
        let notice = serde_json::to_value(ChangeNotice::new(record)).unwrap();
        assert_eq!(
            notice,
            json!({"ACTION": "change", "DATA": {"id": "x1", "name": "Ann"}})
        );
    }

    #[test]
    fn test_record_id_requires_non_empty_string() {
        let ok = Record::from_value(json!({"id": "x1"})).unwrap();
        assert_eq!(ok.id(), Some("x1"));

        let empty = Record::from_value(json!({"id": ""})).unwrap();
        assert_eq!(empty.id(), None);

        let numeric = Record::from_value(json!({"id": 7})).unwrap();
        assert_eq!(numeric.id(), None);

        let absent = Record::from_value(json!({"name": "Ann"})).unwrap();
        assert_eq!(absent.id(), None);
    }

    #[test]
    fn test_record_merge_keeps_unmentioned_fields() {
        let mut stored = Record::from_value(json!({"id": "x1", "name": "Ann"})).unwrap();
        let update = Record::from_value(json!({"id": "x1", "checkpoint": "3260"})).unwrap();
        stored.merge(update);
        assert_eq!(
            stored.into_value(),
            json!({"id": "x1", "name": "Ann", "checkpoint": "3260"})
        );
    }

    #[test]
    fn test_record_merge_overwrites_same_named_fields() {
        let mut stored = Record::from_value(json!({"id": "x1", "name": "Ann"})).unwrap();
        stored.merge(Record::from_value(json!({"name": "Beth"})).unwrap());
        assert_eq!(stored.into_value(), json!({"id": "x1", "name": "Beth"}));
    }

    #[test]
    fn test_record_rejects_non_objects() {
        assert!(Record::from_value(json!("x1")).is_none());
        assert!(Record::from_value(json!([1, 2])).is_none());
        assert!(Record::from_value(json!(null)).is_none());
    }

    #[test]
    fn test_log_entry_serializes_wire_names() {
        let entry = LogEntry::attempt("client-1", "session-1", Action::Get, Some("x1".into()));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({
                "UUID": "client-1",
                "session": "session-1",
                "action": "get",
                "id": "x1",
            })
        );
    }
}
