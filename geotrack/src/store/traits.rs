//! Interface to the remote document store holding current locations.
//!
//! The store keeps one document per subject, keyed by subject id. The engine
//! only ever reads: a one-shot fetch during bootstrap and a standing
//! subscription afterwards. Writing positions is the job of the device-side
//! producer and is not modeled here.
//!
//! # Dyn Compatibility
//!
//! `fetch_once` returns a `Pin<Box<dyn Future>>` so the engine can hold the
//! store as `Arc<dyn LocationStore>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Field name holding the latitude in degrees.
pub const FIELD_LATITUDE: &str = "latitude";
/// Field name holding the longitude in degrees.
pub const FIELD_LONGITUDE: &str = "longitude";
/// Field name holding the observation time.
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback invoked by a subscription for every change notification.
///
/// `Ok` carries the document as it now is (possibly non-existent); `Err`
/// reports a failure of the subscription itself.
pub type SnapshotCallback = Arc<dyn Fn(Result<DocumentSnapshot, StoreError>) + Send + Sync>;

/// Transport-level failures reported by a store adapter.
///
/// A missing document is not an error; it is a [`DocumentSnapshot`] whose
/// `exists()` is false.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network failure talking to the backend.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend refused access to the document.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backend is temporarily unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Adapter-specific failure.
    #[error("Store error: {0}")]
    Other(String),
}

/// Errors reading a typed field out of a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Field holds a value of the wrong type.
    #[error("Field '{field}' is not {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    /// Timestamp field could not be interpreted as a point in time.
    #[error("Field '{field}' is not a valid timestamp: {value}")]
    InvalidTimestamp { field: String, value: String },
}

/// Point-in-time view of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    id: String,
    data: Option<Map<String, Value>>,
}

impl DocumentSnapshot {
    /// Snapshot of an existing document with the given fields.
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data: Some(fields),
        }
    }

    /// Snapshot of a document that does not exist.
    pub fn missing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
        }
    }

    /// Snapshot of a well-formed location document.
    ///
    /// The timestamp is stored as RFC 3339 when present.
    pub fn location(
        id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        let mut fields = Map::new();
        fields.insert(FIELD_LATITUDE.to_string(), Value::from(latitude));
        fields.insert(FIELD_LONGITUDE.to_string(), Value::from(longitude));
        if let Some(ts) = timestamp {
            fields.insert(FIELD_TIMESTAMP.to_string(), Value::from(ts.to_rfc3339()));
        }
        Self::new(id, fields)
    }

    /// Identifier of the backing document.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the document exists.
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    /// Read a numeric field.
    ///
    /// Returns `Ok(None)` when the field (or the document) is absent or null.
    pub fn get_f64(&self, field: &str) -> Result<Option<f64>, FieldError> {
        match self.raw(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| FieldError::WrongType {
                field: field.to_string(),
                expected: "a number",
            }),
        }
    }

    /// Read a timestamp field.
    ///
    /// Accepts RFC 3339 strings or integer milliseconds since the Unix epoch.
    /// Returns `Ok(None)` when the field is absent or null.
    pub fn get_timestamp(&self, field: &str) -> Result<Option<DateTime<Utc>>, FieldError> {
        let invalid = |value: &Value| FieldError::InvalidTimestamp {
            field: field.to_string(),
            value: value.to_string(),
        };

        let value = match self.raw(field) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };

        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(|_| invalid(value)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .map(Some)
                .ok_or_else(|| invalid(value)),
            _ => Err(FieldError::WrongType {
                field: field.to_string(),
                expected: "a timestamp",
            }),
        }
    }

    fn raw(&self, field: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|fields| fields.get(field))
    }
}

/// Remote document store holding one current-location document per subject.
///
/// Implementations own retry and backoff; every error they surface is
/// treated by the engine as final for that attempt.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Subscription callbacks may be
/// invoked from any thread, but for a given subscription they must be
/// invoked sequentially, in delivery order.
pub trait LocationStore: Send + Sync {
    /// Fetch the subject's document once.
    fn fetch_once(&self, subject_id: &str) -> BoxFuture<'_, Result<DocumentSnapshot, StoreError>>;

    /// Open a live subscription to the subject's document.
    ///
    /// `on_event` is invoked for every change until `cancellation` is
    /// cancelled. An adapter may deliver one in-flight event after
    /// cancellation; callers must tolerate that.
    fn subscribe(
        &self,
        subject_id: &str,
        cancellation: CancellationToken,
        on_event: SnapshotCallback,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> DocumentSnapshot {
        match value {
            Value::Object(fields) => DocumentSnapshot::new("doc", fields),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_missing_document() {
        let snapshot = DocumentSnapshot::missing("u1");
        assert!(!snapshot.exists());
        assert_eq!(snapshot.id(), "u1");
        assert_eq!(snapshot.get_f64(FIELD_LATITUDE), Ok(None));
    }

    #[test]
    fn test_get_f64_accepts_integers() {
        let snapshot = doc(json!({ "latitude": 48 }));
        assert_eq!(snapshot.get_f64("latitude"), Ok(Some(48.0)));
    }

    #[test]
    fn test_get_f64_wrong_type() {
        let snapshot = doc(json!({ "latitude": "north" }));
        assert!(matches!(
            snapshot.get_f64("latitude"),
            Err(FieldError::WrongType { .. })
        ));
    }

    #[test]
    fn test_get_timestamp_formats() {
        let snapshot = doc(json!({
            "rfc": "2024-05-01T12:00:00Z",
            "millis": 1_714_564_800_000_i64,
            "null": null,
        }));

        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(snapshot.get_timestamp("rfc"), Ok(Some(expected)));
        assert_eq!(snapshot.get_timestamp("millis"), Ok(Some(expected)));
        assert_eq!(snapshot.get_timestamp("null"), Ok(None));
        assert_eq!(snapshot.get_timestamp("absent"), Ok(None));
    }

    #[test]
    fn test_get_timestamp_invalid() {
        let snapshot = doc(json!({ "ts": "yesterday", "flag": true }));
        assert!(matches!(
            snapshot.get_timestamp("ts"),
            Err(FieldError::InvalidTimestamp { .. })
        ));
        assert!(matches!(
            snapshot.get_timestamp("flag"),
            Err(FieldError::WrongType { .. })
        ));
    }

    #[test]
    fn test_location_constructor() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let snapshot = DocumentSnapshot::location("u1", 48.85, 2.35, Some(ts));
        assert!(snapshot.exists());
        assert_eq!(snapshot.get_f64(FIELD_LATITUDE), Ok(Some(48.85)));
        assert_eq!(snapshot.get_f64(FIELD_LONGITUDE), Ok(Some(2.35)));
        assert_eq!(snapshot.get_timestamp(FIELD_TIMESTAMP), Ok(Some(ts)));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::PermissionDenied("missing rules".to_string());
        assert_eq!(err.to_string(), "Permission denied: missing rules");
    }
}
