//! The current-location value type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{validate_coordinates, CoordError};
use crate::store::{DocumentSnapshot, FieldError, FIELD_LATITUDE, FIELD_LONGITUDE, FIELD_TIMESTAMP};

/// Reasons a document cannot be turned into a [`LocationRecord`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// Subject identifier is empty or blank.
    #[error("Subject id must not be empty")]
    EmptySubjectId,

    /// The document does not exist.
    #[error("Document does not exist")]
    MissingDocument,

    /// One or both coordinates are absent.
    #[error("Missing coordinates: latitude={latitude:?}, longitude={longitude:?}")]
    MissingCoordinates {
        latitude: Option<f64>,
        longitude: Option<f64>,
    },

    /// A field holds an unusable value.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// Coordinates outside the WGS84 range.
    #[error(transparent)]
    Coordinate(#[from] CoordError),
}

/// "Subject X was at (latitude, longitude) at time T."
///
/// Immutable once built; the engine replaces records wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    subject_id: String,
    latitude: f64,
    longitude: f64,
    observed_at: DateTime<Utc>,
    source_record_id: String,
}

impl LocationRecord {
    /// Build a record, validating the subject id and coordinate ranges.
    pub fn new(
        subject_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        observed_at: DateTime<Utc>,
        source_record_id: impl Into<String>,
    ) -> Result<Self, RecordError> {
        let subject_id = subject_id.into();
        if subject_id.trim().is_empty() {
            return Err(RecordError::EmptySubjectId);
        }
        validate_coordinates(latitude, longitude)?;

        Ok(Self {
            subject_id,
            latitude,
            longitude,
            observed_at,
            source_record_id: source_record_id.into(),
        })
    }

    /// Parse a store document into a record for `subject_id`.
    ///
    /// `ingested_at` stands in for the observation time when the document
    /// carries no timestamp.
    pub fn from_snapshot(
        subject_id: &str,
        snapshot: &DocumentSnapshot,
        ingested_at: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        if !snapshot.exists() {
            return Err(RecordError::MissingDocument);
        }

        let latitude = snapshot.get_f64(FIELD_LATITUDE)?;
        let longitude = snapshot.get_f64(FIELD_LONGITUDE)?;
        let (latitude, longitude) = match (latitude, longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                return Err(RecordError::MissingCoordinates {
                    latitude,
                    longitude,
                })
            }
        };
        let observed_at = snapshot
            .get_timestamp(FIELD_TIMESTAMP)?
            .unwrap_or(ingested_at);

        Self::new(subject_id, latitude, longitude, observed_at, snapshot.id())
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Position as (latitude, longitude).
    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Identifier of the document this record was parsed from.
    pub fn source_record_id(&self) -> &str {
        &self.source_record_id
    }

    /// Whether `other` reports the same observation of the same subject.
    ///
    /// Same subject, same `observed_at`, and bit-for-bit equal coordinates.
    /// Any difference makes `other` a genuine update.
    pub fn is_same_observation(&self, other: &LocationRecord) -> bool {
        self.subject_id == other.subject_id
            && self.observed_at == other.observed_at
            && self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
    }

    /// Time elapsed between the observation and `now`.
    ///
    /// Negative when the observation is timestamped in the future.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.observed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn snapshot(value: serde_json::Value) -> DocumentSnapshot {
        match value {
            serde_json::Value::Object(fields) => DocumentSnapshot::new("doc-1", fields),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_from_snapshot_with_timestamp() {
        let doc = DocumentSnapshot::location("doc-1", 48.85, 2.35, Some(ts(0)));
        let record = LocationRecord::from_snapshot("u1", &doc, ts(30)).unwrap();

        assert_eq!(record.subject_id(), "u1");
        assert_eq!(record.position(), (48.85, 2.35));
        assert_eq!(record.observed_at(), ts(0));
        assert_eq!(record.source_record_id(), "doc-1");
    }

    #[test]
    fn test_from_snapshot_defaults_to_ingestion_time() {
        let doc = DocumentSnapshot::location("doc-1", 48.85, 2.35, None);
        let record = LocationRecord::from_snapshot("u1", &doc, ts(30)).unwrap();
        assert_eq!(record.observed_at(), ts(30));
    }

    #[test]
    fn test_from_snapshot_missing_document() {
        let doc = DocumentSnapshot::missing("doc-1");
        assert_eq!(
            LocationRecord::from_snapshot("u1", &doc, ts(0)),
            Err(RecordError::MissingDocument)
        );
    }

    #[test]
    fn test_from_snapshot_missing_longitude() {
        let doc = snapshot(json!({ "latitude": 48.85 }));
        assert_eq!(
            LocationRecord::from_snapshot("u1", &doc, ts(0)),
            Err(RecordError::MissingCoordinates {
                latitude: Some(48.85),
                longitude: None,
            })
        );
    }

    #[test]
    fn test_from_snapshot_non_numeric_field() {
        let doc = snapshot(json!({ "latitude": "48.85", "longitude": 2.35 }));
        assert!(matches!(
            LocationRecord::from_snapshot("u1", &doc, ts(0)),
            Err(RecordError::Field(_))
        ));
    }

    #[test]
    fn test_from_snapshot_out_of_range() {
        let doc = snapshot(json!({ "latitude": 123.0, "longitude": 2.35 }));
        assert_eq!(
            LocationRecord::from_snapshot("u1", &doc, ts(0)),
            Err(RecordError::Coordinate(CoordError::InvalidLatitude(123.0)))
        );
    }

    #[test]
    fn test_new_rejects_blank_subject() {
        assert_eq!(
            LocationRecord::new("  ", 0.0, 0.0, ts(0), "doc"),
            Err(RecordError::EmptySubjectId)
        );
    }

    #[test]
    fn test_same_observation() {
        let a = LocationRecord::new("u1", 48.85, 2.35, ts(0), "doc-1").unwrap();
        let same = LocationRecord::new("u1", 48.85, 2.35, ts(0), "doc-2").unwrap();
        let moved = LocationRecord::new("u1", 48.850001, 2.35, ts(0), "doc-1").unwrap();
        let later = LocationRecord::new("u1", 48.85, 2.35, ts(1), "doc-1").unwrap();
        let other_subject = LocationRecord::new("u2", 48.85, 2.35, ts(0), "doc-1").unwrap();

        assert!(a.is_same_observation(&same));
        assert!(!a.is_same_observation(&moved));
        assert!(!a.is_same_observation(&later));
        assert!(!a.is_same_observation(&other_subject));
    }

    #[test]
    fn test_signed_zero_is_a_different_observation() {
        let a = LocationRecord::new("u1", 0.0, 0.0, ts(0), "doc").unwrap();
        let b = LocationRecord::new("u1", -0.0, 0.0, ts(0), "doc").unwrap();
        assert!(!a.is_same_observation(&b));
    }

    #[test]
    fn test_age_at() {
        let record = LocationRecord::new("u1", 0.0, 0.0, ts(0), "doc").unwrap();
        assert_eq!(record.age_at(ts(10)), chrono::Duration::minutes(10));
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = LocationRecord::new("u1", 48.85, 2.35, ts(0), "doc-1").unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["subjectId"], "u1");
        assert_eq!(value["sourceRecordId"], "doc-1");
        assert_eq!(value["latitude"], 48.85);
    }
}
