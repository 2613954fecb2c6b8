//! Canonical table schema declaration.
//!
//! The schema is declared explicitly rather than inferred from the feed,
//! so structural drift in incoming documents surfaces as validation
//! failures instead of silent miscoercion. The version is recorded in the
//! schema metadata and travels with every written Parquet file.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};

/// Logical name of the output table.
pub const TABLE_NAME: &str = "earthquakes";

/// Version of the canonical record schema.
pub const SCHEMA_VERSION: u32 = 1;

/// Metadata key under which the schema version is recorded.
pub const SCHEMA_VERSION_KEY: &str = "richter.schema_version";

/// Build the Arrow schema for the canonical record, including the
/// write-time `processing_time_utc` stamp.
///
/// Timestamps follow the usual lake conventions: event time at second
/// precision (it is derived by floor-dividing epoch milliseconds), the
/// processing stamp at microsecond precision, both UTC.
pub fn canonical_schema() -> SchemaRef {
    let fields = vec![
        Field::new("earthquake_id", DataType::Utf8, false),
        Field::new("magnitude", DataType::Float64, true),
        Field::new("place", DataType::Utf8, true),
        Field::new(
            "timestamp_utc",
            DataType::Timestamp(TimeUnit::Second, Some("UTC".into())),
            true,
        ),
        Field::new("timezone_offset_minutes", DataType::Int32, true),
        Field::new("details_url", DataType::Utf8, true),
        Field::new("status", DataType::Utf8, true),
        Field::new("tsunami_alert", DataType::Boolean, true),
        Field::new("significance", DataType::Int32, true),
        Field::new("network_id", DataType::Utf8, true),
        Field::new("event_code", DataType::Utf8, true),
        Field::new("magnitude_type", DataType::Utf8, true),
        Field::new("event_type", DataType::Utf8, true),
        Field::new("longitude", DataType::Float64, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("depth_km", DataType::Float64, true),
        Field::new(
            "processing_time_utc",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
    ];

    let metadata = HashMap::from([(
        SCHEMA_VERSION_KEY.to_string(),
        SCHEMA_VERSION.to_string(),
    )]);

    Arc::new(Schema::new_with_metadata(fields, metadata))
}

/// Check that another schema carries the same columns as the canonical
/// declaration, by name, type, and order.
///
/// Used when merging into an existing table: a mismatch means the table
/// was written by a different schema version and must not be silently
/// rewritten. Types are part of the contract; a same-named column of a
/// different type must fail here, not deep in batch decoding.
pub fn matches_canonical(other: &Schema) -> bool {
    let canonical = canonical_schema();
    canonical.fields().len() == other.fields().len()
        && canonical
            .fields()
            .iter()
            .zip(other.fields().iter())
            .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_shape() {
        let schema = canonical_schema();
        assert_eq!(schema.fields().len(), 17);
        assert_eq!(schema.field(0).name(), "earthquake_id");
        assert!(!schema.field(0).is_nullable());
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(
            schema.field(3).data_type(),
            &DataType::Timestamp(TimeUnit::Second, Some("UTC".into()))
        );
        assert_eq!(schema.field(16).name(), "processing_time_utc");
        assert!(!schema.field(16).is_nullable());
    }

    #[test]
    fn test_schema_version_recorded() {
        let schema = canonical_schema();
        assert_eq!(
            schema.metadata().get(SCHEMA_VERSION_KEY),
            Some(&"1".to_string())
        );
    }

    #[test]
    fn test_matches_canonical() {
        let schema = canonical_schema();
        assert!(matches_canonical(&schema));

        let other = Schema::new(vec![Field::new("id", DataType::Utf8, false)]);
        assert!(!matches_canonical(&other));
    }

    #[test]
    fn test_same_names_different_types_rejected() {
        let canonical = canonical_schema();
        let fields: Vec<Field> = canonical
            .fields()
            .iter()
            .map(|f| {
                if f.name() == "magnitude" {
                    Field::new("magnitude", DataType::Utf8, true)
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();

        assert!(!matches_canonical(&Schema::new(fields)));
    }
}
