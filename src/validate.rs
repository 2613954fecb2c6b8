//! Per-record schema validation.
//!
//! Checks each flattened candidate against the canonical schema and
//! produces typed records. A violation excludes that record and is
//! routed to a side report tagged with the feature index and field name;
//! it never aborts the run by itself.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::extract::{Candidate, FeatureExtractor};
use crate::record::CanonicalRecord;

/// How a field value violated the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Expected a number (integer or float).
    NotNumeric,
    /// Expected an integer.
    NotInteger,
    /// Expected text.
    NotText,
    /// Integer outside its allowed range.
    OutOfRange,
    /// Tsunami flag was neither 0 nor 1.
    FlagOutOfRange,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IssueKind::NotNumeric => "not numeric",
            IssueKind::NotInteger => "not an integer",
            IssueKind::NotText => "not text",
            IssueKind::OutOfRange => "out of range",
            IssueKind::FlagOutOfRange => "flag out of range",
        };
        f.write_str(text)
    }
}

/// One record-level validation failure, attributed to the source feature
/// index and the canonical field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub index: usize,
    pub field: &'static str,
    pub kind: IssueKind,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "feature {}: {} {}", self.index, self.field, self.kind)
    }
}

/// Validation outcome for one run: counts plus the failure list.
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    /// Features seen in the document, including dropped and invalid ones.
    pub total_seen: usize,
    /// Records that passed validation.
    pub valid: usize,
    /// Features dropped for lacking an id (structural, not a failure).
    pub skipped_missing_id: usize,
    /// Records excluded by validation.
    pub skipped_validation: usize,
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    /// Fraction of seen records excluded by validation.
    pub fn skip_ratio(&self) -> f64 {
        if self.total_seen == 0 {
            0.0
        } else {
            self.skipped_validation as f64 / self.total_seen as f64
        }
    }

    /// Count-based diagnostic, e.g. `magnitude not numeric ×12, tsunami_alert flag out of range ×5`.
    pub fn failure_summary(&self) -> String {
        let mut tally: BTreeMap<String, usize> = BTreeMap::new();
        for failure in &self.failures {
            *tally
                .entry(format!("{} {}", failure.field, failure.kind))
                .or_default() += 1;
        }

        let mut entries: Vec<(String, usize)> = tally.into_iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        entries
            .into_iter()
            .map(|(label, count)| format!("{label} \u{d7}{count}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn as_text(value: &Value, index: usize, field: &'static str) -> Result<String, ValidationFailure> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or(ValidationFailure {
            index,
            field,
            kind: IssueKind::NotText,
        })
}

fn as_float(value: &Value, index: usize, field: &'static str) -> Result<f64, ValidationFailure> {
    value.as_f64().ok_or(ValidationFailure {
        index,
        field,
        kind: IssueKind::NotNumeric,
    })
}

fn as_integer(value: &Value, index: usize, field: &'static str) -> Result<i64, ValidationFailure> {
    value.as_i64().ok_or(ValidationFailure {
        index,
        field,
        kind: IssueKind::NotInteger,
    })
}

/// Apply `f` to the value if present; absent stays null.
fn optional<T>(
    value: Option<&Value>,
    f: impl FnOnce(&Value) -> Result<T, ValidationFailure>,
) -> Result<Option<T>, ValidationFailure> {
    value.map(f).transpose()
}

/// Validates candidates against the canonical schema (version 1).
#[derive(Debug, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate one candidate, producing a typed record or the first
    /// violation found.
    pub fn check(&self, candidate: &Candidate<'_>) -> Result<CanonicalRecord, ValidationFailure> {
        let index = candidate.index;
        let fields = &candidate.fields;

        let mut record = CanonicalRecord::new(candidate.earthquake_id);

        record.magnitude = optional(fields.magnitude, |v| as_float(v, index, "magnitude"))?;
        record.place = optional(fields.place, |v| as_text(v, index, "place"))?;

        // Epoch milliseconds -> whole seconds. div_euclid floors toward
        // negative infinity, which truncation would get wrong for
        // before-epoch timestamps.
        record.timestamp_utc = optional(fields.time, |v| as_integer(v, index, "timestamp_utc"))?
            .map(|millis| millis.div_euclid(1000));

        record.timezone_offset_minutes = optional(fields.timezone_offset, |v| {
            let minutes = as_integer(v, index, "timezone_offset_minutes")?;
            i32::try_from(minutes).map_err(|_| ValidationFailure {
                index,
                field: "timezone_offset_minutes",
                kind: IssueKind::OutOfRange,
            })
        })?;

        record.details_url = optional(fields.details_url, |v| as_text(v, index, "details_url"))?;
        record.status = optional(fields.status, |v| as_text(v, index, "status"))?;

        record.tsunami_alert = optional(fields.tsunami, |v| {
            match v.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(ValidationFailure {
                    index,
                    field: "tsunami_alert",
                    kind: IssueKind::FlagOutOfRange,
                }),
            }
        })?;

        record.significance = optional(fields.significance, |v| {
            let sig = as_integer(v, index, "significance")?;
            if (0..=1000).contains(&sig) {
                Ok(sig as i32)
            } else {
                Err(ValidationFailure {
                    index,
                    field: "significance",
                    kind: IssueKind::OutOfRange,
                })
            }
        })?;

        record.network_id = optional(fields.network_id, |v| as_text(v, index, "network_id"))?;
        record.event_code = optional(fields.event_code, |v| as_text(v, index, "event_code"))?;
        record.magnitude_type = optional(fields.magnitude_type, |v| {
            as_text(v, index, "magnitude_type")
        })?;
        record.event_type = optional(fields.event_type, |v| as_text(v, index, "event_type"))?;

        record.longitude = optional(fields.longitude, |v| as_float(v, index, "longitude"))?;
        record.latitude = optional(fields.latitude, |v| as_float(v, index, "latitude"))?;
        record.depth_km = optional(fields.depth_km, |v| as_float(v, index, "depth_km"))?;

        Ok(record)
    }

    /// Drain the extractor, splitting candidates into valid records and a
    /// validation report.
    ///
    /// `total_seen` is the feature count of the source document.
    pub fn validate_all(
        &self,
        extractor: &mut FeatureExtractor<'_>,
        total_seen: usize,
    ) -> (Vec<CanonicalRecord>, ValidationReport) {
        let mut records = Vec::new();
        let mut failures = Vec::new();

        for candidate in extractor.by_ref() {
            match self.check(&candidate) {
                Ok(record) => records.push(record),
                Err(failure) => {
                    debug!(
                        index = failure.index,
                        field = failure.field,
                        "Record failed validation: {}",
                        failure.kind
                    );
                    failures.push(failure);
                }
            }
        }

        let report = ValidationReport {
            total_seen,
            valid: records.len(),
            skipped_missing_id: extractor.dropped_missing_id(),
            skipped_validation: failures.len(),
            failures,
        };

        if report.skipped_validation > 0 {
            warn!(
                "{}/{} records failed validation: {}",
                report.skipped_validation,
                report.total_seen,
                report.failure_summary()
            );
        }

        (records, report)
    }
}
