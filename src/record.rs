//! The canonical record type derived from one snapshot feature.

/// A normalized, typed row derived from one seismic-event feature.
///
/// Every optional field follows the default policy: a scalar missing from
/// the source document is `None`, never an error. `timestamp_utc` holds
/// whole seconds past the Unix epoch (floor of the source's epoch
/// milliseconds). The write-time `processing_time_utc` stamp is not part
/// of the record; the sink stamps it when the row is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    /// Source feature id, the table's primary key.
    pub earthquake_id: String,
    pub magnitude: Option<f64>,
    pub place: Option<String>,
    /// Seconds past the Unix epoch, floored toward negative infinity.
    pub timestamp_utc: Option<i64>,
    pub timezone_offset_minutes: Option<i32>,
    pub details_url: Option<String>,
    pub status: Option<String>,
    pub tsunami_alert: Option<bool>,
    pub significance: Option<i32>,
    pub network_id: Option<String>,
    pub event_code: Option<String>,
    pub magnitude_type: Option<String>,
    pub event_type: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub depth_km: Option<f64>,
}

impl CanonicalRecord {
    /// Create an empty record for the given id, all other fields null.
    pub fn new(earthquake_id: impl Into<String>) -> Self {
        Self {
            earthquake_id: earthquake_id.into(),
            magnitude: None,
            place: None,
            timestamp_utc: None,
            timezone_offset_minutes: None,
            details_url: None,
            status: None,
            tsunami_alert: None,
            significance: None,
            network_id: None,
            event_code: None,
            magnitude_type: None,
            event_type: None,
            longitude: None,
            latitude: None,
            depth_km: None,
        }
    }
}
