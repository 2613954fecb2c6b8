//! Feature flattening.
//!
//! Turns one nested feature into a flat record candidate by applying the
//! field mapping and default policy. Every field access goes through a
//! schema-aware accessor returning an optional value: an absent key is a
//! normal null, never an error. Features lacking an `id` are dropped and
//! counted; that is a structural omission, not a validation failure.

use serde_json::Value;

/// Raw field values located in one feature, still untyped.
///
/// `None` means the key was absent or explicitly null in the source;
/// the validator decides whether a present value satisfies the schema.
#[derive(Debug, Clone)]
pub struct RawFields<'a> {
    pub magnitude: Option<&'a Value>,
    pub place: Option<&'a Value>,
    pub time: Option<&'a Value>,
    pub timezone_offset: Option<&'a Value>,
    pub details_url: Option<&'a Value>,
    pub status: Option<&'a Value>,
    pub tsunami: Option<&'a Value>,
    pub significance: Option<&'a Value>,
    pub network_id: Option<&'a Value>,
    pub event_code: Option<&'a Value>,
    pub magnitude_type: Option<&'a Value>,
    pub event_type: Option<&'a Value>,
    pub longitude: Option<&'a Value>,
    pub latitude: Option<&'a Value>,
    pub depth_km: Option<&'a Value>,
}

/// A flattened record candidate, paired with the source array index for
/// error attribution.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub index: usize,
    pub earthquake_id: &'a str,
    pub fields: RawFields<'a>,
}

/// Look up a property on a feature, treating explicit JSON null as absent.
fn property<'a>(feature: &'a Value, key: &str) -> Option<&'a Value> {
    feature
        .get("properties")
        .and_then(|props| props.get(key))
        .filter(|v| !v.is_null())
}

/// Look up one geometry coordinate axis. A coordinate array shorter than
/// three entries yields null for the missing axis.
fn coordinate(feature: &Value, axis: usize) -> Option<&Value> {
    feature
        .get("geometry")
        .and_then(|geom| geom.get("coordinates"))
        .and_then(|coords| coords.get(axis))
        .filter(|v| !v.is_null())
}

/// Lazily flattens features in document order, skipping and counting
/// features without an id.
pub struct FeatureExtractor<'a> {
    features: std::iter::Enumerate<std::slice::Iter<'a, Value>>,
    dropped_missing_id: usize,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(features: &'a [Value]) -> Self {
        Self {
            features: features.iter().enumerate(),
            dropped_missing_id: 0,
        }
    }

    /// Number of features dropped for lacking an id, so far.
    pub fn dropped_missing_id(&self) -> usize {
        self.dropped_missing_id
    }
}

impl<'a> Iterator for FeatureExtractor<'a> {
    type Item = Candidate<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, feature) = self.features.next()?;

            // A non-string id is treated the same as an absent one: the
            // record is never silently assigned an id.
            let Some(earthquake_id) = feature.get("id").and_then(Value::as_str) else {
                self.dropped_missing_id += 1;
                continue;
            };

            let fields = RawFields {
                magnitude: property(feature, "mag"),
                place: property(feature, "place"),
                time: property(feature, "time"),
                timezone_offset: property(feature, "tz"),
                details_url: property(feature, "url"),
                status: property(feature, "status"),
                tsunami: property(feature, "tsunami"),
                significance: property(feature, "sig"),
                network_id: property(feature, "net"),
                event_code: property(feature, "code"),
                magnitude_type: property(feature, "magType"),
                event_type: property(feature, "type"),
                longitude: coordinate(feature, 0),
                latitude: coordinate(feature, 1),
                depth_km: coordinate(feature, 2),
            };

            return Some(Candidate {
                index,
                earthquake_id,
                fields,
            });
        }
    }
}
