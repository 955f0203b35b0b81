//! Trace deduplication and point classification.
//!
//! A snapped trace often repeats the same road coordinate many times while the
//! driver crawls along looking for a spot. Consecutive repeats collapse into a
//! single representative point; a coordinate revisited later in the trace is a
//! new pass and is kept.
//!
//! The last retained point is where the driver parked. Every earlier point is a
//! drive-by.

use crate::geo_utils::coord_key;
use crate::GpsPoint;

/// What a user did at a resolved point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Action {
    FoundParking,
    DroveBy,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::FoundParking => "found_parking",
            Action::DroveBy => "drove_by",
        }
    }
}

/// A deduplicated point tagged with its role in the trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TracePoint {
    pub point: GpsPoint,
    pub action: Action,
}

impl TracePoint {
    pub fn is_parked(&self) -> bool {
        self.action == Action::FoundParking
    }
}

/// Drop points whose `"lat_lng"` key equals the previously retained point.
///
/// Order is preserved and the operation is idempotent.
///
/// ```rust
/// use parkpal_engine::{GpsPoint, trace::dedupe_consecutive};
///
/// let a = GpsPoint::new(40.4406, -79.9959);
/// let b = GpsPoint::new(40.4410, -79.9962);
/// let out = dedupe_consecutive(&[a, a, b, b, a]);
/// assert_eq!(out, vec![a, b, a]);
/// ```
pub fn dedupe_consecutive(points: &[GpsPoint]) -> Vec<GpsPoint> {
    let mut out: Vec<GpsPoint> = Vec::with_capacity(points.len());
    let mut last_key: Option<String> = None;

    for point in points {
        let key = coord_key(point);
        if last_key.as_deref() == Some(key.as_str()) {
            continue;
        }
        out.push(*point);
        last_key = Some(key);
    }

    out
}

/// Deduplicate and tag: the final point is `FoundParking`, the rest `DroveBy`.
pub fn classify_trace(points: &[GpsPoint]) -> Vec<TracePoint> {
    let unique = dedupe_consecutive(points);
    let last = unique.len().saturating_sub(1);

    unique
        .into_iter()
        .enumerate()
        .map(|(i, point)| TracePoint {
            point,
            action: if i == last { Action::FoundParking } else { Action::DroveBy },
        })
        .collect()
}
