//! Road segment records and their time-slot profile.
//!
//! A segment is identified by its starting coordinate. It carries a live
//! likelihood (belief that parking is free right now), a 14-slot historic
//! profile (7 weekdays x morning/afternoon) and a bounded log of recent reports.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::geo_utils::coord_key;
use crate::trace::Action;
use crate::GpsPoint;

/// Number of historic slots: 7 days x {morning, afternoon}.
pub const SLOT_COUNT: usize = 14;

/// Exact-match identity of a segment (`"lat_lng"` of its start).
pub type SegmentKey = String;

// ============================================================================
// Time slots
// ============================================================================

/// Index into a [`HistoricProfile`], always in `0..SLOT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeSlot(usize);

impl TimeSlot {
    /// Slot for a wall-clock time. Sunday morning is slot 0, Saturday
    /// afternoon is slot 13.
    pub fn from_datetime(at: &NaiveDateTime) -> Self {
        let day = at.weekday().num_days_from_sunday() as usize;
        let half = if at.hour() < 12 { 0 } else { 1 };
        Self(day * 2 + half)
    }

    /// Build a slot from a raw index. Returns `None` outside `0..14`.
    pub fn new(index: usize) -> Option<Self> {
        (index < SLOT_COUNT).then_some(Self(index))
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Learned likelihood per time slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricProfile([f64; SLOT_COUNT]);

impl Default for HistoricProfile {
    fn default() -> Self {
        Self([0.0; SLOT_COUNT])
    }
}

impl HistoricProfile {
    pub fn from_values(values: [f64; SLOT_COUNT]) -> Self {
        Self(values)
    }

    pub fn get(&self, slot: TimeSlot) -> f64 {
        self.0[slot.0]
    }

    pub fn set(&mut self, slot: TimeSlot, value: f64) {
        self.0[slot.0] = value;
    }

    pub fn values(&self) -> &[f64; SLOT_COUNT] {
        &self.0
    }
}

// ============================================================================
// Real-time reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum ReportKind {
    LeftParking,
    FoundParking,
    DroveBy,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::LeftParking => "left_parking",
            ReportKind::FoundParking => "found_parking",
            ReportKind::DroveBy => "drove_by",
        }
    }
}

impl From<Action> for ReportKind {
    fn from(action: Action) -> Self {
        match action {
            Action::FoundParking => ReportKind::FoundParking,
            Action::DroveBy => ReportKind::DroveBy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealTimeUpdate {
    pub kind: ReportKind,
    pub timestamp: NaiveDateTime,
}

/// Limits on how many reports a segment keeps.
///
/// Age is measured against the newest report on the segment, not the wall
/// clock, so replaying old traces behaves the same as live ones.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    /// Keep at most this many of the newest reports. Default: 256
    pub max_updates: Option<usize>,
    /// Drop reports older than this. Default: 24 hours
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_updates: Some(256),
            max_age: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

impl RetentionPolicy {
    /// Never evict.
    pub fn unbounded() -> Self {
        Self {
            max_updates: None,
            max_age: None,
        }
    }
}

/// Per-kind totals of the retained reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub left_parking: u32,
    pub found_parking: u32,
    pub drove_by: u32,
}

// ============================================================================
// Segment
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: u64,
    pub start: GpsPoint,
    pub end: Option<GpsPoint>,
    live_likelihood: f64,
    pub historic: HistoricProfile,
    updates: VecDeque<RealTimeUpdate>,
}

impl Segment {
    /// New segment with a zeroed profile and the given seed likelihood.
    pub fn new(id: u64, start: GpsPoint, seed_likelihood: f64) -> Self {
        let mut segment = Self {
            id,
            start,
            end: None,
            live_likelihood: 0.0,
            historic: HistoricProfile::default(),
            updates: VecDeque::new(),
        };
        segment.set_live_likelihood(seed_likelihood);
        segment
    }

    pub fn key(&self) -> SegmentKey {
        coord_key(&self.start)
    }

    pub fn live_likelihood(&self) -> f64 {
        self.live_likelihood
    }

    /// Clamps into [0, 1]. Non-finite values are ignored.
    pub fn set_live_likelihood(&mut self, value: f64) {
        if value.is_finite() {
            self.live_likelihood = value.clamp(0.0, 1.0);
        }
    }

    pub fn updates(&self) -> impl Iterator<Item = &RealTimeUpdate> {
        self.updates.iter()
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    /// Append a report and apply the retention policy.
    pub fn push_update(&mut self, update: RealTimeUpdate, retention: &RetentionPolicy) {
        // Keep the log sorted by time; out-of-order reports are rare.
        let pos = self
            .updates
            .iter()
            .rposition(|u| u.timestamp <= update.timestamp)
            .map_or(0, |i| i + 1);
        self.updates.insert(pos, update);

        if let Some(max_age) = retention.max_age {
            if let (Some(newest), Ok(age)) = (self.updates.back().copied(), chrono::Duration::from_std(max_age)) {
                let cutoff = newest.timestamp - age;
                while self.updates.front().is_some_and(|u| u.timestamp < cutoff) {
                    self.updates.pop_front();
                }
            }
        }

        if let Some(max) = retention.max_updates {
            while self.updates.len() > max {
                self.updates.pop_front();
            }
        }
    }

    pub fn recent_report_counts(&self) -> ReportCounts {
        let mut counts = ReportCounts::default();
        for update in &self.updates {
            match update.kind {
                ReportKind::LeftParking => counts.left_parking += 1,
                ReportKind::FoundParking => counts.found_parking += 1,
                ReportKind::DroveBy => counts.drove_by += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_time_slot_mapping() {
        // 2024-03-03 is a Sunday
        assert_eq!(TimeSlot::from_datetime(&at(2024, 3, 3, 8, 0)).index(), 0);
        assert_eq!(TimeSlot::from_datetime(&at(2024, 3, 3, 12, 0)).index(), 1);
        // Tuesday afternoon
        assert_eq!(TimeSlot::from_datetime(&at(2024, 3, 5, 15, 30)).index(), 5);
        // Saturday 23:59
        assert_eq!(TimeSlot::from_datetime(&at(2024, 3, 9, 23, 59)).index(), 13);
        assert_eq!(TimeSlot::from_datetime(&at(2024, 3, 9, 11, 59)).index(), 12);
    }

    #[test]
    fn test_time_slot_bounds() {
        assert!(TimeSlot::new(13).is_some());
        assert!(TimeSlot::new(14).is_none());
    }

    #[test]
    fn test_new_segment_defaults() {
        let parked = Segment::new(1, GpsPoint::new(1.0, 2.0), 1.0);
        let passed = Segment::new(2, GpsPoint::new(1.0, 2.0), 0.0);

        assert_eq!(parked.live_likelihood(), 1.0);
        assert_eq!(passed.live_likelihood(), 0.0);
        assert_eq!(parked.historic.values(), &[0.0; SLOT_COUNT]);
        assert_eq!(parked.key(), "1_2");
        assert!(parked.end.is_none());
    }

    #[test]
    fn test_live_likelihood_clamped() {
        let mut segment = Segment::new(1, GpsPoint::new(0.0, 0.0), 0.5);
        segment.set_live_likelihood(1.7);
        assert_eq!(segment.live_likelihood(), 1.0);
        segment.set_live_likelihood(-0.2);
        assert_eq!(segment.live_likelihood(), 0.0);
        segment.set_live_likelihood(f64::NAN);
        assert_eq!(segment.live_likelihood(), 0.0);
    }

    #[test]
    fn test_retention_by_count() {
        let mut segment = Segment::new(1, GpsPoint::new(0.0, 0.0), 0.0);
        let policy = RetentionPolicy { max_updates: Some(3), max_age: None };

        for minute in 0..5 {
            segment.push_update(
                RealTimeUpdate { kind: ReportKind::DroveBy, timestamp: at(2024, 3, 5, 9, minute) },
                &policy,
            );
        }

        assert_eq!(segment.update_count(), 3);
        let first = segment.updates().next().unwrap();
        assert_eq!(first.timestamp, at(2024, 3, 5, 9, 2));
    }

    #[test]
    fn test_retention_by_age() {
        let mut segment = Segment::new(1, GpsPoint::new(0.0, 0.0), 0.0);
        let policy = RetentionPolicy { max_updates: None, max_age: Some(Duration::from_secs(3600)) };

        segment.push_update(RealTimeUpdate { kind: ReportKind::LeftParking, timestamp: at(2024, 3, 5, 6, 0) }, &policy);
        segment.push_update(RealTimeUpdate { kind: ReportKind::DroveBy, timestamp: at(2024, 3, 5, 8, 30) }, &policy);
        segment.push_update(RealTimeUpdate { kind: ReportKind::FoundParking, timestamp: at(2024, 3, 5, 9, 0) }, &policy);

        let counts = segment.recent_report_counts();
        assert_eq!(counts, ReportCounts { left_parking: 0, found_parking: 1, drove_by: 1 });
    }

    #[test]
    fn test_unbounded_retention_keeps_everything() {
        let mut segment = Segment::new(1, GpsPoint::new(0.0, 0.0), 0.0);
        let policy = RetentionPolicy::unbounded();
        for day in 1..=20 {
            segment.push_update(RealTimeUpdate { kind: ReportKind::DroveBy, timestamp: at(2024, 3, day, 9, 0) }, &policy);
        }
        assert_eq!(segment.update_count(), 20);
    }

    #[test]
    fn test_out_of_order_update_is_sorted() {
        let mut segment = Segment::new(1, GpsPoint::new(0.0, 0.0), 0.0);
        let policy = RetentionPolicy::unbounded();
        segment.push_update(RealTimeUpdate { kind: ReportKind::DroveBy, timestamp: at(2024, 3, 5, 10, 0) }, &policy);
        segment.push_update(RealTimeUpdate { kind: ReportKind::LeftParking, timestamp: at(2024, 3, 5, 9, 0) }, &policy);

        let kinds: Vec<ReportKind> = segment.updates().map(|u| u.kind).collect();
        assert_eq!(kinds, vec![ReportKind::LeftParking, ReportKind::DroveBy]);
    }
}
