//! Likelihood estimation.
//!
//! Two blends live here and they are deliberately separate:
//!
//! - the **write blend** runs when a trace visits an existing segment and mixes
//!   the trace's event score with the segment's stored value for the current
//!   time slot (`0.7 * event + 0.3 * slot`). The result becomes both the live
//!   likelihood and the new slot value.
//! - the **read blend** runs for heatmaps and point predictions and mixes the
//!   live likelihood with the slot value (`0.6 * live + 0.4 * slot`). It never
//!   writes anything.

use chrono::NaiveDateTime;

use crate::config::{EstimatorConfig, ReadBlendConfig};
use crate::segment::{Segment, TimeSlot};

/// Result of the write blend for one segment visit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimate {
    /// New value for both the live likelihood and the slot.
    Blended { slot: TimeSlot, likelihood: f64 },
    /// The blend produced NaN or infinity; the segment must not be touched.
    NonFinite { slot: TimeSlot },
}

/// Write-time estimator.
#[derive(Debug, Clone, Default)]
pub struct LikelihoodEstimator {
    config: EstimatorConfig,
}

impl LikelihoodEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Blend a visit into `segment` at wall-clock time `at`.
    pub fn estimate(&self, segment: &Segment, at: &NaiveDateTime, parked_here: bool) -> Estimate {
        let slot = TimeSlot::from_datetime(at);
        let recent = if parked_here { self.config.parked_event_score } else { 0.0 };
        let likelihood = self.config.recent_weight * recent
            + self.config.historic_weight * segment.historic.get(slot);

        if likelihood.is_finite() {
            Estimate::Blended { slot, likelihood }
        } else {
            Estimate::NonFinite { slot }
        }
    }

    /// Apply a blended estimate to the segment. Returns `false` for
    /// non-finite estimates, leaving the segment unchanged.
    pub fn apply(&self, segment: &mut Segment, estimate: Estimate) -> bool {
        match estimate {
            Estimate::Blended { slot, likelihood } => {
                segment.set_live_likelihood(likelihood);
                segment.historic.set(slot, segment.live_likelihood());
                true
            }
            Estimate::NonFinite { .. } => false,
        }
    }
}

/// Display weight of a segment at `at`, using the read blend.
///
/// Returns `None` when the stored values are corrupt.
pub fn read_weight(segment: &Segment, at: &NaiveDateTime, blend: &ReadBlendConfig) -> Option<f64> {
    let slot = TimeSlot::from_datetime(at);
    let weight = blend.live_weight * segment.live_likelihood()
        + blend.historic_weight * segment.historic.get(slot);

    weight.is_finite().then(|| weight.clamp(0.0, 1.0))
}
