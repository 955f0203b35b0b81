//! Tunable parameters for the engine.
//!
//! Every knob has a documented default. The defaults reproduce the behavior
//! the mobile and web clients were built against.

use std::time::Duration;

use crate::segment::RetentionPolicy;

/// Write-time blend applied when a trace visits an existing segment.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct EstimatorConfig {
    /// Score contributed by a "parked here" event.
    /// Default: 0.3
    pub parked_event_score: f64,

    /// Weight of the recent event score.
    /// Default: 0.7
    pub recent_weight: f64,

    /// Weight of the segment's stored value for the current time slot.
    /// Default: 0.3
    pub historic_weight: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            parked_event_score: 0.3,
            recent_weight: 0.7,
            historic_weight: 0.3,
        }
    }
}

/// Read-time blend used for heatmaps and point predictions.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ReadBlendConfig {
    /// Weight of the live likelihood. Default: 0.6
    pub live_weight: f64,
    /// Weight of the historic slot value. Default: 0.4
    pub historic_weight: f64,
}

impl Default for ReadBlendConfig {
    fn default() -> Self {
        Self {
            live_weight: 0.6,
            historic_weight: 0.4,
        }
    }
}

/// User points and levels.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ProgressionConfig {
    /// Points awarded per resolved point of a trace.
    /// Default: 5
    pub points_per_contribution: u32,

    /// Points needed to level up, checked once per trace.
    /// Default: 1 (any contribution levels the user up)
    pub level_up_threshold: u32,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            points_per_contribution: 5,
            level_up_threshold: 1,
        }
    }
}

/// How snapped points map onto stored segments.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Optional grid size (degrees) applied to a point before lookup.
    /// `None` keeps exact coordinate matching.
    /// Default: None
    pub grid_snap_deg: Option<f64>,
}

/// Bounds on the road snapping call.
#[derive(Debug, Clone)]
pub struct SnapperConfig {
    /// Upper bound for one snap call, including retries.
    /// Default: 10 seconds
    pub timeout: Duration,
}

impl Default for SnapperConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// Point prediction search window.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PredictionConfig {
    /// Half-width of the search box in each axis, in degrees.
    /// Default: 0.01
    pub tolerance_deg: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self { tolerance_deg: 0.01 }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub estimator: EstimatorConfig,
    pub read_blend: ReadBlendConfig,
    pub progression: ProgressionConfig,
    pub resolver: ResolverConfig,
    pub snapper: SnapperConfig,
    pub prediction: PredictionConfig,
    pub retention: RetentionPolicy,
}
