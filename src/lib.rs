//! # ParkPal Engine
//!
//! Street parking likelihood estimation from driver GPS traces.
//!
//! This library provides:
//! - Trace deduplication and "parked here" classification of snapped GPS points
//! - Road segment resolution with an atomic upsert per start coordinate
//! - A write-time blend of live reports and a 14-slot weekly profile
//! - User contributions, points and levels
//! - Read-side heatmap weights and point predictions
//!
//! ## Features
//!
//! - **`parallel`** - Compute heatmap weights with rayon
//! - **`http`** - Google Roads snapping client
//! - **`ffi`** - FFI bindings for the mobile client (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use parkpal_engine::{
//!     EngineConfig, GpsPoint, InMemorySegmentStore, InMemoryUserStore, ParkingEngine,
//!     PassthroughSnapper, User,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let users = InMemoryUserStore::new();
//! users.insert_user(User::new("driver-1")).await;
//!
//! let engine = ParkingEngine::new(
//!     InMemorySegmentStore::new(),
//!     users,
//!     PassthroughSnapper,
//!     EngineConfig::default(),
//! );
//!
//! let trace = vec![
//!     GpsPoint::new(40.4406, -79.9959),
//!     GpsPoint::new(40.4410, -79.9962),
//!     GpsPoint::new(40.4415, -79.9966),
//! ];
//!
//! let summary = engine.submit_parking_trace("driver-1", &trace).await.unwrap();
//! assert_eq!(summary.points.len(), 3);
//! assert!(summary.level_up);
//! # });
//! ```

// HTTP road snapping client
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{GoogleRoadsSnapper, RoadsClientConfig};

pub mod config;
pub mod engine;
pub mod error;
pub mod geo_utils;
pub mod heatmap;
pub mod ledger;
pub mod likelihood;
pub mod segment;
pub mod snapper;
pub mod store;
pub mod trace;

pub use config::{
    EngineConfig, EstimatorConfig, PredictionConfig, ProgressionConfig, ReadBlendConfig,
    ResolverConfig, SnapperConfig,
};
pub use engine::{ParkingEngine, PointOutcome, PointResult, TraceSummary};
pub use error::EngineError;
pub use heatmap::{
    aggregate_heatmap, heatmap_weights, query_heatmap_cell, segment_prediction, HeatmapBounds,
    HeatmapCell, HeatmapConfig, HeatmapResult, HeatmapWeight, Prediction,
};
pub use ledger::{Contribution, ContributionLedger, User, UserId, UserProgress};
pub use likelihood::{read_weight, Estimate, LikelihoodEstimator};
pub use segment::{
    HistoricProfile, RealTimeUpdate, ReportCounts, ReportKind, RetentionPolicy, Segment,
    SegmentKey, TimeSlot, SLOT_COUNT,
};
pub use snapper::{PassthroughSnapper, RoadSnapper};
pub use store::{InMemorySegmentStore, InMemoryUserStore, SegmentStore, UserStore};
pub use trace::{classify_trace, dedupe_consecutive, Action, TracePoint};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("ParkPalRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use parkpal_engine::GpsPoint;
/// let point = GpsPoint::new(40.4406, -79.9959); // Pittsburgh
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Square window of `tolerance_deg` around `center` in each axis.
    pub fn around(center: &GpsPoint, tolerance_deg: f64) -> Self {
        Self {
            min_lat: center.latitude - tolerance_deg,
            max_lat: center.latitude + tolerance_deg,
            min_lng: center.longitude - tolerance_deg,
            max_lng: center.longitude + tolerance_deg,
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: &GpsPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use chrono::Local;
    use log::info;
    use std::sync::Arc;
    use tokio::runtime::{Builder, Runtime};

    type MobileEngine = ParkingEngine<InMemorySegmentStore, InMemoryUserStore, PassthroughSnapper>;

    /// Trace outcome handed to the mobile client.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiTraceSummary {
        pub unique_points: u32,
        pub recorded: u32,
        pub skipped: u32,
        pub level_up: bool,
        pub level: Option<u32>,
    }

    impl From<TraceSummary> for FfiTraceSummary {
        fn from(summary: TraceSummary) -> Self {
            let unique_points = summary.points.len() as u32;
            Self {
                unique_points,
                recorded: summary.recorded,
                skipped: unique_points - summary.recorded,
                level_up: summary.level_up,
                level: summary.level,
            }
        }
    }

    /// In-memory engine for on-device use. Points are expected to be snapped
    /// by the platform's map SDK before submission.
    #[derive(uniffi::Object)]
    pub struct ParkingEngineHandle {
        runtime: Runtime,
        engine: Arc<MobileEngine>,
    }

    #[uniffi::export]
    impl ParkingEngineHandle {
        #[uniffi::constructor]
        pub fn new() -> Result<Arc<Self>, EngineError> {
            init_logging();
            let runtime = Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| EngineError::Storage(format!("Failed to create tokio runtime: {}", e)))?;

            let engine = ParkingEngine::new(
                InMemorySegmentStore::new(),
                InMemoryUserStore::new(),
                PassthroughSnapper,
                EngineConfig::default(),
            );
            info!("[ParkPalRust] Engine created");

            Ok(Arc::new(Self {
                runtime,
                engine: Arc::new(engine),
            }))
        }

        /// Register a user id. Re-registering an existing id is a no-op and
        /// returns `false`.
        pub fn register_user(&self, user_id: String) -> bool {
            let engine = Arc::clone(&self.engine);
            self.runtime
                .block_on(async move { engine.users().register_user(user_id).await })
        }

        pub fn submit_trace(&self, user_id: String, points: Vec<GpsPoint>) -> Result<FfiTraceSummary, EngineError> {
            info!("[ParkPalRust] submit_trace for {} with {} points", user_id, points.len());
            let engine = Arc::clone(&self.engine);
            self.runtime
                .block_on(async move { engine.submit_parking_trace(&user_id, &points).await })
                .map(FfiTraceSummary::from)
        }

        pub fn heatmap_weights(&self) -> Result<Vec<HeatmapWeight>, EngineError> {
            let engine = Arc::clone(&self.engine);
            self.runtime
                .block_on(async move { engine.get_heatmap_weights(Local::now().naive_local()).await })
        }

        pub fn heatmap_grid(&self, config: HeatmapConfig) -> Result<HeatmapResult, EngineError> {
            let engine = Arc::clone(&self.engine);
            self.runtime
                .block_on(async move { engine.get_heatmap_grid(Local::now().naive_local(), &config).await })
        }

        pub fn prediction(&self, lat: f64, lng: f64) -> Result<Prediction, EngineError> {
            let engine = Arc::clone(&self.engine);
            self.runtime.block_on(async move {
                engine.get_segment_prediction(lat, lng, Local::now().naive_local()).await
            })
        }

        pub fn user_progress(&self, user_id: String) -> Result<UserProgress, EngineError> {
            let engine = Arc::clone(&self.engine);
            self.runtime.block_on(async move { engine.user_progress(&user_id).await })
        }
    }

    /// Get default heatmap configuration.
    #[uniffi::export]
    pub fn default_heatmap_config() -> HeatmapConfig {
        HeatmapConfig::default()
    }

}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(40.4406, -79.9959).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds_from_points() {
        assert!(Bounds::from_points(&[]).is_none());

        let bounds = Bounds::from_points(&[GpsPoint::new(1.0, 2.0), GpsPoint::new(3.0, -1.0)]).unwrap();
        assert_eq!(bounds, Bounds { min_lat: 1.0, max_lat: 3.0, min_lng: -1.0, max_lng: 2.0 });
        assert_eq!(bounds.center(), GpsPoint::new(2.0, 0.5));
    }

    #[test]
    fn test_bounds_around_is_inclusive() {
        let bounds = Bounds::around(&GpsPoint::new(10.0, 20.0), 0.5);
        assert!(bounds.contains(&GpsPoint::new(10.5, 19.5)));
        assert!(bounds.contains(&GpsPoint::new(10.0, 20.0)));
        assert!(!bounds.contains(&GpsPoint::new(10.51, 20.0)));
    }
}
