//! Read-side parking heatmaps.
//!
//! Every segment gets a display weight from the read blend
//! (`0.6 * live + 0.4 * slot`) at the requested time. Weights can be returned
//! per segment, averaged around a query point, or binned into a sparse metric
//! grid for low zoom levels where individual segments would overlap.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use log::warn;

use crate::config::ReadBlendConfig;
use crate::likelihood::read_weight;
use crate::segment::Segment;

/// Display weight of one segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapWeight {
    pub segment_id: u64,
    pub lat: f64,
    pub lng: f64,
    /// Read blend in [0, 1]
    pub weight: f64,
}

/// Parking likelihood around a query point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Prediction {
    /// Mean read blend over matching segments, 0.0 if none matched
    pub likelihood: f64,
    /// Segments inside the search window
    pub segment_count: u32,
}

/// Configuration for grid aggregation
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapConfig {
    /// Grid cell size in meters (default: 100m)
    pub cell_size_meters: f64,
    /// Optional bounds to limit computation
    pub bounds: Option<HeatmapBounds>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            cell_size_meters: 100.0,
            bounds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// A single cell in the aggregated grid
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapCell {
    pub row: i32,
    pub col: i32,
    /// Cell center for rendering
    pub center_lat: f64,
    pub center_lng: f64,
    pub mean_weight: f64,
    pub max_weight: f64,
    pub segment_count: u32,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct HeatmapResult {
    /// Non-empty cells only (sparse representation)
    pub cells: Vec<HeatmapCell>,
    /// Computed bounds of the binned segments
    pub bounds: HeatmapBounds,
    pub cell_size_meters: f64,
    /// Latitude the grid's longitude scale was computed at
    pub ref_lat: f64,
    pub grid_rows: u32,
    pub grid_cols: u32,
    pub total_segments: u32,
}

// ============================================================================
// Per-segment weights
// ============================================================================

fn weight_for(segment: &Segment, at: &NaiveDateTime, blend: &ReadBlendConfig) -> Option<HeatmapWeight> {
    match read_weight(segment, at, blend) {
        Some(weight) => Some(HeatmapWeight {
            segment_id: segment.id,
            lat: segment.start.latitude,
            lng: segment.start.longitude,
            weight,
        }),
        None => {
            warn!("[Heatmap] Skipping segment #{}: non-finite read weight", segment.id);
            None
        }
    }
}

/// Read-blend weight for every segment at time `at`.
///
/// Segments with corrupt stored values are skipped. Output order follows input.
pub fn heatmap_weights(segments: &[Segment], at: &NaiveDateTime, blend: &ReadBlendConfig) -> Vec<HeatmapWeight> {
    #[cfg(feature = "parallel")]
    let weights = {
        use rayon::prelude::*;
        segments.par_iter().filter_map(|s| weight_for(s, at, blend)).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let weights = segments.iter().filter_map(|s| weight_for(s, at, blend)).collect();

    weights
}

/// Mean read-blend weight over `segments`, which the caller has already
/// restricted to the search window.
pub fn segment_prediction(segments: &[Segment], at: &NaiveDateTime, blend: &ReadBlendConfig) -> Prediction {
    let weights = heatmap_weights(segments, at, blend);
    if weights.is_empty() {
        return Prediction { likelihood: 0.0, segment_count: 0 };
    }

    let sum: f64 = weights.iter().map(|w| w.weight).sum();
    Prediction {
        likelihood: sum / weights.len() as f64,
        segment_count: weights.len() as u32,
    }
}

// ============================================================================
// Grid aggregation
// ============================================================================

#[derive(Debug, Default)]
struct CellBuilder {
    weight_sum: f64,
    max_weight: f64,
    segment_count: u32,
}

/// Grid coordinate
type CellCoord = (i32, i32);

struct HeatmapGrid {
    cell_size_meters: f64,
    ref_lat: f64,
    cells: HashMap<CellCoord, CellBuilder>,
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl HeatmapGrid {
    fn new(cell_size_meters: f64, ref_lat: f64) -> Self {
        Self {
            cell_size_meters,
            ref_lat,
            cells: HashMap::new(),
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lng: f64::INFINITY,
            max_lng: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, w: &HeatmapWeight) {
        self.min_lat = self.min_lat.min(w.lat);
        self.max_lat = self.max_lat.max(w.lat);
        self.min_lng = self.min_lng.min(w.lng);
        self.max_lng = self.max_lng.max(w.lng);

        let coord = to_grid_coords(self.ref_lat, self.cell_size_meters, w.lat, w.lng);
        let cell = self.cells.entry(coord).or_default();
        cell.weight_sum += w.weight;
        cell.max_weight = cell.max_weight.max(w.weight);
        cell.segment_count += 1;
    }

    fn build(self) -> HeatmapResult {
        if self.cells.is_empty() {
            return HeatmapResult {
                cells: vec![],
                bounds: HeatmapBounds { min_lat: 0.0, max_lat: 0.0, min_lng: 0.0, max_lng: 0.0 },
                cell_size_meters: self.cell_size_meters,
                ref_lat: self.ref_lat,
                grid_rows: 0,
                grid_cols: 0,
                total_segments: 0,
            };
        }

        let mut cells: Vec<HeatmapCell> = self
            .cells
            .iter()
            .map(|(&(row, col), builder)| {
                let (center_lat, center_lng) = cell_center(self.ref_lat, self.cell_size_meters, row, col);
                HeatmapCell {
                    row,
                    col,
                    center_lat,
                    center_lng,
                    mean_weight: builder.weight_sum / builder.segment_count as f64,
                    max_weight: builder.max_weight,
                    segment_count: builder.segment_count,
                }
            })
            .collect();
        cells.sort_by_key(|c| (c.row, c.col));

        let min_row = cells.iter().map(|c| c.row).min().unwrap_or(0);
        let max_row = cells.iter().map(|c| c.row).max().unwrap_or(0);
        let min_col = cells.iter().map(|c| c.col).min().unwrap_or(0);
        let max_col = cells.iter().map(|c| c.col).max().unwrap_or(0);
        let total_segments = cells.iter().map(|c| c.segment_count).sum();

        HeatmapResult {
            cells,
            bounds: HeatmapBounds {
                min_lat: self.min_lat,
                max_lat: self.max_lat,
                min_lng: self.min_lng,
                max_lng: self.max_lng,
            },
            cell_size_meters: self.cell_size_meters,
            ref_lat: self.ref_lat,
            grid_rows: (max_row - min_row + 1) as u32,
            grid_cols: (max_col - min_col + 1) as u32,
            total_segments,
        }
    }
}

/// Convert lat/lng to grid coordinates
fn to_grid_coords(ref_lat: f64, cell_size_meters: f64, lat: f64, lng: f64) -> CellCoord {
    // Meters per degree at reference latitude
    let lat_meters_per_deg = 111_320.0;
    let lng_meters_per_deg = 111_320.0 * ref_lat.to_radians().cos();

    let row = ((lat - ref_lat) * lat_meters_per_deg / cell_size_meters).floor() as i32;
    let col = (lng * lng_meters_per_deg / cell_size_meters).floor() as i32;

    (row, col)
}

fn cell_center(ref_lat: f64, cell_size_meters: f64, row: i32, col: i32) -> (f64, f64) {
    let lat_meters_per_deg = 111_320.0;
    let lng_meters_per_deg = 111_320.0 * ref_lat.to_radians().cos();

    let center_lat = ref_lat + ((row as f64 + 0.5) * cell_size_meters / lat_meters_per_deg);
    let center_lng = (col as f64 + 0.5) * cell_size_meters / lng_meters_per_deg;

    (center_lat, center_lng)
}

/// Bin per-segment weights into a sparse grid.
pub fn aggregate_heatmap(weights: &[HeatmapWeight], config: &HeatmapConfig) -> HeatmapResult {
    let in_bounds = |w: &&HeatmapWeight| match &config.bounds {
        Some(b) => w.lat >= b.min_lat && w.lat <= b.max_lat && w.lng >= b.min_lng && w.lng <= b.max_lng,
        None => true,
    };

    let kept: Vec<&HeatmapWeight> = weights.iter().filter(in_bounds).collect();
    let ref_lat = match kept.first() {
        Some(first) => first.lat,
        None => 0.0,
    };

    let mut grid = HeatmapGrid::new(config.cell_size_meters, ref_lat);
    for w in kept {
        grid.add(w);
    }
    grid.build()
}

/// Find the aggregated cell covering a location.
pub fn query_heatmap_cell(heatmap: &HeatmapResult, lat: f64, lng: f64) -> Option<HeatmapCell> {
    if heatmap.cells.is_empty() {
        return None;
    }

    let (row, col) = to_grid_coords(heatmap.ref_lat, heatmap.cell_size_meters, lat, lng);
    heatmap.cells.iter().find(|c| c.row == row && c.col == col).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{HistoricProfile, SLOT_COUNT};
    use crate::GpsPoint;
    use chrono::NaiveDate;

    /// Tuesday 15:00, slot 5
    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(15, 0, 0).unwrap()
    }

    fn segment(id: u64, lat: f64, lng: f64, live: f64, slot5: f64) -> Segment {
        let mut values = [0.0; SLOT_COUNT];
        values[5] = slot5;
        let mut s = Segment::new(id, GpsPoint::new(lat, lng), live);
        s.historic = HistoricProfile::from_values(values);
        s
    }

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_weights_use_read_blend() {
        let segments = vec![segment(1, 40.44, -79.99, 1.0, 0.0), segment(2, 40.45, -79.99, 0.5, 0.4)];
        let weights = heatmap_weights(&segments, &at(), &ReadBlendConfig::default());

        assert_eq!(weights.len(), 2);
        assert!(approx_eq(weights[0].weight, 0.6));
        assert!(approx_eq(weights[1].weight, 0.6 * 0.5 + 0.4 * 0.4));
        assert_eq!(weights[1].segment_id, 2);
    }

    #[test]
    fn test_weights_skip_corrupt_segments() {
        let segments = vec![segment(1, 40.44, -79.99, 1.0, f64::NAN), segment(2, 40.45, -79.99, 0.5, 0.4)];
        let weights = heatmap_weights(&segments, &at(), &ReadBlendConfig::default());
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].segment_id, 2);
    }

    #[test]
    fn test_prediction_mean() {
        let segments = vec![segment(1, 40.44, -79.99, 1.0, 0.0), segment(2, 40.441, -79.99, 0.0, 0.0)];
        let prediction = segment_prediction(&segments, &at(), &ReadBlendConfig::default());
        assert_eq!(prediction.segment_count, 2);
        assert!(approx_eq(prediction.likelihood, 0.3));
    }

    #[test]
    fn test_prediction_without_segments() {
        let prediction = segment_prediction(&[], &at(), &ReadBlendConfig::default());
        assert_eq!(prediction, Prediction { likelihood: 0.0, segment_count: 0 });
    }

    #[test]
    fn test_aggregate_empty() {
        let result = aggregate_heatmap(&[], &HeatmapConfig::default());
        assert!(result.cells.is_empty());
        assert_eq!(result.total_segments, 0);
    }

    #[test]
    fn test_aggregate_groups_nearby_segments() {
        let weights = vec![
            HeatmapWeight { segment_id: 1, lat: 40.44000, lng: -79.99000, weight: 0.2 },
            HeatmapWeight { segment_id: 2, lat: 40.44001, lng: -79.99001, weight: 0.6 },
            HeatmapWeight { segment_id: 3, lat: 40.46000, lng: -79.99000, weight: 1.0 },
        ];
        let result = aggregate_heatmap(&weights, &HeatmapConfig::default());

        assert_eq!(result.total_segments, 3);
        assert_eq!(result.cells.len(), 2);

        let shared = query_heatmap_cell(&result, 40.44000, -79.99000).unwrap();
        assert_eq!(shared.segment_count, 2);
        assert!(approx_eq(shared.mean_weight, 0.4));
        assert!(approx_eq(shared.max_weight, 0.6));
    }

    #[test]
    fn test_aggregate_respects_bounds() {
        let weights = vec![
            HeatmapWeight { segment_id: 1, lat: 40.44, lng: -79.99, weight: 0.2 },
            HeatmapWeight { segment_id: 2, lat: 41.00, lng: -79.99, weight: 0.6 },
        ];
        let config = HeatmapConfig {
            cell_size_meters: 100.0,
            bounds: Some(HeatmapBounds { min_lat: 40.0, max_lat: 40.5, min_lng: -80.0, max_lng: -79.0 }),
        };
        let result = aggregate_heatmap(&weights, &config);
        assert_eq!(result.total_segments, 1);
        assert!(query_heatmap_cell(&result, 41.00, -79.99).is_none());
    }
}
