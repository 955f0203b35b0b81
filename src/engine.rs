//! Trace processing.
//!
//! One submitted trace moves through
//! `RECEIVED -> SNAPPED -> DEDUPLICATED -> (per point: RESOLVED -> SCORED -> RECORDED) -> FINALIZED -> PERSISTED`.
//!
//! Snapping and the user lookup happen before any write, so those failures
//! leave no trace behind. Points are folded strictly in order: point `i + 1`
//! is not resolved until point `i`'s segment write has completed. A point whose
//! blend is not finite is skipped without failing the trace. The user is
//! written once, after the last point.

use std::time::Instant;

use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::geo_utils::{polyline_length, snap_to_grid};
use crate::heatmap::{self, HeatmapConfig, HeatmapResult, HeatmapWeight, Prediction};
use crate::ledger::{ContributionLedger, User, UserProgress};
use crate::likelihood::LikelihoodEstimator;
use crate::segment::{RealTimeUpdate, ReportKind, Segment};
use crate::snapper::RoadSnapper;
use crate::store::{SegmentStore, UserStore};
use crate::trace::{classify_trace, Action, TracePoint};
use crate::{Bounds, GpsPoint};

/// What happened to one deduplicated point.
#[derive(Debug, Clone, PartialEq)]
pub enum PointOutcome {
    /// A new segment was created with the seed likelihood.
    Created { likelihood: f64 },
    /// An existing segment was blended to this likelihood.
    Blended { likelihood: f64 },
    /// The blend was not finite; the segment was left unchanged and no
    /// contribution was recorded.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointResult {
    pub point: GpsPoint,
    pub segment_id: u64,
    pub action: Action,
    pub outcome: PointOutcome,
}

/// Result of a successfully persisted trace.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TraceSummary {
    pub points: Vec<PointResult>,
    pub level_up: bool,
    /// Contributions recorded (skipped points excluded)
    pub recorded: u32,
    /// User level after the trace, `None` when nothing was written
    pub level: Option<u32>,
}

/// Accumulator threaded through the per-point fold.
struct TraceFold {
    ledger: ContributionLedger,
    results: Vec<PointResult>,
}

pub struct ParkingEngine<S, U, R> {
    segments: S,
    users: U,
    snapper: R,
    config: EngineConfig,
    estimator: LikelihoodEstimator,
}

impl<S, U, R> ParkingEngine<S, U, R>
where
    S: SegmentStore,
    U: UserStore,
    R: RoadSnapper,
{
    pub fn new(segments: S, users: U, snapper: R, config: EngineConfig) -> Self {
        let estimator = LikelihoodEstimator::new(config.estimator.clone());
        Self {
            segments,
            users,
            snapper,
            config,
            estimator,
        }
    }

    pub fn segments(&self) -> &S {
        &self.segments
    }

    pub fn users(&self) -> &U {
        &self.users
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Write side
    // ========================================================================

    /// Process a trace at the current local time.
    pub async fn submit_parking_trace(&self, user_id: &str, raw_fixes: &[GpsPoint]) -> Result<TraceSummary> {
        self.submit_parking_trace_at(user_id, raw_fixes, Local::now().naive_local()).await
    }

    /// Process a trace as if it arrived at wall-clock time `at`.
    pub async fn submit_parking_trace_at(
        &self,
        user_id: &str,
        raw_fixes: &[GpsPoint],
        at: NaiveDateTime,
    ) -> Result<TraceSummary> {
        let start = Instant::now();

        let fixes: Vec<GpsPoint> = raw_fixes.iter().copied().filter(GpsPoint::is_valid).collect();
        if fixes.len() < raw_fixes.len() {
            warn!("[Engine] Dropped {} invalid fixes from trace", raw_fixes.len() - fixes.len());
        }
        if fixes.is_empty() {
            debug!("[Engine] Empty trace for user {}, nothing to do", user_id);
            return Ok(TraceSummary::default());
        }

        if self.users.find_user_by_id(user_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("user {}", user_id)));
        }

        let snapped = self.snap(&fixes).await?;
        let trace = self.dedupe(&snapped);
        debug!(
            "[Engine] Trace for {}: {} fixes -> {} snapped ({:.0}m) -> {} unique points",
            user_id,
            fixes.len(),
            snapped.len(),
            polyline_length(&snapped),
            trace.len()
        );

        let mut fold = TraceFold {
            ledger: ContributionLedger::new(self.config.progression.clone()),
            results: Vec::with_capacity(trace.len()),
        };
        for (i, tp) in trace.iter().enumerate() {
            let next = trace.get(i + 1).map(|n| n.point);
            fold = self.fold_point(fold, tp, next, at).await?;
        }

        let TraceFold { ledger, results } = fold;
        let recorded = ledger.recorded();
        let (level_up, level) = if recorded > 0 {
            let (user, level_up) = self
                .users
                .update_user(user_id, Box::new(move |user: &mut User| ledger.apply_to(user)))
                .await?;
            (level_up, Some(user.level))
        } else {
            (false, None)
        };

        info!(
            "[Engine] Trace for {} persisted: {} points ({} recorded, {} skipped), level_up={} in {:?}",
            user_id,
            results.len(),
            recorded,
            results.len() as u32 - recorded,
            level_up,
            start.elapsed()
        );

        Ok(TraceSummary {
            points: results,
            level_up,
            recorded,
            level,
        })
    }

    /// Record a single report (e.g. leaving a spot) against the segment at
    /// `point`. Likelihoods and progression are untouched.
    pub async fn report_spot_event(
        &self,
        user_id: &str,
        point: GpsPoint,
        kind: ReportKind,
        at: NaiveDateTime,
    ) -> Result<Segment> {
        if !point.is_valid() {
            return Err(EngineError::InvalidInput(format!("invalid coordinate {:?}", point)));
        }
        if self.users.find_user_by_id(user_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("user {}", user_id)));
        }

        let point = self.canonical(point);
        let upserted = self.segments.upsert_segment(point, 0.0).await?;
        let key = upserted.segment.key();
        let retention = self.config.retention.clone();

        let updated = self
            .segments
            .update_segment(
                &key,
                Box::new(move |segment: &mut Segment| {
                    segment.push_update(RealTimeUpdate { kind, timestamp: at }, &retention);
                    true
                }),
            )
            .await?;

        updated.ok_or_else(|| EngineError::Storage(format!("report on segment {} was not applied", key)))
    }

    pub async fn user_progress(&self, user_id: &str) -> Result<UserProgress> {
        self.users
            .find_user_by_id(user_id)
            .await?
            .map(|user| UserProgress::from(&user))
            .ok_or_else(|| EngineError::NotFound(format!("user {}", user_id)))
    }

    // ========================================================================
    // Read side
    // ========================================================================

    /// Read-blend weight of every known segment at `at`.
    pub async fn get_heatmap_weights(&self, at: NaiveDateTime) -> Result<Vec<HeatmapWeight>> {
        let segments = self.segments.all_segments().await?;
        Ok(heatmap::heatmap_weights(&segments, &at, &self.config.read_blend))
    }

    /// Likelihood around a location, averaged over segments within the
    /// configured tolerance window.
    pub async fn get_segment_prediction(&self, lat: f64, lng: f64, at: NaiveDateTime) -> Result<Prediction> {
        let center = GpsPoint::new(lat, lng);
        if !center.is_valid() {
            return Err(EngineError::InvalidInput(format!("invalid coordinate {},{}", lat, lng)));
        }

        let bounds = Bounds::around(&center, self.config.prediction.tolerance_deg);
        let segments = self.segments.segments_within(&bounds).await?;
        Ok(heatmap::segment_prediction(&segments, &at, &self.config.read_blend))
    }

    /// Heatmap weights binned into a sparse grid.
    pub async fn get_heatmap_grid(&self, at: NaiveDateTime, config: &HeatmapConfig) -> Result<HeatmapResult> {
        let weights = self.get_heatmap_weights(at).await?;
        Ok(heatmap::aggregate_heatmap(&weights, config))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn snap(&self, fixes: &[GpsPoint]) -> Result<Vec<GpsPoint>> {
        let limit = self.config.snapper.timeout;
        let snapped = match tokio::time::timeout(limit, self.snapper.snap_to_road(fixes)).await {
            Ok(Ok(points)) => points,
            Ok(Err(EngineError::SnapFailed(msg))) => return Err(EngineError::SnapFailed(msg)),
            Ok(Err(other)) => return Err(EngineError::SnapFailed(other.to_string())),
            Err(_) => return Err(EngineError::SnapFailed(format!("timed out after {:?}", limit))),
        };

        if snapped.is_empty() {
            return Err(EngineError::SnapFailed("snapper returned no points".to_string()));
        }
        Ok(snapped)
    }

    fn canonical(&self, point: GpsPoint) -> GpsPoint {
        match self.config.resolver.grid_snap_deg {
            Some(cell) => snap_to_grid(&point, cell),
            None => point,
        }
    }

    fn dedupe(&self, snapped: &[GpsPoint]) -> Vec<TracePoint> {
        let canonical: Vec<GpsPoint> = snapped.iter().map(|p| self.canonical(*p)).collect();
        classify_trace(&canonical)
    }

    /// Resolve, score and record one point.
    async fn fold_point(
        &self,
        mut fold: TraceFold,
        tp: &TracePoint,
        next: Option<GpsPoint>,
        at: NaiveDateTime,
    ) -> Result<TraceFold> {
        let parked = tp.is_parked();
        let seed = if parked { 1.0 } else { 0.0 };

        let upserted = self.segments.upsert_segment(tp.point, seed).await?;
        let created = upserted.created;
        let key = upserted.segment.key();
        let segment_id = upserted.segment.id;
        let seeded = upserted.segment.live_likelihood();

        let estimator = self.estimator.clone();
        let retention = self.config.retention.clone();
        let report = RealTimeUpdate { kind: ReportKind::from(tp.action), timestamp: at };

        let updated = self
            .segments
            .update_segment(
                &key,
                Box::new(move |segment: &mut Segment| {
                    if created {
                        if segment.end.is_none() {
                            segment.end = next;
                        }
                    } else {
                        let estimate = estimator.estimate(segment, &at, parked);
                        if !estimator.apply(segment, estimate) {
                            return false;
                        }
                    }
                    segment.push_update(report, &retention);
                    true
                }),
            )
            .await?;

        let outcome = match updated {
            // Another trace may have blended the segment since it was created.
            Some(_) if created => PointOutcome::Created { likelihood: seeded },
            Some(segment) => PointOutcome::Blended { likelihood: segment.live_likelihood() },
            None => {
                warn!(
                    "[Engine] Non-finite likelihood for segment #{} at {}, skipping point",
                    segment_id, key
                );
                PointOutcome::Skipped
            }
        };

        if outcome != PointOutcome::Skipped {
            fold.ledger.record(segment_id, tp.action, at);
        }
        fold.results.push(PointResult {
            point: tp.point,
            segment_id,
            action: tp.action,
            outcome,
        });

        Ok(fold)
    }
}
