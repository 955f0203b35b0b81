//! Road snapping seam.
//!
//! The engine treats the snapper's output as ground truth. Any failure is fatal
//! to the trace. Time limits are applied by the engine around each call, so
//! implementations do not need their own overall deadline.

use async_trait::async_trait;

use crate::error::Result;
use crate::GpsPoint;

#[async_trait]
pub trait RoadSnapper: Send + Sync {
    /// Map raw GPS fixes onto road geometry, preserving order.
    async fn snap_to_road(&self, fixes: &[GpsPoint]) -> Result<Vec<GpsPoint>>;
}

/// Returns fixes unchanged. For clients that snap on-device and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSnapper;

#[async_trait]
impl RoadSnapper for PassthroughSnapper {
    async fn snap_to_road(&self, fixes: &[GpsPoint]) -> Result<Vec<GpsPoint>> {
        Ok(fixes.to_vec())
    }
}
