//! HTTP road snapping client for the Google Roads API.
//!
//! - Connection pooling shared across traces
//! - Traces longer than the service limit are split into chunks, fetched
//!   concurrently and stitched back together in order
//! - Automatic retry with exponential backoff on 429 and transport errors

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{EngineError, Result};
use crate::snapper::RoadSnapper;
use crate::GpsPoint;

const DEFAULT_BASE_URL: &str = "https://roads.googleapis.com";
// Service limit for one snapToRoads request
const MAX_POINTS_PER_REQUEST: usize = 100;
const MAX_CONCURRENCY: usize = 4;

/// Configuration for [`GoogleRoadsSnapper`].
#[derive(Debug, Clone)]
pub struct RoadsClientConfig {
    /// API root, overridable for proxies and tests.
    /// Default: https://roads.googleapis.com
    pub base_url: String,
    /// Ask the service to fill in points along the road between fixes.
    /// Default: true
    pub interpolate: bool,
    /// Retries per chunk on 429 or transport errors.
    /// Default: 3
    pub max_retries: u32,
    /// Per-request timeout.
    /// Default: 5 seconds
    pub request_timeout: Duration,
}

impl Default for RoadsClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            interpolate: true,
            max_retries: 3,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// API response for the snapToRoads endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapApiResponse {
    #[serde(default)]
    snapped_points: Vec<SnappedPoint>,
}

#[derive(Debug, Deserialize)]
struct SnappedPoint {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

pub struct GoogleRoadsSnapper {
    client: Client,
    api_key: String,
    config: RoadsClientConfig,
}

impl GoogleRoadsSnapper {
    pub fn new(api_key: &str, config: RoadsClientConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::SnapFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            config,
        })
    }

    async fn snap_chunk(&self, chunk_index: usize, fixes: &[GpsPoint]) -> Result<Vec<GpsPoint>> {
        let url = format!("{}/v1/snapToRoads", self.config.base_url.trim_end_matches('/'));
        let path = build_path(fixes);
        let interpolate = if self.config.interpolate { "true" } else { "false" };

        let mut retries = 0;
        let req_start = Instant::now();

        loop {
            let response = self
                .client
                .get(&url)
                .query(&[("path", path.as_str()), ("interpolate", interpolate), ("key", self.api_key.as_str())])
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(EngineError::SnapFailed("Max retries exceeded (429)".to_string()));
                        }
                        let wait = backoff(retries);
                        warn!("[Snap chunk {}] 429 Too Many Requests, retry {} with {:?} backoff", chunk_index, retries, wait);
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(EngineError::SnapFailed(format!("HTTP {}", status)));
                    }

                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| EngineError::SnapFailed(format!("Body download error: {}", e)))?;
                    let snapped = parse_snap_response(&bytes)?;

                    debug!(
                        "[Snap chunk {}] {} fixes -> {} points in {:?}",
                        chunk_index,
                        fixes.len(),
                        snapped.len(),
                        req_start.elapsed()
                    );
                    return Ok(snapped);
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(EngineError::SnapFailed(format!("Request error: {}", e)));
                    }
                    let wait = backoff(retries);
                    warn!("[Snap chunk {}] Error: {}, retry {} after {:?}", chunk_index, e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[async_trait]
impl RoadSnapper for GoogleRoadsSnapper {
    async fn snap_to_road(&self, fixes: &[GpsPoint]) -> Result<Vec<GpsPoint>> {
        use futures::stream::{self, StreamExt, TryStreamExt};

        if fixes.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let chunks: Vec<&[GpsPoint]> = fixes.chunks(MAX_POINTS_PER_REQUEST).collect();
        let chunk_count = chunks.len();

        // Ordered buffering keeps chunk results in trace order.
        let snapped: Vec<Vec<GpsPoint>> = stream::iter(chunks.into_iter().enumerate())
            .map(|(i, chunk)| self.snap_chunk(i, chunk))
            .buffered(MAX_CONCURRENCY)
            .try_collect()
            .await?;

        let points: Vec<GpsPoint> = snapped.into_iter().flatten().collect();
        info!(
            "[RoadsSnapper] {} fixes in {} chunk(s) -> {} snapped points in {:.2}s",
            fixes.len(),
            chunk_count,
            points.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(points)
    }
}

/// `lat,lng|lat,lng|...` as the service expects.
fn build_path(fixes: &[GpsPoint]) -> String {
    fixes
        .iter()
        .map(|p| format!("{},{}", p.latitude, p.longitude))
        .collect::<Vec<_>>()
        .join("|")
}

fn parse_snap_response(bytes: &[u8]) -> Result<Vec<GpsPoint>> {
    let data: SnapApiResponse = serde_json::from_slice(bytes)
        .map_err(|e| EngineError::SnapFailed(format!("JSON parse error: {}", e)))?;

    Ok(data
        .snapped_points
        .into_iter()
        .map(|p| GpsPoint::new(p.location.latitude, p.location.longitude))
        .filter(|p| p.is_valid())
        .collect())
}

// Exponential backoff: 400ms, 800ms, 1.6s, capped at 3.2s
fn backoff(retries: u32) -> Duration {
    Duration::from_millis(200 * (1 << retries.min(4)))
}
