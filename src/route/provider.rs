//! Directions provider seam.
//!
//! Route computation is delegated to an external service. The navigation
//! core only sees [`DirectionsProvider`]; [`StraightLineProvider`] is a
//! deterministic stand-in used for trace replay and tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{RoutePlan, RouteStep, TravelMode};
use crate::core::{GeoPoint, bearing_deg, haversine_m};

/// Request sent to a directions provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsRequest {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    #[serde(default)]
    pub waypoints: Vec<GeoPoint>,
    #[serde(default)]
    pub mode: TravelMode,
}

impl DirectionsRequest {
    pub fn new(origin: GeoPoint, destination: GeoPoint, mode: TravelMode) -> Self {
        Self {
            origin,
            destination,
            waypoints: Vec::new(),
            mode,
        }
    }
}

/// Failure reported by a directions provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("no route found")]
    NoRouteFound,

    #[error("rate limited")]
    RateLimited,

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider request timed out")]
    Timeout,
}

/// External route computation.
///
/// Calls may block on network I/O; the navigation loop only invokes this
/// from the directions worker thread.
pub trait DirectionsProvider: Send + Sync {
    fn route(&self, request: &DirectionsRequest) -> Result<RoutePlan, ProviderError>;
}

/// Builds straight legs from the origin through the waypoints to the
/// destination, timed at the mode's typical speed.
#[derive(Debug, Clone, Default)]
pub struct StraightLineProvider {
    /// Overrides the mode's typical speed (m/s).
    pub speed_mps: Option<f64>,
}

impl StraightLineProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speed(speed_mps: f64) -> Self {
        Self {
            speed_mps: Some(speed_mps),
        }
    }
}

impl DirectionsProvider for StraightLineProvider {
    fn route(&self, request: &DirectionsRequest) -> Result<RoutePlan, ProviderError> {
        let speed = self
            .speed_mps
            .unwrap_or_else(|| request.mode.typical_speed_mps());
        if !(speed > 0.0) {
            return Err(ProviderError::ProviderUnavailable(format!(
                "invalid speed {}",
                speed
            )));
        }

        let mut points = Vec::with_capacity(request.waypoints.len() + 2);
        points.push(request.origin);
        points.extend(request.waypoints.iter().copied());
        points.push(request.destination);

        let mut steps = Vec::with_capacity(points.len());
        let mut cumulative = 0.0;
        for (i, leg) in points.windows(2).enumerate() {
            let instruction = if i == 0 {
                format!("Head {}", cardinal(bearing_deg(&leg[0], &leg[1])))
            } else {
                format!(
                    "At waypoint {}, continue {}",
                    i,
                    cardinal(bearing_deg(&leg[0], &leg[1]))
                )
            };
            steps.push(RouteStep {
                index: i,
                instruction,
                maneuver_anchor: leg[0],
                cumulative_distance_m: cumulative,
                cumulative_duration_s: cumulative / speed,
            });
            cumulative += haversine_m(&leg[0], &leg[1]);
        }
        steps.push(RouteStep {
            index: steps.len(),
            instruction: "Arrive at destination".to_string(),
            maneuver_anchor: request.destination,
            cumulative_distance_m: cumulative,
            cumulative_duration_s: cumulative / speed,
        });

        RoutePlan::new(
            request.origin,
            request.destination,
            steps,
            cumulative,
            cumulative / speed,
            request.mode,
        )
        .map_err(|e| ProviderError::ProviderUnavailable(e.to_string()))
    }
}

/// Eight-way compass name for a bearing.
fn cardinal(bearing: f64) -> &'static str {
    const NAMES: [&str; 8] = [
        "north",
        "northeast",
        "east",
        "southeast",
        "south",
        "southwest",
        "west",
        "northwest",
    ];
    let sector = ((bearing.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
    NAMES[sector]
}
