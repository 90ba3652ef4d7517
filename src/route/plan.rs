//! Route plan produced by a directions provider.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::GeoPoint;
use crate::error::{NavError, Result};

static NEXT_PLAN_ID: AtomicU64 = AtomicU64::new(1);

/// Travel mode requested from the directions provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Cycling,
    Transit,
}

impl TravelMode {
    /// Typical cruising speed (m/s), used when no provider timing exists.
    pub fn typical_speed_mps(&self) -> f64 {
        match self {
            TravelMode::Driving => 13.9,
            TravelMode::Walking => 1.4,
            TravelMode::Cycling => 4.5,
            TravelMode::Transit => 8.3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "DRIVING",
            TravelMode::Walking => "WALKING",
            TravelMode::Cycling => "CYCLING",
            TravelMode::Transit => "TRANSIT",
        }
    }
}

/// One maneuver of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    /// Position in the plan (0-based, contiguous).
    pub index: usize,

    /// Instruction text, e.g. "Turn left onto Ringstraße".
    pub instruction: String,

    /// Point at which the maneuver becomes relevant.
    pub maneuver_anchor: GeoPoint,

    /// Route distance from the origin to the anchor (meters).
    pub cumulative_distance_m: f64,

    /// Route duration from the origin to the anchor (seconds).
    pub cumulative_duration_s: f64,
}

/// Serialized form of a plan, validated into [`RoutePlan`].
#[derive(Debug, Clone, Deserialize)]
pub struct RoutePlanSpec {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    #[serde(default)]
    pub steps: Vec<RouteStep>,
    pub total_distance_m: f64,
    pub total_duration_s: f64,
    #[serde(default)]
    pub mode: TravelMode,
}

/// An immutable route.
///
/// Fields are read-only; a reroute builds a new plan with a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RoutePlanSpec")]
pub struct RoutePlan {
    id: u64,
    origin: GeoPoint,
    destination: GeoPoint,
    steps: Vec<RouteStep>,
    total_distance_m: f64,
    total_duration_s: f64,
    mode: TravelMode,
}

impl RoutePlan {
    /// Validate and freeze a plan.
    ///
    /// A plan without steps is structurally valid here; navigation refuses
    /// to start on it.
    pub fn new(
        origin: GeoPoint,
        destination: GeoPoint,
        steps: Vec<RouteStep>,
        total_distance_m: f64,
        total_duration_s: f64,
        mode: TravelMode,
    ) -> Result<Self> {
        if !origin.is_valid() || !destination.is_valid() {
            return Err(NavError::InvalidPlan(
                "origin or destination out of range".to_string(),
            ));
        }
        if !(total_distance_m.is_finite() && total_distance_m >= 0.0)
            || !(total_duration_s.is_finite() && total_duration_s >= 0.0)
        {
            return Err(NavError::InvalidPlan(format!(
                "invalid totals: {} m, {} s",
                total_distance_m, total_duration_s
            )));
        }

        let mut prev: Option<&RouteStep> = None;
        for (i, step) in steps.iter().enumerate() {
            if step.index != i {
                return Err(NavError::InvalidPlan(format!(
                    "step {} has index {}",
                    i, step.index
                )));
            }
            if !step.maneuver_anchor.is_valid() {
                return Err(NavError::InvalidPlan(format!("step {} anchor out of range", i)));
            }
            if let Some(p) = prev
                && (step.cumulative_distance_m < p.cumulative_distance_m
                    || step.cumulative_duration_s < p.cumulative_duration_s)
            {
                return Err(NavError::InvalidPlan(format!(
                    "step {} cumulative values decrease",
                    i
                )));
            }
            prev = Some(step);
        }

        Ok(Self {
            id: NEXT_PLAN_ID.fetch_add(1, Ordering::Relaxed),
            origin,
            destination,
            steps,
            total_distance_m,
            total_duration_s,
            mode,
        })
    }

    /// Parse a plan from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a plan from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    pub fn destination(&self) -> GeoPoint {
        self.destination
    }

    pub fn steps(&self) -> &[RouteStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&RouteStep> {
        self.steps.get(index)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.steps.len().checked_sub(1)
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn total_duration_s(&self) -> f64 {
        self.total_duration_s
    }

    pub fn mode(&self) -> TravelMode {
        self.mode
    }

    /// Average pace of the plan (s/m), or the mode's typical pace.
    fn pace_s_per_m(&self) -> f64 {
        if self.total_distance_m > 0.0 {
            self.total_duration_s / self.total_distance_m
        } else {
            1.0 / self.mode.typical_speed_mps()
        }
    }

    /// Estimated time left when `distance_to_next_m` away from the anchor of
    /// step `active_index`.
    pub fn remaining_duration_s(&self, active_index: usize, distance_to_next_m: f64) -> f64 {
        let after_anchor = match self.last_index() {
            Some(last) => {
                let step = &self.steps[active_index.min(last)];
                (self.total_duration_s - step.cumulative_duration_s).max(0.0)
            }
            None => 0.0,
        };
        after_anchor + distance_to_next_m.max(0.0) * self.pace_s_per_m()
    }

    /// Polyline of the part of the route still ahead: the previous anchor
    /// (or the origin), the remaining anchors and the destination.
    pub fn remaining_polyline(&self, active_index: usize) -> Vec<GeoPoint> {
        let mut points = Vec::with_capacity(self.steps.len().saturating_sub(active_index) + 2);
        let start = match active_index.checked_sub(1).and_then(|i| self.steps.get(i)) {
            Some(prev) => prev.maneuver_anchor,
            None => self.origin,
        };
        points.push(start);
        points.extend(self.steps.iter().skip(active_index).map(|s| s.maneuver_anchor));
        points.push(self.destination);
        points
    }
}

impl TryFrom<RoutePlanSpec> for RoutePlan {
    type Error = NavError;

    fn try_from(spec: RoutePlanSpec) -> Result<Self> {
        RoutePlan::new(
            spec.origin,
            spec.destination,
            spec.steps,
            spec.total_distance_m,
            spec.total_duration_s,
            spec.mode,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step(index: usize, lat: f64, lon: f64, dist: f64, dur: f64) -> RouteStep {
        RouteStep {
            index,
            instruction: format!("Step {}", index),
            maneuver_anchor: GeoPoint::new(lat, lon),
            cumulative_distance_m: dist,
            cumulative_duration_s: dur,
        }
    }

    fn three_step_plan() -> RoutePlan {
        RoutePlan::new(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.003),
            vec![
                step(0, 0.0, 0.0, 0.0, 0.0),
                step(1, 0.0, 0.001, 111.0, 60.0),
                step(2, 0.0, 0.002, 222.0, 120.0),
            ],
            333.0,
            180.0,
            TravelMode::Walking,
        )
        .unwrap()
    }

    #[test]
    fn test_plan_ids_are_unique() {
        let a = three_step_plan();
        let b = three_step_plan();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_rejects_non_contiguous_indices() {
        let result = RoutePlan::new(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.002),
            vec![step(0, 0.0, 0.0, 0.0, 0.0), step(2, 0.0, 0.001, 10.0, 5.0)],
            20.0,
            10.0,
            TravelMode::Driving,
        );
        assert!(matches!(result, Err(NavError::InvalidPlan(_))));
    }

    #[test]
    fn test_rejects_decreasing_cumulative() {
        let result = RoutePlan::new(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.002),
            vec![step(0, 0.0, 0.0, 50.0, 0.0), step(1, 0.0, 0.001, 10.0, 5.0)],
            20.0,
            10.0,
            TravelMode::Driving,
        );
        assert!(matches!(result, Err(NavError::InvalidPlan(_))));
    }

    #[test]
    fn test_empty_plan_is_constructible() {
        let plan = RoutePlan::new(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.002),
            Vec::new(),
            0.0,
            0.0,
            TravelMode::Driving,
        )
        .unwrap();
        assert!(plan.steps().is_empty());
        assert_eq!(plan.last_index(), None);
    }

    #[test]
    fn test_remaining_duration() {
        let plan = three_step_plan();
        // At the start: full duration after anchor 0.
        assert_relative_eq!(plan.remaining_duration_s(0, 0.0), 180.0);
        // Heading to step 1, 111 m away at 180/333 s/m.
        assert_relative_eq!(
            plan.remaining_duration_s(1, 111.0),
            120.0 + 111.0 * 180.0 / 333.0,
            epsilon = 1e-9
        );
        // Index past the end clamps to the last step.
        assert_relative_eq!(plan.remaining_duration_s(10, 0.0), 60.0);
    }

    #[test]
    fn test_remaining_polyline() {
        let plan = three_step_plan();
        let line = plan.remaining_polyline(0);
        assert_eq!(line.len(), 5);
        assert_eq!(line[0], plan.origin());

        let line = plan.remaining_polyline(2);
        assert_eq!(line.len(), 3);
        assert_eq!(line[0], GeoPoint::new(0.0, 0.001));
        assert_eq!(line[2], plan.destination());
    }

    #[test]
    fn test_json_roundtrip_validates() {
        let json = r#"{
            "origin": {"latitude": 0.0, "longitude": 0.0},
            "destination": {"latitude": 0.0, "longitude": 0.002},
            "steps": [
                {"index": 0, "instruction": "Head east", "maneuver_anchor": {"latitude": 0.0, "longitude": 0.0},
                 "cumulative_distance_m": 0.0, "cumulative_duration_s": 0.0}
            ],
            "total_distance_m": 222.0,
            "total_duration_s": 160.0,
            "mode": "WALKING"
        }"#;
        let plan = RoutePlan::from_json_str(json).unwrap();
        assert_eq!(plan.mode(), TravelMode::Walking);
        assert_eq!(plan.steps()[0].instruction, "Head east");

        let bad = json.replace("\"index\": 0", "\"index\": 3");
        assert!(RoutePlan::from_json_str(&bad).is_err());
    }
}
