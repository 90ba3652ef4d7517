//! Progress tracker.
//!
//! Turns each position sample into progress against the active plan:
//! distances, step advance, arrival, ETA and pre-announcements. The tracker
//! only writes the position-derived fields of a [`NavigationSession`]; the
//! session state belongs to the controller.

use serde::Deserialize;

use super::{NavigationSession, SessionState, TrackerEvent};
use crate::core::{GeoPoint, distance_to_segment_m, haversine_m};
use crate::position::PositionSample;

/// Configuration for progress tracking.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Distance to the active anchor that completes a step (meters)
    pub advance_threshold_m: f64,
    /// Distance to the destination that completes the route (meters)
    pub arrival_threshold_m: f64,
    /// Below this speed the previous ETA is kept (m/s)
    pub min_moving_speed_mps: f64,
    /// Pre-announce distances before a maneuver (meters)
    pub announce_thresholds_m: Vec<f64>,
    /// Samples less accurate than this raise the degraded indicator (meters)
    pub degraded_accuracy_m: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            advance_threshold_m: 20.0,
            arrival_threshold_m: 50.0,
            min_moving_speed_mps: 0.5,
            announce_thresholds_m: vec![100.0, 50.0],
            degraded_accuracy_m: 50.0,
        }
    }
}

/// Position-driven progress state machine.
pub struct ProgressTracker {
    config: TrackerConfig,
    /// Pre-announce thresholds, highest first
    thresholds: Vec<f64>,
    /// (plan id, step index) the spent flags belong to
    announce_step: Option<(u64, usize)>,
    spent: Vec<bool>,
    /// Arrival latch
    arrived: bool,
}

impl ProgressTracker {
    /// Create a tracker with configuration.
    pub fn new(config: TrackerConfig) -> Self {
        let mut thresholds = config.announce_thresholds_m.clone();
        thresholds.sort_by(|a, b| b.total_cmp(a));
        thresholds.dedup();
        let spent = vec![false; thresholds.len()];

        Self {
            config,
            thresholds,
            announce_step: None,
            spent,
            arrived: false,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Whether arrival has been reported for the current session.
    pub fn has_arrived(&self) -> bool {
        self.arrived
    }

    /// Forget per-session state. Called when a new session starts.
    pub fn reset(&mut self) {
        self.announce_step = None;
        self.spent.iter_mut().for_each(|s| *s = false);
        self.arrived = false;
    }

    /// Process one sample against an active session.
    ///
    /// Samples for sessions that are not `Active`, or that arrive after
    /// arrival was reported, change nothing.
    pub fn update(
        &mut self,
        session: &mut NavigationSession,
        sample: &PositionSample,
    ) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        if session.state != SessionState::Active || self.arrived {
            return events;
        }
        let Some(last) = session.plan.last_index() else {
            return events;
        };
        let here = sample.point();

        let degraded = sample.accuracy_m > self.config.degraded_accuracy_m;
        if degraded != session.accuracy_degraded {
            session.accuracy_degraded = degraded;
            if degraded {
                tracing::warn!("Position accuracy degraded ({:.0}m)", sample.accuracy_m);
            } else {
                tracing::info!("Position accuracy restored");
            }
            events.push(TrackerEvent::AccuracyChanged { degraded });
        }
        session.last_sample = Some(*sample);

        let from = session.active_step_index.min(last);
        let to = self.advance(session, &here, from, last);
        if to != from {
            session.active_step_index = to;
            let instruction = session.plan.steps()[to].instruction.clone();
            tracing::debug!("Step advanced {} -> {}: {}", from, to, instruction);
            events.push(TrackerEvent::StepAdvanced {
                from,
                to,
                instruction,
            });
        }

        let step = &session.plan.steps()[to];
        let distance_next = haversine_m(&here, &step.maneuver_anchor);
        let distance_dest = haversine_m(&here, &session.plan.destination());
        session.distance_to_next_m = Some(distance_next);
        session.distance_to_destination_m = Some(distance_dest);

        if let Some(speed) = sample.speed_mps
            && speed > self.config.min_moving_speed_mps
        {
            session.eta_s = distance_dest / speed;
            events.push(TrackerEvent::EtaUpdated {
                eta_s: session.eta_s,
            });
        }

        if distance_dest < self.config.arrival_threshold_m {
            self.arrived = true;
            tracing::info!("Arrived: {:.1}m from destination", distance_dest);
            events.push(TrackerEvent::Arrived {
                distance_m: distance_dest,
            });
            return events;
        }

        // Only the final active step is considered, so skipped steps stay silent.
        self.select_announce_step(session.plan.id(), to);
        let mut crossed = None;
        for (i, threshold) in self.thresholds.iter().enumerate() {
            if distance_next < *threshold && !self.spent[i] {
                self.spent[i] = true;
                crossed = Some(*threshold);
            }
        }
        if let Some(threshold_m) = crossed {
            events.push(TrackerEvent::UpcomingManeuver {
                step_index: to,
                instruction: step.instruction.clone(),
                threshold_m,
                distance_m: distance_next,
            });
        }

        events
    }

    /// Record a transient position failure.
    ///
    /// Progress stays on the last known sample; only the indicator changes.
    pub fn position_lost(&mut self, session: &mut NavigationSession) -> Option<TrackerEvent> {
        if session.state != SessionState::Active || session.accuracy_degraded {
            return None;
        }
        session.accuracy_degraded = true;
        tracing::warn!("Position lost, continuing on last known sample");
        Some(TrackerEvent::AccuracyChanged { degraded: true })
    }

    /// Walk the active index forward while the sample is within the advance
    /// threshold of the active anchor.
    ///
    /// A sample near a later anchor (GPS jump) moves straight to that step and
    /// is re-validated there, but only when the sample is also off the leg
    /// leading to the active anchor. Routes that revisit a point keep their
    /// intermediate steps while the user is still on the current leg.
    fn advance(
        &self,
        session: &NavigationSession,
        here: &GeoPoint,
        from: usize,
        last: usize,
    ) -> usize {
        let steps = session.plan.steps();
        let threshold = self.config.advance_threshold_m;
        let mut active = from;

        while active < last {
            if haversine_m(here, &steps[active].maneuver_anchor) < threshold {
                active += 1;
                continue;
            }
            let leg_start = match active {
                0 => session.plan.origin(),
                i => steps[i - 1].maneuver_anchor,
            };
            if distance_to_segment_m(here, &leg_start, &steps[active].maneuver_anchor) < threshold {
                break;
            }
            match (active + 1..=last)
                .find(|&j| haversine_m(here, &steps[j].maneuver_anchor) < threshold)
            {
                Some(j) => {
                    tracing::debug!("Position jumped ahead to step {}", j);
                    active = j;
                }
                None => break,
            }
        }
        active
    }

    fn select_announce_step(&mut self, plan_id: u64, step: usize) {
        if self.announce_step != Some((plan_id, step)) {
            self.announce_step = Some((plan_id, step));
            self.spent.iter_mut().for_each(|s| *s = false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GeoPoint;
    use crate::route::{RoutePlan, RouteStep, TravelMode};
    use approx::assert_relative_eq;

    /// Plan along the equator with one anchor per entry of `lons`.
    fn equator_plan(lons: &[f64], destination_lon: f64) -> RoutePlan {
        let steps = lons
            .iter()
            .enumerate()
            .map(|(i, lon)| RouteStep {
                index: i,
                instruction: format!("Turn {}", i),
                maneuver_anchor: GeoPoint::new(0.0, *lon),
                cumulative_distance_m: lon * 111_195.0,
                cumulative_duration_s: lon * 11_119.5,
            })
            .collect();
        RoutePlan::new(
            GeoPoint::new(0.0, lons[0]),
            GeoPoint::new(0.0, destination_lon),
            steps,
            destination_lon * 111_195.0,
            destination_lon * 11_119.5,
            TravelMode::Driving,
        )
        .unwrap()
    }

    fn active_session(plan: RoutePlan) -> NavigationSession {
        let mut session = NavigationSession::new(plan);
        session.state = SessionState::Active;
        session
    }

    fn at(lon: f64) -> PositionSample {
        PositionSample::new(0.0, lon, 0)
    }

    fn arrivals(events: &[TrackerEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, TrackerEvent::Arrived { .. }))
            .count()
    }

    #[test]
    fn test_two_step_scenario() {
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = active_session(equator_plan(&[0.0, 0.001], 0.002));

        let events = tracker.update(&mut session, &at(0.0));
        assert_eq!(session.active_step_index, 1);
        assert!(events.contains(&TrackerEvent::StepAdvanced {
            from: 0,
            to: 1,
            instruction: "Turn 1".to_string(),
        }));

        let events = tracker.update(&mut session, &at(0.0009));
        assert_eq!(session.active_step_index, 1);
        assert_eq!(arrivals(&events), 0);

        let events = tracker.update(&mut session, &at(0.0019));
        assert_eq!(arrivals(&events), 1);
        assert!(tracker.has_arrived());
    }

    #[test]
    fn test_monotonic_walk_reaches_last_step_then_arrives() {
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = active_session(equator_plan(&[0.0, 0.001, 0.002, 0.003], 0.004));

        let mut previous = 0;
        let mut arrived = 0;
        for i in 0..=40 {
            let events = tracker.update(&mut session, &at(i as f64 * 0.0001));
            assert!(session.active_step_index >= previous);
            previous = session.active_step_index;
            arrived += arrivals(&events);
            if i < 36 {
                assert_eq!(arrived, 0, "arrived early at sample {}", i);
            }
        }

        assert_eq!(session.active_step_index, 3);
        assert_eq!(arrived, 1);
    }

    #[test]
    fn test_arrival_latches() {
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = active_session(equator_plan(&[0.0, 0.001], 0.002));

        tracker.update(&mut session, &at(0.0));
        let events = tracker.update(&mut session, &at(0.0019));
        assert_eq!(arrivals(&events), 1);

        for _ in 0..5 {
            let events = tracker.update(&mut session, &at(0.002));
            assert!(events.is_empty());
        }
    }

    #[test]
    fn test_gps_jump_skips_steps_without_announcing_them() {
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = active_session(equator_plan(&[0.0, 0.001, 0.002, 0.003], 0.004));
        tracker.update(&mut session, &at(0.0));
        assert_eq!(session.active_step_index, 1);

        // Land on anchor 2: skip step 1, then advance past anchor 2.
        let events = tracker.update(&mut session, &at(0.002));
        assert_eq!(session.active_step_index, 3);
        let advanced: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, TrackerEvent::StepAdvanced { .. }))
            .collect();
        assert_eq!(advanced.len(), 1);
        assert!(matches!(
            advanced[0],
            TrackerEvent::StepAdvanced { from: 1, to: 3, .. }
        ));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, TrackerEvent::UpcomingManeuver { .. }))
        );
    }

    #[test]
    fn test_revisited_point_advances_one_step() {
        // Out east and back: anchor 2 sits 11m from anchor 0.
        let steps = [(0.0, 0.0), (0.0, 0.005), (0.0, 0.0001), (0.005, 0.0001)]
            .iter()
            .enumerate()
            .map(|(i, (lat, lon))| RouteStep {
                index: i,
                instruction: format!("S{}", i),
                maneuver_anchor: GeoPoint::new(*lat, *lon),
                cumulative_distance_m: i as f64 * 556.0,
                cumulative_duration_s: i as f64 * 55.6,
            })
            .collect();
        let plan = RoutePlan::new(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.01, 0.0),
            steps,
            2224.0,
            222.4,
            TravelMode::Driving,
        )
        .unwrap();
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = active_session(plan);

        let events = tracker.update(&mut session, &PositionSample::new(0.0, 0.0, 0));
        assert_eq!(session.active_step_index, 1);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, TrackerEvent::StepAdvanced { .. }))
                .collect::<Vec<_>>(),
            vec![&TrackerEvent::StepAdvanced {
                from: 0,
                to: 1,
                instruction: "S1".to_string(),
            }]
        );

        // Heading out along the first leg, still near the start.
        tracker.update(&mut session, &PositionSample::new(0.0, 0.0002, 1000));
        assert_eq!(session.active_step_index, 1);

        // Turn around at anchor 1, then come back past the start.
        tracker.update(&mut session, &PositionSample::new(0.0, 0.005, 2000));
        assert_eq!(session.active_step_index, 2);
        tracker.update(&mut session, &PositionSample::new(0.0, 0.0001, 3000));
        assert_eq!(session.active_step_index, 3);
    }

    #[test]
    fn test_pre_announce_fires_each_threshold_once() {
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = active_session(equator_plan(&[0.0, 0.01], 0.011));
        tracker.update(&mut session, &at(0.0));

        let upcoming = |events: Vec<TrackerEvent>| -> Vec<f64> {
            events
                .into_iter()
                .filter_map(|e| match e {
                    TrackerEvent::UpcomingManeuver { threshold_m, .. } => Some(threshold_m),
                    _ => None,
                })
                .collect()
        };

        // 89 m out
        assert_eq!(upcoming(tracker.update(&mut session, &at(0.0092))), vec![100.0]);
        // Same crossing again
        assert!(upcoming(tracker.update(&mut session, &at(0.0092))).is_empty());
        // 44 m out
        assert_eq!(upcoming(tracker.update(&mut session, &at(0.0096))), vec![50.0]);
        assert!(upcoming(tracker.update(&mut session, &at(0.0097))).is_empty());
    }

    #[test]
    fn test_single_update_crossing_both_fires_lowest() {
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = active_session(equator_plan(&[0.0, 0.01], 0.011));
        tracker.update(&mut session, &at(0.0));

        let events = tracker.update(&mut session, &at(0.0096));
        let fired: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TrackerEvent::UpcomingManeuver {
                    step_index,
                    threshold_m,
                    ..
                } => Some((*step_index, *threshold_m)),
                _ => None,
            })
            .collect();
        assert_eq!(fired, vec![(1, 50.0)]);

        let events = tracker.update(&mut session, &at(0.0093));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, TrackerEvent::UpcomingManeuver { .. }))
        );
    }

    #[test]
    fn test_eta_kept_when_slow() {
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = active_session(equator_plan(&[0.0, 0.01], 0.011));
        let initial = session.eta_s;
        assert_relative_eq!(initial, session.plan.total_duration_s());

        tracker.update(&mut session, &at(0.001).with_speed(10.0));
        let moving = session.eta_s;
        assert_relative_eq!(moving, 0.010 * 111_195.0 / 10.0, max_relative = 1e-3);

        let events = tracker.update(&mut session, &at(0.002).with_speed(0.2));
        assert_eq!(session.eta_s, moving);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, TrackerEvent::EtaUpdated { .. }))
        );

        tracker.update(&mut session, &at(0.003));
        assert_eq!(session.eta_s, moving);
    }

    #[test]
    fn test_accuracy_indicator() {
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = active_session(equator_plan(&[0.0, 0.01], 0.011));

        let events = tracker.update(&mut session, &at(0.001).with_accuracy(80.0));
        assert!(events.contains(&TrackerEvent::AccuracyChanged { degraded: true }));
        assert!(session.accuracy_degraded);

        let events = tracker.update(&mut session, &at(0.001));
        assert!(events.contains(&TrackerEvent::AccuracyChanged { degraded: false }));

        assert_eq!(
            tracker.position_lost(&mut session),
            Some(TrackerEvent::AccuracyChanged { degraded: true })
        );
        assert_eq!(tracker.position_lost(&mut session), None);
    }

    #[test]
    fn test_inactive_session_untouched() {
        let mut tracker = ProgressTracker::new(TrackerConfig::default());
        let mut session = NavigationSession::new(equator_plan(&[0.0, 0.001], 0.002));
        session.state = SessionState::Cancelled;

        assert!(tracker.update(&mut session, &at(0.0)).is_empty());
        assert_eq!(session.active_step_index, 0);
        assert!(session.last_sample.is_none());
    }
}
