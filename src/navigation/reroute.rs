//! Reroute monitor.
//!
//! Decides when to ask the directions provider for a fresh route:
//!
//! - **Interval**: every `check_interval_secs` while a session is active,
//!   a candidate from the current position is requested and compared against
//!   the remaining duration of the current plan
//! - **Deviation**: when the last `deviation_samples` samples all lie farther
//!   than `deviation_threshold_m` from the remaining route, a candidate is
//!   requested immediately
//!
//! At most one route request is outstanding. Every request carries a
//! [`RequestTicket`]; results whose ticket no longer matches (the plan was
//! replaced, the session ended) are discarded.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::{NavigationSession, RerouteReason, SessionState};
use crate::core::{BoundingBox, GeoPoint, distance_to_polyline_m};
use crate::position::{PositionHistory, PositionSample};
use crate::route::{DirectionsRequest, Incident, ProviderError, RoutePlan};
use crate::threads::DirectionsJob;

/// Configuration for rerouting.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RerouteConfig {
    /// Time between better-route checks (seconds)
    pub check_interval_secs: f64,
    /// Minimum time a candidate must save to be proposed (seconds)
    pub savings_threshold_secs: f64,
    /// Cross-track distance that counts as off route (meters)
    pub deviation_threshold_m: f64,
    /// Consecutive off-route samples needed to report a deviation
    pub deviation_samples: usize,
    /// Recent samples kept for deviation analysis
    pub history_len: usize,
    /// Samples less accurate than this are ignored for deviation (meters)
    pub max_sample_accuracy_m: f64,
    /// Replace the plan with the deviation candidate without asking
    pub auto_reroute_on_deviation: bool,
    /// Incidents this close to the remaining route are reported (meters)
    pub incident_radius_m: f64,
    /// Padding around the remaining route when querying incidents (meters)
    pub incident_padding_m: f64,
}

impl Default for RerouteConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30.0,
            savings_threshold_secs: 120.0,
            deviation_threshold_m: 75.0,
            deviation_samples: 3,
            history_len: 10,
            max_sample_accuracy_m: 50.0,
            auto_reroute_on_deviation: true,
            incident_radius_m: 200.0,
            incident_padding_m: 500.0,
        }
    }
}

/// Identifies one outstanding request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestTicket {
    /// Monitor generation at issue time; bumped on every re-arm
    pub generation: u64,
    /// Plan the request was made against
    pub plan_id: u64,
    pub reason: RerouteReason,
}

/// Interval, deviation and incident bookkeeping for one session.
pub struct RerouteMonitor {
    config: RerouteConfig,
    interval: Duration,
    history: PositionHistory,
    incidents_enabled: bool,

    armed: bool,
    next_check: Option<Instant>,
    last_check: Option<Instant>,
    generation: u64,
    outstanding_route: Option<RequestTicket>,
    outstanding_incidents: Option<RequestTicket>,

    off_route: bool,
    deviation_pending: bool,
    seen_incidents: HashSet<String>,
    failures: u64,
}

impl RerouteMonitor {
    /// Create a monitor. `incidents_enabled` turns on incident polling.
    pub fn new(config: RerouteConfig, incidents_enabled: bool) -> Self {
        let interval =
            Duration::try_from_secs_f64(config.check_interval_secs).unwrap_or(Duration::from_secs(30));
        let history = PositionHistory::new(config.history_len.max(config.deviation_samples));

        Self {
            config,
            interval,
            history,
            incidents_enabled,
            armed: false,
            next_check: None,
            last_check: None,
            generation: 0,
            outstanding_route: None,
            outstanding_incidents: None,
            off_route: false,
            deviation_pending: false,
            seen_incidents: HashSet::new(),
            failures: 0,
        }
    }

    pub fn config(&self) -> &RerouteConfig {
        &self.config
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Last time an interval check ran.
    pub fn last_check(&self) -> Option<Instant> {
        self.last_check
    }

    pub fn is_off_route(&self) -> bool {
        self.off_route
    }

    /// Route requests that failed since the monitor was created.
    pub fn failure_count(&self) -> u64 {
        self.failures
    }

    pub fn has_outstanding_route(&self) -> bool {
        self.outstanding_route.is_some()
    }

    /// Start monitoring a new session.
    pub fn arm(&mut self, now: Instant) {
        self.restart(now);
        self.armed = true;
        self.last_check = None;
        self.seen_incidents.clear();
        tracing::debug!(
            "Reroute monitor armed (every {:.0}s)",
            self.interval.as_secs_f64()
        );
    }

    /// Continue monitoring after the plan was replaced.
    ///
    /// Outstanding requests belong to the old plan and become stale.
    pub fn plan_replaced(&mut self, now: Instant) {
        if self.armed {
            self.restart(now);
        }
    }

    /// Stop monitoring. Outstanding requests become stale.
    pub fn disarm(&mut self) {
        if self.armed {
            tracing::debug!("Reroute monitor disarmed");
        }
        self.armed = false;
        self.next_check = None;
        self.generation += 1;
        self.outstanding_route = None;
        self.outstanding_incidents = None;
        self.deviation_pending = false;
        self.off_route = false;
        self.history.clear();
    }

    fn restart(&mut self, now: Instant) {
        self.generation += 1;
        self.next_check = Some(now + self.interval);
        self.outstanding_route = None;
        self.outstanding_incidents = None;
        self.deviation_pending = false;
        self.off_route = false;
        self.history.clear();
    }

    /// Feed a sample into deviation analysis.
    ///
    /// Returns the smallest off-route distance of the recent window when a
    /// deviation is newly detected.
    pub fn observe(
        &mut self,
        sample: &PositionSample,
        plan: &RoutePlan,
        active_step_index: usize,
    ) -> Option<f64> {
        if !self.armed {
            return None;
        }
        if sample.accuracy_m > self.config.max_sample_accuracy_m {
            tracing::trace!(
                "Ignoring {:.0}m sample for deviation check",
                sample.accuracy_m
            );
            return None;
        }
        self.history.push(*sample);

        let polyline = plan.remaining_polyline(active_step_index);
        let threshold = self.config.deviation_threshold_m;
        let latest = distance_to_polyline_m(&sample.point(), &polyline)?;
        if latest <= threshold {
            if self.off_route {
                tracing::info!("Back on route ({:.0}m)", latest);
                self.off_route = false;
            }
            return None;
        }
        if self.off_route || self.history.len() < self.config.deviation_samples {
            return None;
        }

        let mut nearest = f64::INFINITY;
        for s in self.history.recent(self.config.deviation_samples) {
            let d = distance_to_polyline_m(&s.point(), &polyline)?;
            if d <= threshold {
                return None;
            }
            nearest = nearest.min(d);
        }

        self.off_route = true;
        self.deviation_pending = true;
        tracing::warn!(
            "Off route: last {} samples at least {:.0}m from route",
            self.config.deviation_samples,
            nearest
        );
        Some(nearest)
    }

    /// Issue the requests that are due at `now`.
    pub fn poll(&mut self, now: Instant, session: &NavigationSession) -> Vec<DirectionsJob> {
        let mut jobs = Vec::new();
        if !self.armed || session.state != SessionState::Active {
            return jobs;
        }

        let due = self.next_check.is_some_and(|t| now >= t);
        if due {
            self.next_check = Some(now + self.interval);
            self.last_check = Some(now);
        }

        let plan = &session.plan;
        let reason = if self.deviation_pending {
            Some(RerouteReason::Deviation)
        } else if due {
            Some(RerouteReason::Periodic)
        } else {
            None
        };

        if let Some(reason) = reason
            && let Some(sample) = &session.last_sample
        {
            if let Some(ticket) = self.outstanding_route {
                tracing::debug!(
                    "Skipping {:?} check, request {:?} still outstanding",
                    reason,
                    ticket.reason
                );
            } else {
                let ticket = self.ticket(plan.id(), reason);
                self.outstanding_route = Some(ticket);
                self.deviation_pending = false;
                jobs.push(DirectionsJob::Route {
                    ticket,
                    request: DirectionsRequest::new(
                        sample.point(),
                        plan.destination(),
                        plan.mode(),
                    ),
                });
            }
        }

        if due && self.incidents_enabled && self.outstanding_incidents.is_none() {
            let polyline = plan.remaining_polyline(session.active_step_index);
            if let Some(bbox) = BoundingBox::around(&polyline) {
                let ticket = self.ticket(plan.id(), RerouteReason::Periodic);
                self.outstanding_incidents = Some(ticket);
                jobs.push(DirectionsJob::Incidents {
                    ticket,
                    bbox: bbox.padded(self.config.incident_padding_m),
                });
            }
        }

        jobs
    }

    fn ticket(&self, plan_id: u64, reason: RerouteReason) -> RequestTicket {
        RequestTicket {
            generation: self.generation,
            plan_id,
            reason,
        }
    }

    /// Accept a route result. Returns `false` for stale tickets.
    pub fn complete_route(&mut self, ticket: &RequestTicket) -> bool {
        if self.outstanding_route.as_ref() == Some(ticket) && ticket.generation == self.generation {
            self.outstanding_route = None;
            true
        } else {
            false
        }
    }

    /// Accept an incident result. Returns `false` for stale tickets.
    pub fn complete_incidents(&mut self, ticket: &RequestTicket) -> bool {
        if self.outstanding_incidents.as_ref() == Some(ticket)
            && ticket.generation == self.generation
        {
            self.outstanding_incidents = None;
            true
        } else {
            false
        }
    }

    /// Forget a request the worker never accepted.
    pub fn abandon(&mut self, ticket: &RequestTicket) {
        if self.outstanding_route.as_ref() == Some(ticket) {
            self.outstanding_route = None;
        }
        if self.outstanding_incidents.as_ref() == Some(ticket) {
            self.outstanding_incidents = None;
        }
    }

    /// Record a failed route request. The next interval retries.
    pub fn record_failure(&mut self, error: &ProviderError) {
        self.failures += 1;
        tracing::warn!(
            "Reroute request failed: {} (retrying in {:.0}s)",
            error,
            self.interval.as_secs_f64()
        );
    }

    /// Time a candidate saves over the current plan, if above the threshold.
    pub fn evaluate(&self, current_remaining_s: f64, candidate_duration_s: f64) -> Option<f64> {
        let savings = current_remaining_s - candidate_duration_s;
        if savings > self.config.savings_threshold_secs {
            Some(savings)
        } else {
            tracing::debug!(
                "Candidate saves {:.0}s (threshold {:.0}s), keeping current plan",
                savings,
                self.config.savings_threshold_secs
            );
            None
        }
    }

    /// Incidents near `route` that have not been reported yet.
    pub fn new_incidents(&mut self, incidents: Vec<Incident>, route: &[GeoPoint]) -> Vec<Incident> {
        let radius = self.config.incident_radius_m;
        incidents
            .into_iter()
            .filter(|i| {
                distance_to_polyline_m(&i.location, route).is_some_and(|d| d <= radius)
            })
            .filter(|i| self.seen_incidents.insert(i.id.clone()))
            .collect()
    }
}
