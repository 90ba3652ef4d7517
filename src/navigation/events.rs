//! Session states and the events raised while navigating.

use serde::Serialize;

use crate::announce::Notice;
use crate::route::Incident;

/// Lifecycle of a navigation session.
///
/// Transitions only move forward: `Idle -> Active -> {Arrived, Cancelled, Failed}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session has been started
    #[default]
    Idle,
    /// Following a plan
    Active,
    /// Destination reached
    Arrived,
    /// Stopped by the user
    Cancelled,
    /// Stopped by an unrecoverable position error
    Failed,
}

impl SessionState {
    /// Arrived, Cancelled and Failed sessions never become Active again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Arrived | SessionState::Cancelled | SessionState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Arrived => "arrived",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a plan was replaced or a candidate requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RerouteReason {
    /// Interval check found a faster route
    Periodic,
    /// Recent samples left the route
    Deviation,
}

/// Output of one [`ProgressTracker::update`](super::ProgressTracker::update).
#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    /// Accuracy indicator flipped
    AccuracyChanged { degraded: bool },
    /// Active step moved forward (possibly by more than one)
    StepAdvanced {
        from: usize,
        to: usize,
        instruction: String,
    },
    /// Distance to the active maneuver crossed a pre-announce threshold
    UpcomingManeuver {
        step_index: usize,
        instruction: String,
        threshold_m: f64,
        distance_m: f64,
    },
    /// ETA recomputed from the sample speed
    EtaUpdated { eta_s: f64 },
    /// Within the arrival radius (raised once per session)
    Arrived { distance_m: f64 },
}

/// Position-derived progress, published after every processed sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressReport {
    pub plan_id: u64,
    pub active_step_index: usize,
    pub distance_to_next_m: f64,
    pub distance_to_destination_m: f64,
    pub eta_s: f64,
    pub accuracy_degraded: bool,
}

/// Event delivered to [`SessionController`](super::SessionController) subscribers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Progress(ProgressReport),
    StepAdvanced {
        from: usize,
        to: usize,
        instruction: String,
    },
    Announcement(Notice),
    /// A candidate beating the savings threshold is waiting for `accept_proposal`
    BetterRouteAvailable {
        plan_id: u64,
        candidate_plan_id: u64,
        candidate_duration_s: f64,
        savings_s: f64,
    },
    /// An off-route candidate is waiting for `accept_proposal`.
    /// `savings_s` is negative when the candidate is slower.
    RerouteProposed {
        plan_id: u64,
        candidate_plan_id: u64,
        candidate_duration_s: f64,
        savings_s: f64,
        reason: RerouteReason,
    },
    Rerouted {
        old_plan_id: u64,
        plan_id: u64,
        reason: RerouteReason,
    },
    OffRoute {
        distance_m: f64,
    },
    IncidentAhead(Incident),
    AccuracyDegraded {
        degraded: bool,
    },
    /// Session ended in [`SessionState::Failed`]
    Failed {
        message: String,
    },
}
