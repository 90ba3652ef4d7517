//! Navigation session and its controller.
//!
//! The [`SessionController`] owns every per-session component and is the
//! only writer of [`NavigationSession::state`]. It is driven from one
//! thread: position updates, loop ticks ([`SessionController::pump`]) and
//! user commands are processed one at a time, so no session field needs a
//! lock.

use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

use super::{
    ProgressReport, ProgressTracker, RequestTicket, RerouteMonitor, RerouteReason, SessionEvent,
    SessionState, TrackerEvent,
};
use crate::announce::{
    Announcement, AnnouncementDispatcher, AnnouncementKind, SpeechPort, text,
};
use crate::config::MargaConfig;
use crate::error::{NavError, Result};
use crate::position::{
    PositionError, PositionSample, PositionSource, PositionUpdate, PositionWatch, WatchOptions,
};
use crate::route::{DirectionsRequest, RoutePlan, RouteStep};
use crate::threads::{DirectionsWorker, JobResult};

/// State of one navigation run.
///
/// Position-derived fields are written by the tracker, `state` by the
/// controller.
#[derive(Debug, Clone)]
pub struct NavigationSession {
    pub(super) plan: RoutePlan,
    pub(super) active_step_index: usize,
    pub(super) state: SessionState,
    pub(super) last_sample: Option<PositionSample>,
    pub(super) last_reroute_check: Option<Instant>,
    pub(super) eta_s: f64,
    pub(super) distance_to_next_m: Option<f64>,
    pub(super) distance_to_destination_m: Option<f64>,
    pub(super) accuracy_degraded: bool,
}

impl NavigationSession {
    pub(super) fn new(plan: RoutePlan) -> Self {
        let eta_s = plan.total_duration_s();
        Self {
            plan,
            active_step_index: 0,
            state: SessionState::Idle,
            last_sample: None,
            last_reroute_check: None,
            eta_s,
            distance_to_next_m: None,
            distance_to_destination_m: None,
            accuracy_degraded: false,
        }
    }

    /// Swap in a new plan and restart progress on it.
    pub(super) fn replace_plan(&mut self, plan: RoutePlan) {
        self.eta_s = plan.total_duration_s();
        self.plan = plan;
        self.active_step_index = 0;
        self.distance_to_next_m = None;
        self.distance_to_destination_m = None;
    }

    pub fn plan(&self) -> &RoutePlan {
        &self.plan
    }

    pub fn active_step_index(&self) -> usize {
        self.active_step_index
    }

    pub fn current_step(&self) -> Option<&RouteStep> {
        self.plan.step(self.active_step_index)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_sample(&self) -> Option<&PositionSample> {
        self.last_sample.as_ref()
    }

    pub fn last_reroute_check(&self) -> Option<Instant> {
        self.last_reroute_check
    }

    /// Seconds to the destination.
    pub fn eta_s(&self) -> f64 {
        self.eta_s
    }

    pub fn distance_to_next_m(&self) -> Option<f64> {
        self.distance_to_next_m
    }

    pub fn distance_to_destination_m(&self) -> Option<f64> {
        self.distance_to_destination_m
    }

    pub fn accuracy_degraded(&self) -> bool {
        self.accuracy_degraded
    }

    /// Estimated time left on the current plan.
    pub fn remaining_duration_s(&self) -> f64 {
        self.plan.remaining_duration_s(
            self.active_step_index,
            self.distance_to_next_m.unwrap_or(0.0),
        )
    }

    fn progress_report(&self) -> ProgressReport {
        ProgressReport {
            plan_id: self.plan.id(),
            active_step_index: self.active_step_index,
            distance_to_next_m: self.distance_to_next_m.unwrap_or(0.0),
            distance_to_destination_m: self.distance_to_destination_m.unwrap_or(0.0),
            eta_s: self.eta_s,
            accuracy_degraded: self.accuracy_degraded,
        }
    }
}

/// Candidate plan waiting for the user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProposalSummary {
    pub plan_id: u64,
    pub duration_s: f64,
    pub savings_s: f64,
}

/// Read-only view of the controller for UI layers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub plan_id: Option<u64>,
    pub step_count: usize,
    pub active_step_index: Option<usize>,
    pub current_instruction: Option<String>,
    pub distance_to_next_m: Option<f64>,
    pub distance_to_destination_m: Option<f64>,
    pub eta_s: Option<f64>,
    pub accuracy_degraded: bool,
    pub muted: bool,
    pub pending_proposal: Option<ProposalSummary>,
}

struct Proposal {
    plan: RoutePlan,
    savings_s: f64,
    reason: RerouteReason,
}

/// Lifecycle owner: `Idle -> Active -> {Arrived, Cancelled, Failed}`.
pub struct SessionController {
    source: Box<dyn PositionSource>,
    watch_options: WatchOptions,
    watch: Option<PositionWatch>,
    worker: DirectionsWorker,
    tracker: ProgressTracker,
    monitor: RerouteMonitor,
    dispatcher: AnnouncementDispatcher,
    session: Option<NavigationSession>,
    proposal: Option<Proposal>,
    subscribers: Vec<Sender<SessionEvent>>,
}

impl SessionController {
    /// Create a controller with configuration.
    pub fn new(
        source: Box<dyn PositionSource>,
        speech: Box<dyn SpeechPort>,
        worker: DirectionsWorker,
        config: &MargaConfig,
    ) -> Self {
        let incidents_enabled = worker.has_traffic();
        Self {
            source,
            watch_options: config.position.clone(),
            watch: None,
            worker,
            tracker: ProgressTracker::new(config.tracker.clone()),
            monitor: RerouteMonitor::new(config.reroute.clone(), incidents_enabled),
            dispatcher: AnnouncementDispatcher::new(speech, &config.announce),
            session: None,
            proposal: None,
            subscribers: Vec::new(),
        }
    }

    /// Current lifecycle state (`Idle` before the first start).
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state)
    }

    pub fn session(&self) -> Option<&NavigationSession> {
        self.session.as_ref()
    }

    /// Receive every event from now on.
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Ask the provider for the plan to start with.
    ///
    /// Unlike reroute requests this blocks; there is nothing to navigate
    /// until it returns, and a provider error is returned to the caller.
    pub fn fetch_initial_plan(&self, request: &DirectionsRequest) -> Result<RoutePlan> {
        let plan = self.worker.route_blocking(request)?;
        tracing::info!(
            "Initial plan {}: {} steps, {:.0}m, {:.0}s",
            plan.id(),
            plan.steps().len(),
            plan.total_distance_m(),
            plan.total_duration_s()
        );
        Ok(plan)
    }

    /// Start navigating `plan`.
    pub fn start(&mut self, plan: RoutePlan) -> Result<()> {
        self.start_at(plan, Instant::now())
    }

    /// Start navigating `plan` with `now` as the loop clock.
    ///
    /// A plan without steps is rejected and leaves the controller untouched.
    /// An active session is cancelled first. Updates already queued by the
    /// source are processed before returning; a permission refusal among
    /// them (before any sample) fails the new session and is returned.
    pub fn start_at(&mut self, plan: RoutePlan, now: Instant) -> Result<()> {
        if plan.steps().is_empty() {
            tracing::warn!("Refusing to start plan {} without steps", plan.id());
            return Err(NavError::InvalidPlan("plan has no steps".to_string()));
        }
        if self.state() == SessionState::Active {
            tracing::info!("Restarting navigation, cancelling current session");
            self.cancel()?;
        }

        let previous = self.state();
        self.tracker.reset();
        self.dispatcher.reset();
        self.proposal = None;

        let mut session = NavigationSession::new(plan);
        let mut watch = match self.source.watch(&self.watch_options) {
            Ok(watch) => watch,
            Err(PositionError::PermissionDenied) => {
                self.session = Some(session);
                self.fail_from(previous, "Location permission denied");
                return Err(NavError::PermissionDenied);
            }
            Err(e) => {
                tracing::warn!("Position subscription failed: {}", e);
                return Err(e.into());
            }
        };

        let mut queued = Vec::new();
        while let Some(update) = watch.try_next() {
            let before_first_sample = !queued
                .iter()
                .any(|u| matches!(u, PositionUpdate::Sample(_)));
            if update == PositionUpdate::Error(PositionError::PermissionDenied)
                && before_first_sample
            {
                watch.unsubscribe();
                self.session = Some(session);
                self.fail_from(previous, "Location permission denied");
                return Err(NavError::PermissionDenied);
            }
            queued.push(update);
        }

        session.state = SessionState::Active;
        let plan_id = session.plan.id();
        let first_instruction = session.plan.steps().first().map(|s| s.instruction.clone());
        tracing::info!(
            "Navigation started: plan {} ({} steps, {:.0}m, {:.0}s, {})",
            plan_id,
            session.plan.steps().len(),
            session.plan.total_distance_m(),
            session.plan.total_duration_s(),
            session.plan.mode().as_str()
        );
        self.session = Some(session);
        self.watch = Some(watch);
        self.monitor.arm(now);
        self.emit(SessionEvent::StateChanged {
            from: previous,
            to: SessionState::Active,
        });
        if let Some(instruction) = first_instruction {
            self.announce(Announcement::new(
                plan_id,
                Some(0),
                AnnouncementKind::Instruction,
                instruction,
            ));
        }

        for update in queued {
            self.handle_update(update);
        }
        Ok(())
    }

    /// Stop navigating.
    ///
    /// Returns once the position watch is unsubscribed and the monitor is
    /// disarmed; later results for this session are discarded. Cancelling a
    /// cancelled session is a no-op.
    pub fn cancel(&mut self) -> Result<()> {
        match self.state() {
            SessionState::Active => {
                self.finish(SessionState::Cancelled);
                Ok(())
            }
            SessionState::Cancelled => Ok(()),
            _ => Err(NavError::NotActive),
        }
    }

    /// Process one position update. Ignored unless a session is active.
    pub fn handle_update(&mut self, update: PositionUpdate) {
        if self.state() != SessionState::Active {
            tracing::trace!("Ignoring position update outside an active session");
            return;
        }
        match update {
            PositionUpdate::Sample(sample) => self.process_sample(sample),
            PositionUpdate::Error(PositionError::PermissionDenied) => {
                self.fail("Location permission revoked");
            }
            PositionUpdate::Error(e) => {
                tracing::debug!("Position error: {}", e);
                let lost = self
                    .session
                    .as_mut()
                    .and_then(|session| self.tracker.position_lost(session));
                if let Some(event) = lost {
                    self.apply_tracker_events(vec![event]);
                }
            }
        }
    }

    /// One event-loop turn.
    ///
    /// Drains queued position updates in arrival order, issues due reroute
    /// and incident requests, handles finished requests and lets the
    /// dispatcher speak a pending announcement.
    pub fn pump(&mut self, now: Instant) {
        while self.state() == SessionState::Active {
            let Some(update) = self.watch.as_mut().and_then(|w| w.try_next()) else {
                break;
            };
            self.handle_update(update);
        }

        if self.state() == SessionState::Active
            && let Some(session) = &self.session
        {
            for job in self.monitor.poll(now, session) {
                let ticket = *job.ticket();
                if !self.worker.submit(job) {
                    tracing::warn!("Directions worker unavailable, dropping {:?} request", ticket.reason);
                    self.monitor.abandon(&ticket);
                }
            }
            let last_check = self.monitor.last_check();
            if let Some(session) = self.session.as_mut() {
                session.last_reroute_check = last_check;
            }
        }

        while let Some(result) = self.worker.try_result() {
            self.handle_result(result, now);
        }

        self.dispatcher.pump();
    }

    /// Replace the plan with the pending candidate.
    pub fn accept_proposal(&mut self) -> Result<()> {
        self.accept_proposal_at(Instant::now())
    }

    pub fn accept_proposal_at(&mut self, now: Instant) -> Result<()> {
        if self.state() != SessionState::Active {
            return Err(NavError::NotActive);
        }
        let proposal = self.proposal.take().ok_or(NavError::NoPendingProposal)?;
        tracing::info!(
            "Accepted plan {} (saves {:.0}s)",
            proposal.plan.id(),
            proposal.savings_s
        );
        self.replace_plan(proposal.plan, proposal.reason, now);
        Ok(())
    }

    /// Drop the pending candidate.
    pub fn dismiss_proposal(&mut self) -> Result<()> {
        let proposal = self.proposal.take().ok_or(NavError::NoPendingProposal)?;
        tracing::info!("Dismissed plan {}", proposal.plan.id());
        Ok(())
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.dispatcher.set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.dispatcher.is_muted()
    }

    pub fn dispatcher(&self) -> &AnnouncementDispatcher {
        &self.dispatcher
    }

    pub fn monitor(&self) -> &RerouteMonitor {
        &self.monitor
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let pending_proposal = self.proposal.as_ref().map(|p| ProposalSummary {
            plan_id: p.plan.id(),
            duration_s: p.plan.total_duration_s(),
            savings_s: p.savings_s,
        });
        let muted = self.dispatcher.is_muted();

        match &self.session {
            None => SessionSnapshot {
                state: SessionState::Idle,
                plan_id: None,
                step_count: 0,
                active_step_index: None,
                current_instruction: None,
                distance_to_next_m: None,
                distance_to_destination_m: None,
                eta_s: None,
                accuracy_degraded: false,
                muted,
                pending_proposal,
            },
            Some(s) => SessionSnapshot {
                state: s.state,
                plan_id: Some(s.plan.id()),
                step_count: s.plan.steps().len(),
                active_step_index: Some(s.active_step_index),
                current_instruction: s.current_step().map(|step| step.instruction.clone()),
                distance_to_next_m: s.distance_to_next_m,
                distance_to_destination_m: s.distance_to_destination_m,
                eta_s: Some(s.eta_s),
                accuracy_degraded: s.accuracy_degraded,
                muted,
                pending_proposal,
            },
        }
    }

    fn process_sample(&mut self, sample: PositionSample) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let events = self.tracker.update(session, &sample);
        let deviation = if self.tracker.has_arrived() {
            None
        } else {
            self.monitor
                .observe(&sample, &session.plan, session.active_step_index)
        };
        let report = session.progress_report();
        let plan_id = report.plan_id;

        let arrived = self.apply_tracker_events(events);
        self.emit(SessionEvent::Progress(report));

        if let Some(distance_m) = deviation {
            self.emit(SessionEvent::OffRoute { distance_m });
            self.announce(Announcement::new(
                plan_id,
                None,
                AnnouncementKind::OffRoute,
                text::off_route(),
            ));
        }
        if arrived {
            self.finish(SessionState::Arrived);
        }
    }

    /// Publish tracker events. Returns `true` on arrival.
    fn apply_tracker_events(&mut self, events: Vec<TrackerEvent>) -> bool {
        let Some(plan_id) = self.session.as_ref().map(|s| s.plan.id()) else {
            return false;
        };
        let mut arrived = false;
        for event in events {
            match event {
                TrackerEvent::AccuracyChanged { degraded } => {
                    self.emit(SessionEvent::AccuracyDegraded { degraded });
                }
                TrackerEvent::StepAdvanced {
                    from,
                    to,
                    instruction,
                } => {
                    self.emit(SessionEvent::StepAdvanced {
                        from,
                        to,
                        instruction: instruction.clone(),
                    });
                    self.announce(Announcement::new(
                        plan_id,
                        Some(to),
                        AnnouncementKind::Instruction,
                        instruction,
                    ));
                }
                TrackerEvent::UpcomingManeuver {
                    step_index,
                    instruction,
                    threshold_m,
                    ..
                } => {
                    self.announce(Announcement::new(
                        plan_id,
                        Some(step_index),
                        AnnouncementKind::Maneuver,
                        text::maneuver(threshold_m, &instruction),
                    ));
                }
                TrackerEvent::EtaUpdated { eta_s } => {
                    tracing::trace!("ETA {:.0}s", eta_s);
                }
                TrackerEvent::Arrived { .. } => {
                    self.announce(Announcement::new(
                        plan_id,
                        None,
                        AnnouncementKind::Arrival,
                        text::arrival(),
                    ));
                    arrived = true;
                }
            }
        }
        arrived
    }

    fn handle_result(&mut self, result: JobResult, now: Instant) {
        match result {
            JobResult::Route { ticket, result } => {
                if !self.monitor.complete_route(&ticket) || !self.is_current(&ticket) {
                    tracing::debug!("Discarding stale route result for plan {}", ticket.plan_id);
                    return;
                }
                match result {
                    Ok(candidate) => self.consider_candidate(candidate, ticket.reason, now),
                    Err(e) => self.monitor.record_failure(&e),
                }
            }
            JobResult::Incidents { ticket, result } => {
                if !self.monitor.complete_incidents(&ticket) || !self.is_current(&ticket) {
                    tracing::debug!("Discarding stale incident result for plan {}", ticket.plan_id);
                    return;
                }
                let incidents = match result {
                    Ok(incidents) => incidents,
                    Err(e) => {
                        tracing::warn!("Traffic feed failed: {}", e);
                        return;
                    }
                };
                let Some(session) = self.session.as_ref() else {
                    return;
                };
                let plan_id = session.plan.id();
                let active = session.active_step_index;
                let route = session.plan.remaining_polyline(active);
                for incident in self.monitor.new_incidents(incidents, &route) {
                    tracing::warn!("Incident ahead: {} ({:?})", incident.description, incident.severity);
                    let announcement = Announcement::new(
                        plan_id,
                        Some(active),
                        AnnouncementKind::Incident,
                        text::incident(&incident.description),
                    );
                    self.emit(SessionEvent::IncidentAhead(incident));
                    self.announce(announcement);
                }
            }
        }
    }

    /// Whether a result was requested for the plan being navigated now.
    fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.session.as_ref().is_some_and(|s| {
            s.state == SessionState::Active && s.plan.id() == ticket.plan_id
        })
    }

    fn consider_candidate(&mut self, candidate: RoutePlan, reason: RerouteReason, now: Instant) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if candidate.steps().is_empty() {
            tracing::warn!("Ignoring candidate plan {} without steps", candidate.id());
            return;
        }
        let remaining = session.remaining_duration_s();

        match reason {
            RerouteReason::Deviation if self.monitor.config().auto_reroute_on_deviation => {
                self.replace_plan(candidate, reason, now);
            }
            RerouteReason::Deviation => {
                let savings = remaining - candidate.total_duration_s();
                self.propose(candidate, savings, reason);
            }
            RerouteReason::Periodic => {
                if let Some(savings) = self.monitor.evaluate(remaining, candidate.total_duration_s()) {
                    self.propose(candidate, savings, reason);
                }
            }
        }
    }

    fn propose(&mut self, candidate: RoutePlan, savings_s: f64, reason: RerouteReason) {
        let Some(plan_id) = self.session.as_ref().map(|s| s.plan.id()) else {
            return;
        };
        match reason {
            RerouteReason::Periodic => {
                tracing::info!(
                    "Better route available: plan {} saves {:.0}s",
                    candidate.id(),
                    savings_s
                );
                self.emit(SessionEvent::BetterRouteAvailable {
                    plan_id,
                    candidate_plan_id: candidate.id(),
                    candidate_duration_s: candidate.total_duration_s(),
                    savings_s,
                });
                self.announce(Announcement::new(
                    plan_id,
                    None,
                    AnnouncementKind::BetterRoute,
                    text::better_route(savings_s),
                ));
            }
            RerouteReason::Deviation => {
                tracing::info!(
                    "Reroute proposed: plan {} ({:+.0}s against current)",
                    candidate.id(),
                    savings_s
                );
                self.emit(SessionEvent::RerouteProposed {
                    plan_id,
                    candidate_plan_id: candidate.id(),
                    candidate_duration_s: candidate.total_duration_s(),
                    savings_s,
                    reason,
                });
            }
        }
        self.proposal = Some(Proposal {
            plan: candidate,
            savings_s,
            reason,
        });
    }

    fn replace_plan(&mut self, plan: RoutePlan, reason: RerouteReason, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let old_plan_id = session.plan.id();
        let plan_id = plan.id();
        let first_instruction = plan.steps().first().map(|s| s.instruction.clone());
        session.replace_plan(plan);
        self.monitor.plan_replaced(now);
        self.proposal = None;

        tracing::info!("Rerouted: plan {} -> {} ({:?})", old_plan_id, plan_id, reason);
        self.emit(SessionEvent::Rerouted {
            old_plan_id,
            plan_id,
            reason,
        });
        self.announce(Announcement::new(
            plan_id,
            None,
            AnnouncementKind::Rerouted,
            text::rerouted(),
        ));
        if let Some(instruction) = first_instruction {
            self.announce(Announcement::new(
                plan_id,
                Some(0),
                AnnouncementKind::Instruction,
                instruction,
            ));
        }
    }

    /// Tear down an active session and move it to a terminal state.
    fn finish(&mut self, to: SessionState) {
        if let Some(mut watch) = self.watch.take() {
            watch.unsubscribe();
        }
        self.monitor.disarm();
        self.proposal = None;
        if to != SessionState::Arrived {
            self.dispatcher.clear_pending();
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let from = session.state;
        session.state = to;
        tracing::info!("Session {} -> {} (plan {})", from, to, session.plan.id());
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn fail(&mut self, message: &str) {
        let from = self.state();
        self.fail_from(from, message);
    }

    fn fail_from(&mut self, from: SessionState, message: &str) {
        if let Some(mut watch) = self.watch.take() {
            watch.unsubscribe();
        }
        self.monitor.disarm();
        self.proposal = None;
        self.dispatcher.clear_pending();
        if let Some(session) = self.session.as_mut() {
            session.state = SessionState::Failed;
        }

        tracing::error!("Navigation failed: {}", message);
        self.emit(SessionEvent::StateChanged {
            from,
            to: SessionState::Failed,
        });
        self.emit(SessionEvent::Failed {
            message: message.to_string(),
        });
    }

    fn announce(&mut self, announcement: Announcement) {
        if let Some(notice) = self.dispatcher.announce(announcement) {
            self.emit(SessionEvent::Announcement(notice));
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
