//! Navigation thread: the single event loop that owns the session.
//!
//! Each turn waits up to one tick for a [`NavCommand`], handles it, then
//! pumps the controller (position updates, reroute checks, request results,
//! pending speech). Everything that touches session state happens here.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::{NavError, Result};
use crate::navigation::{SessionController, SessionEvent, SessionSnapshot, SessionState};
use crate::route::RoutePlan;

/// Commands accepted by the navigation loop.
pub enum NavCommand {
    Start {
        plan: RoutePlan,
        reply: Sender<Result<()>>,
    },
    Cancel {
        reply: Sender<Result<()>>,
    },
    AcceptProposal {
        reply: Sender<Result<()>>,
    },
    DismissProposal {
        reply: Sender<Result<()>>,
    },
    SetMuted(bool),
    Snapshot {
        reply: Sender<SessionSnapshot>,
    },
    Subscribe {
        reply: Sender<Receiver<SessionEvent>>,
    },
    Shutdown,
}

/// Event loop state and logic.
pub struct NavigationThread {
    controller: SessionController,
    commands: Receiver<NavCommand>,
    tick: Duration,
}

impl NavigationThread {
    pub fn new(controller: SessionController, commands: Receiver<NavCommand>, tick: Duration) -> Self {
        Self {
            controller,
            commands,
            tick,
        }
    }

    /// Move `controller` onto a new thread and return its handle.
    pub fn spawn(controller: SessionController, tick: Duration) -> Result<NavigationHandle> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("navigation".into())
            .spawn(move || {
                let mut nav_thread = NavigationThread::new(controller, rx, tick);
                nav_thread.run();
            })?;

        Ok(NavigationHandle {
            commands: tx,
            handle: Some(handle),
        })
    }

    /// Run the loop until `Shutdown` or every handle is dropped.
    pub fn run(&mut self) {
        tracing::info!(
            "Navigation thread started (tick {}ms)",
            self.tick.as_millis()
        );

        loop {
            match self.commands.recv_timeout(self.tick) {
                Ok(NavCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }
            self.controller.pump(Instant::now());
        }

        if self.controller.state() == SessionState::Active
            && let Err(e) = self.controller.cancel()
        {
            tracing::warn!("Cancel on shutdown failed: {}", e);
        }
        tracing::info!("Navigation thread shutting down");
    }

    fn handle(&mut self, command: NavCommand) {
        match command {
            NavCommand::Start { plan, reply } => {
                reply.send(self.controller.start(plan)).ok();
            }
            NavCommand::Cancel { reply } => {
                reply.send(self.controller.cancel()).ok();
            }
            NavCommand::AcceptProposal { reply } => {
                reply.send(self.controller.accept_proposal()).ok();
            }
            NavCommand::DismissProposal { reply } => {
                reply.send(self.controller.dismiss_proposal()).ok();
            }
            NavCommand::SetMuted(muted) => self.controller.set_muted(muted),
            NavCommand::Snapshot { reply } => {
                reply.send(self.controller.snapshot()).ok();
            }
            NavCommand::Subscribe { reply } => {
                reply.send(self.controller.subscribe()).ok();
            }
            NavCommand::Shutdown => {}
        }
    }
}

/// Caller side of the navigation thread.
pub struct NavigationHandle {
    commands: Sender<NavCommand>,
    handle: Option<JoinHandle<()>>,
}

impl NavigationHandle {
    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> NavCommand) -> Result<T> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(make(tx))
            .map_err(|_| NavError::LoopStopped)?;
        rx.recv().map_err(|_| NavError::LoopStopped)
    }

    pub fn start(&self, plan: RoutePlan) -> Result<()> {
        self.request(|reply| NavCommand::Start { plan, reply })?
    }

    pub fn cancel(&self) -> Result<()> {
        self.request(|reply| NavCommand::Cancel { reply })?
    }

    pub fn accept_proposal(&self) -> Result<()> {
        self.request(|reply| NavCommand::AcceptProposal { reply })?
    }

    pub fn dismiss_proposal(&self) -> Result<()> {
        self.request(|reply| NavCommand::DismissProposal { reply })?
    }

    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.commands
            .send(NavCommand::SetMuted(muted))
            .map_err(|_| NavError::LoopStopped)
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| NavCommand::Snapshot { reply })
    }

    pub fn subscribe(&self) -> Result<Receiver<SessionEvent>> {
        self.request(|reply| NavCommand::Subscribe { reply })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Stop the loop and wait for it. Cancels an active session.
    pub fn shutdown(&mut self) {
        self.commands.send(NavCommand::Shutdown).ok();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("Navigation thread panicked");
        }
    }
}

impl Drop for NavigationHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::MockSpeech;
    use crate::config::MargaConfig;
    use crate::core::GeoPoint;
    use crate::position::{PositionSample, ScriptedPositionSource};
    use crate::route::{DirectionsRequest, DirectionsProvider, StraightLineProvider, TravelMode};
    use crate::threads::DirectionsWorker;
    use std::sync::Arc;

    fn spawn(source: &ScriptedPositionSource) -> NavigationHandle {
        let worker = DirectionsWorker::inline(Arc::new(StraightLineProvider::new()), None);
        let controller = SessionController::new(
            Box::new(source.clone()),
            Box::new(MockSpeech::new()),
            worker,
            &MargaConfig::default(),
        );
        NavigationThread::spawn(controller, Duration::from_millis(5)).unwrap()
    }

    fn plan() -> RoutePlan {
        StraightLineProvider::new()
            .route(&DirectionsRequest::new(
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(0.0, 0.002),
                TravelMode::Walking,
            ))
            .unwrap()
    }

    fn wait_for_state(events: &Receiver<SessionEvent>, state: SessionState) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match events.recv_timeout(left) {
                Ok(SessionEvent::StateChanged { to, .. }) if to == state => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }

    #[test]
    fn test_loop_drives_session_to_arrival() {
        let source = ScriptedPositionSource::new();
        let handle = spawn(&source);
        let events = handle.subscribe().unwrap();

        handle.start(plan()).unwrap();
        assert_eq!(handle.snapshot().unwrap().state, SessionState::Active);

        source.push_sample(PositionSample::new(0.0, 0.0, 0));
        source.push_sample(PositionSample::new(0.0, 0.0019, 1000));

        assert!(wait_for_state(&events, SessionState::Arrived));
        assert_eq!(handle.snapshot().unwrap().state, SessionState::Arrived);
        assert_eq!(source.active_watches(), 0);
    }

    #[test]
    fn test_commands_report_errors() {
        let source = ScriptedPositionSource::new();
        let handle = spawn(&source);

        assert!(matches!(handle.cancel(), Err(NavError::NotActive)));
        handle.start(plan()).unwrap();
        assert!(matches!(
            handle.accept_proposal(),
            Err(NavError::NoPendingProposal)
        ));
        handle.set_muted(true).unwrap();
        assert!(handle.snapshot().unwrap().muted);

        handle.cancel().unwrap();
        handle.cancel().unwrap();
        assert_eq!(handle.snapshot().unwrap().state, SessionState::Cancelled);
    }

    #[test]
    fn test_shutdown_cancels_active_session() {
        let source = ScriptedPositionSource::new();
        let mut handle = spawn(&source);
        handle.start(plan()).unwrap();
        assert_eq!(source.active_watches(), 1);

        handle.shutdown();
        assert!(handle.is_finished());
        assert_eq!(source.active_watches(), 0);
        assert!(matches!(handle.snapshot(), Err(NavError::LoopStopped)));
    }
}
