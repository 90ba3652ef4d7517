//! Announcement dispatcher.
//!
//! Every announcement produces a [`Notice`] for visual/log consumers and,
//! unless muted, an utterance on the [`SpeechPort`]:
//!
//! - Content already announced for the same step of the same plan is a no-op
//! - While the port is speaking, at most one announcement waits; a newer one
//!   replaces it
//! - Speech failures are logged and counted, never propagated

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::SpeechPort;
use crate::error::NavError;

/// Configuration for announcements.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    /// Start with speech muted
    pub muted: bool,
    /// Speaking rate used by the log speech port
    pub words_per_minute: u32,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            muted: false,
            words_per_minute: 160,
        }
    }
}

/// What an announcement is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementKind {
    /// Upcoming maneuver at a pre-announce distance
    Maneuver,
    /// Instruction of a newly active step
    Instruction,
    Arrival,
    BetterRoute,
    Rerouted,
    OffRoute,
    Incident,
}

/// Announcement request.
#[derive(Clone, Debug, PartialEq)]
pub struct Announcement {
    pub plan_id: u64,
    /// Step the announcement refers to, if any
    pub step_index: Option<usize>,
    pub kind: AnnouncementKind,
    pub text: String,
}

impl Announcement {
    pub fn new(
        plan_id: u64,
        step_index: Option<usize>,
        kind: AnnouncementKind,
        text: impl Into<String>,
    ) -> Self {
        Self {
            plan_id,
            step_index,
            kind,
            text: text.into(),
        }
    }
}

/// Visual/log record of an announcement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notice {
    pub plan_id: u64,
    pub step_index: Option<usize>,
    pub kind: AnnouncementKind,
    pub text: String,
    /// Speech was suppressed
    pub muted: bool,
}

type DedupKey = (u64, Option<usize>, String);

/// Turns announcements into notices and speech.
pub struct AnnouncementDispatcher {
    speech: Box<dyn SpeechPort>,
    muted: bool,
    announced: HashSet<DedupKey>,
    pending: Option<Announcement>,
    spoken: u64,
    dropped: u64,
    failures: u64,
}

impl AnnouncementDispatcher {
    pub fn new(speech: Box<dyn SpeechPort>, config: &AnnounceConfig) -> Self {
        Self {
            speech,
            muted: config.muted,
            announced: HashSet::new(),
            pending: None,
            spoken: 0,
            dropped: 0,
            failures: 0,
        }
    }

    /// Announce, returning the notice to publish or `None` for a repeat.
    pub fn announce(&mut self, announcement: Announcement) -> Option<Notice> {
        let key = (
            announcement.plan_id,
            announcement.step_index,
            announcement.text.clone(),
        );
        if !self.announced.insert(key) {
            tracing::debug!("Suppressed repeat announcement: {}", announcement.text);
            return None;
        }

        let notice = Notice {
            plan_id: announcement.plan_id,
            step_index: announcement.step_index,
            kind: announcement.kind,
            text: announcement.text.clone(),
            muted: self.muted,
        };

        if !self.muted {
            if let Some(dropped) = self.pending.take() {
                self.dropped += 1;
                tracing::debug!("Dropped pending announcement: {}", dropped.text);
            }
            if self.speech.is_speaking() {
                self.pending = Some(announcement);
            } else {
                self.speak(&announcement);
            }
        }

        Some(notice)
    }

    /// Speak the pending announcement once the port is idle.
    pub fn pump(&mut self) {
        if self.muted || self.speech.is_speaking() {
            return;
        }
        if let Some(next) = self.pending.take() {
            self.speak(&next);
        }
    }

    fn speak(&mut self, announcement: &Announcement) {
        match self.speech.speak(&announcement.text) {
            Ok(()) => self.spoken += 1,
            Err(e) => {
                self.failures += 1;
                let error = NavError::AnnouncementFailure(e.to_string());
                tracing::warn!("{} ({:?}: {})", error, announcement.kind, announcement.text);
            }
        }
    }

    /// Mute or unmute speech. Muting clears the pending slot and stops the
    /// current utterance.
    pub fn set_muted(&mut self, muted: bool) {
        if muted == self.muted {
            return;
        }
        self.muted = muted;
        if muted {
            self.clear_pending();
            self.speech.cancel();
        }
        tracing::info!("Announcements {}", if muted { "muted" } else { "unmuted" });
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Discard the pending announcement, if any.
    pub fn clear_pending(&mut self) {
        if let Some(dropped) = self.pending.take() {
            self.dropped += 1;
            tracing::debug!("Cleared pending announcement: {}", dropped.text);
        }
    }

    pub fn pending(&self) -> Option<&Announcement> {
        self.pending.as_ref()
    }

    /// Forget announcement history for a new session.
    pub fn reset(&mut self) {
        self.announced.clear();
        self.clear_pending();
    }

    pub fn spoken_count(&self) -> u64 {
        self.spoken
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub fn failure_count(&self) -> u64 {
        self.failures
    }
}
