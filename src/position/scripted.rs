//! In-process position source.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    PositionError, PositionSample, PositionSource, PositionUpdate, PositionWatch, WatchFeed,
    WatchOptions,
};

/// Position source fed by the embedding application or a test.
///
/// Clones share the same feed, so a test can keep one handle to push
/// samples while the controller owns another.
#[derive(Clone, Default)]
pub struct ScriptedPositionSource {
    inner: Arc<Mutex<ScriptedInner>>,
}

#[derive(Default)]
struct ScriptedInner {
    feeds: Vec<WatchFeed>,
    on_watch: VecDeque<PositionUpdate>,
    deny_permission: bool,
    watch_count: usize,
}

impl ScriptedPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose `watch` fails with `PermissionDenied`.
    pub fn denying() -> Self {
        let source = Self::new();
        source.set_permission_denied(true);
        source
    }

    pub fn set_permission_denied(&self, denied: bool) {
        self.inner.lock().deny_permission = denied;
    }

    /// Queue an update delivered to the next watch as soon as it subscribes.
    pub fn queue_on_watch(&self, update: impl Into<PositionUpdate>) {
        self.inner.lock().on_watch.push_back(update.into());
    }

    /// Deliver a sample to every live watch.
    pub fn push_sample(&self, sample: PositionSample) {
        self.push(PositionUpdate::Sample(sample));
    }

    /// Deliver an error to every live watch.
    pub fn push_error(&self, error: PositionError) {
        self.push(PositionUpdate::Error(error));
    }

    fn push(&self, update: PositionUpdate) {
        let mut inner = self.inner.lock();
        inner.feeds.retain(|feed| feed.send(update));
    }

    /// Number of watches that are still subscribed.
    pub fn active_watches(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.feeds.retain(WatchFeed::is_active);
        inner.feeds.len()
    }

    /// Number of successful `watch` calls so far.
    pub fn watch_count(&self) -> usize {
        self.inner.lock().watch_count
    }
}

impl PositionSource for ScriptedPositionSource {
    fn watch(&mut self, options: &WatchOptions) -> Result<PositionWatch, PositionError> {
        let mut inner = self.inner.lock();
        if inner.deny_permission {
            tracing::warn!("Scripted source: permission denied");
            return Err(PositionError::PermissionDenied);
        }

        let (feed, watch) = PositionWatch::channel(options);
        while let Some(update) = inner.on_watch.pop_front() {
            feed.send(update);
        }
        inner.feeds.push(feed);
        inner.watch_count += 1;
        Ok(watch)
    }
}
