//! Trace playback position source.
//!
//! A trace is a JSON-lines file, one update per line:
//!
//! ```text
//! {"latitude":48.2082,"longitude":16.3738,"speed_mps":8.3,"accuracy_m":4.0,"timestamp_ms":0}
//! {"error":"unavailable"}
//! ```
//!
//! Playback runs on a feeder thread and stops as soon as the watch is
//! unsubscribed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use super::{
    PositionError, PositionSample, PositionSource, PositionUpdate, PositionWatch, WatchOptions,
};
use crate::error::{NavError, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceLine {
    Error { error: PositionError },
    Sample(PositionSample),
}

impl From<TraceLine> for PositionUpdate {
    fn from(line: TraceLine) -> Self {
        match line {
            TraceLine::Error { error } => PositionUpdate::Error(error),
            TraceLine::Sample(sample) => PositionUpdate::Sample(sample),
        }
    }
}

/// Longest pause between two replayed samples.
const MAX_PLAYBACK_DELAY: Duration = Duration::from_secs(3600);

/// Replays a recorded position trace.
///
/// `speed` scales recorded timing: 1.0 is real time, 0.0 replays as fast as
/// possible.
#[derive(Clone)]
pub struct ReplayPositionSource {
    updates: Arc<Vec<PositionUpdate>>,
    speed: f32,
}

impl ReplayPositionSource {
    /// Load a JSON-lines trace file.
    pub fn open(path: impl AsRef<Path>, speed: f32) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut updates = Vec::new();

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parsed: TraceLine = serde_json::from_str(trimmed).map_err(|e| {
                NavError::Config(format!("{}:{}: {}", path.display(), line_no + 1, e))
            })?;
            updates.push(parsed.into());
        }

        tracing::info!("Loaded {} trace updates from {:?}", updates.len(), path);
        Ok(Self::from_updates(updates, speed))
    }

    pub fn from_updates(updates: Vec<PositionUpdate>, speed: f32) -> Self {
        Self {
            updates: Arc::new(updates),
            speed: speed.max(0.0),
        }
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// First recorded sample, used as the origin when no route is given.
    pub fn first_sample(&self) -> Option<&PositionSample> {
        self.updates.iter().find_map(|u| match u {
            PositionUpdate::Sample(sample) => Some(sample),
            PositionUpdate::Error(_) => None,
        })
    }

    /// Delay before delivering an update recorded `delta_ms` after the previous one.
    fn playback_delay(&self, delta_ms: u64) -> Option<Duration> {
        if self.speed <= 0.0 || delta_ms == 0 {
            return None;
        }
        let secs = delta_ms as f64 / 1000.0 / self.speed as f64;
        Some(
            Duration::try_from_secs_f64(secs)
                .unwrap_or(MAX_PLAYBACK_DELAY)
                .min(MAX_PLAYBACK_DELAY),
        )
    }
}

impl PositionSource for ReplayPositionSource {
    fn watch(&mut self, options: &WatchOptions) -> std::result::Result<PositionWatch, PositionError> {
        let (feed, watch) = PositionWatch::channel(options);
        let source = self.clone();

        thread::Builder::new()
            .name("position-replay".into())
            .spawn(move || {
                let mut last_ms: Option<u64> = None;
                let mut delivered = 0usize;

                for update in source.updates.iter() {
                    if let PositionUpdate::Sample(sample) = update {
                        let delta = last_ms
                            .map(|t| sample.timestamp_ms.saturating_sub(t))
                            .unwrap_or(0);
                        if let Some(delay) = source.playback_delay(delta) {
                            thread::sleep(delay);
                        }
                        last_ms = Some(sample.timestamp_ms);
                    }
                    if !feed.send(*update) {
                        tracing::debug!("Replay stopped: watch unsubscribed");
                        return;
                    }
                    delivered += 1;
                }

                tracing::info!("Replay finished: {} updates delivered", delivered);
            })
            .map_err(|e| {
                tracing::error!("Failed to spawn replay thread: {}", e);
                PositionError::Unavailable
            })?;

        Ok(watch)
    }
}
