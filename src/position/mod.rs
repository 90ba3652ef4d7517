//! Position source abstraction.
//!
//! A [`PositionSource`] turns a device location stream into a sequence of
//! [`PositionUpdate`]s delivered through a [`PositionWatch`]. The watch is
//! also the unsubscribe handle: once it is unsubscribed (or dropped) no
//! further updates are delivered.
//!
//! # Sources
//!
//! - [`ScriptedPositionSource`]: in-process feed for tests and embedding
//! - [`ReplayPositionSource`]: plays back a recorded JSON-lines trace

mod history;
mod replay;
mod scripted;
mod watch;

pub use history::PositionHistory;
pub use replay::ReplayPositionSource;
pub use scripted::ScriptedPositionSource;
pub use watch::{PositionWatch, WatchFeed};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::GeoPoint;

/// A single position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Course over ground, degrees clockwise from north.
    #[serde(default)]
    pub heading_degrees: Option<f64>,
    /// Ground speed (m/s).
    #[serde(default)]
    pub speed_mps: Option<f64>,
    /// Horizontal accuracy radius (meters).
    #[serde(default = "default_accuracy")]
    pub accuracy_m: f64,
    /// Fix time in milliseconds.
    pub timestamp_ms: u64,
}

fn default_accuracy() -> f64 {
    5.0
}

impl PositionSample {
    /// Create a sample with default accuracy and no heading or speed.
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: u64) -> Self {
        Self {
            latitude,
            longitude,
            heading_degrees: None,
            speed_mps: None,
            accuracy_m: default_accuracy(),
            timestamp_ms,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_heading(mut self, heading_degrees: f64) -> Self {
        self.heading_degrees = Some(heading_degrees);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = accuracy_m;
        self
    }

    #[inline]
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Failure reported by a position source.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable")]
    Unavailable,

    #[error("position request timed out")]
    Timeout,
}

/// One item of a position stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionUpdate {
    Sample(PositionSample),
    Error(PositionError),
}

impl From<PositionSample> for PositionUpdate {
    fn from(sample: PositionSample) -> Self {
        PositionUpdate::Sample(sample)
    }
}

impl From<PositionError> for PositionUpdate {
    fn from(error: PositionError) -> Self {
        PositionUpdate::Error(error)
    }
}

/// Subscription options for a position watch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchOptions {
    /// Request the most accurate fix the device can provide
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,

    /// Minimum spacing between delivered samples (ms, 0 = no throttling)
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Device timeout for a single fix (ms)
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Maximum age of a cached fix (ms)
    #[serde(default)]
    pub maximum_age_ms: u64,
}

fn default_high_accuracy() -> bool {
    true
}
fn default_min_interval() -> u64 {
    1000
}
fn default_timeout() -> u64 {
    10_000
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: default_high_accuracy(),
            min_interval_ms: default_min_interval(),
            timeout_ms: default_timeout(),
            maximum_age_ms: 0,
        }
    }
}

/// A continuous location stream.
///
/// `watch` may prompt for permission on first use; a refusal is reported
/// either as an immediate `Err(PermissionDenied)` or as the first update of
/// the returned watch.
pub trait PositionSource: Send {
    fn watch(&mut self, options: &WatchOptions) -> Result<PositionWatch, PositionError>;
}
