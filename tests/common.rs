//! Test utilities for MargaNav integration tests.
//!
//! Plans run due east along the equator, where 0.001 deg of longitude is
//! about 111 m.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use marga_nav::announce::MockSpeech;
use marga_nav::core::GeoPoint;
use marga_nav::position::{PositionSample, ScriptedPositionSource};
use marga_nav::route::{
    DirectionsProvider, DirectionsRequest, ProviderError, RoutePlan, RouteStep,
    StraightLineProvider, TrafficFeed, TravelMode,
};
use marga_nav::threads::DirectionsWorker;
use marga_nav::{MargaConfig, SessionController, SessionEvent};

/// Meters per degree of longitude on the equator.
pub const M_PER_DEG: f64 = 111_195.08;

/// Plan with one anchor per longitude, timed at 10 m/s.
pub fn equator_plan(lons: &[f64], destination_lon: f64) -> RoutePlan {
    let steps = lons
        .iter()
        .enumerate()
        .map(|(i, lon)| RouteStep {
            index: i,
            instruction: format!("Turn left onto Street {}", i),
            maneuver_anchor: GeoPoint::new(0.0, *lon),
            cumulative_distance_m: (lon - lons[0]) * M_PER_DEG,
            cumulative_duration_s: (lon - lons[0]) * M_PER_DEG / 10.0,
        })
        .collect();
    let total = (destination_lon - lons[0]) * M_PER_DEG;
    RoutePlan::new(
        GeoPoint::new(0.0, lons[0]),
        GeoPoint::new(0.0, destination_lon),
        steps,
        total,
        total / 10.0,
        TravelMode::Driving,
    )
    .unwrap()
}

/// Sample on the equator.
pub fn at(lon: f64, timestamp_ms: u64) -> PositionSample {
    PositionSample::new(0.0, lon, timestamp_ms)
}

/// Sample `meters` north of the equator.
pub fn north_of(meters: f64, lon: f64, timestamp_ms: u64) -> PositionSample {
    PositionSample::new(meters / M_PER_DEG, lon, timestamp_ms)
}

/// Straight-line provider whose plans take a fixed total time, or fail.
pub struct FixedProvider {
    duration_s: Mutex<f64>,
    error: Mutex<Option<ProviderError>>,
    calls: AtomicUsize,
}

impl FixedProvider {
    pub fn new(duration_s: f64) -> Self {
        Self {
            duration_s: Mutex::new(duration_s),
            error: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_duration(&self, duration_s: f64) {
        *self.duration_s.lock() = duration_s;
    }

    pub fn fail_with(&self, error: Option<ProviderError>) {
        *self.error.lock() = error;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DirectionsProvider for FixedProvider {
    fn route(&self, request: &DirectionsRequest) -> Result<RoutePlan, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.error.lock().clone() {
            return Err(error);
        }
        let straight = StraightLineProvider::new().route(request)?;
        RoutePlan::new(
            straight.origin(),
            straight.destination(),
            straight.steps().to_vec(),
            straight.total_distance_m(),
            *self.duration_s.lock(),
            straight.mode(),
        )
        .map_err(|e| ProviderError::ProviderUnavailable(e.to_string()))
    }
}

/// Config without sample throttling.
pub fn config() -> MargaConfig {
    let mut config = MargaConfig::default();
    config.position.min_interval_ms = 0;
    config
}

/// Controller wired to scripted fakes and an inline directions worker.
pub struct Harness {
    pub controller: SessionController,
    pub source: ScriptedPositionSource,
    pub speech: MockSpeech,
    pub provider: Arc<FixedProvider>,
    pub events: Receiver<SessionEvent>,
}

impl Harness {
    pub fn new(config: MargaConfig) -> Self {
        Self::with_traffic(config, None)
    }

    pub fn with_traffic(config: MargaConfig, traffic: Option<Arc<dyn TrafficFeed>>) -> Self {
        let source = ScriptedPositionSource::new();
        let speech = MockSpeech::new();
        let provider = Arc::new(FixedProvider::new(60.0));
        let worker = DirectionsWorker::inline(provider.clone(), traffic);
        let mut controller = SessionController::new(
            Box::new(source.clone()),
            Box::new(speech.clone()),
            worker,
            &config,
        );
        let events = controller.subscribe();

        Self {
            controller,
            source,
            speech,
            provider,
            events,
        }
    }

    /// Everything emitted since the last drain.
    pub fn drain(&self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }
}

pub fn announcements(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Announcement(notice) => Some(notice.text.clone()),
            _ => None,
        })
        .collect()
}
