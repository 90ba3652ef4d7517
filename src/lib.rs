//! MargaNav - turn-by-turn navigation core
//!
//! Consumes a live position stream, tracks progress along a route plan,
//! detects deviation, proposes or performs reroutes and turns all of it
//! into spoken and visual announcements.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  threads::NavigationThread                   │
//! │  commands ─▶ SessionController ─▶ SessionEvent subscribers   │
//! │                  │        │          │                       │
//! │     ProgressTracker  RerouteMonitor  AnnouncementDispatcher  │
//! │                  ▲        │          │                       │
//! └──────────────────┼────────┼──────────┼───────────────────────┘
//!        PositionSource   DirectionsWorker    SpeechPort
//!        (watch/stream)   (provider, traffic) (speech engine)
//! ```
//!
//! Session state lives on the navigation thread only. Provider calls run on
//! the directions worker and come back over a channel, so a slow network
//! never delays sample processing.
//!
//! ## Modules
//!
//! - [`core`]: geodesy helpers
//! - [`position`]: position sources and watches
//! - [`route`]: route plans, directions provider and traffic feed seams
//! - [`navigation`]: tracker, reroute monitor and session controller
//! - [`announce`]: announcement dispatcher and speech ports
//! - [`threads`]: navigation loop and directions worker
//! - [`config`]: TOML configuration

pub mod announce;
pub mod config;
pub mod core;
pub mod error;
pub mod navigation;
pub mod position;
pub mod route;
pub mod threads;

pub use config::MargaConfig;
pub use error::{NavError, Result};
pub use navigation::{SessionController, SessionEvent, SessionSnapshot, SessionState};
pub use route::{RoutePlan, RouteStep, TravelMode};
