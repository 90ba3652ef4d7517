//! Turn-by-turn navigation core.
//!
//! - [`ProgressTracker`]: step advance, arrival, ETA and pre-announcements
//! - [`RerouteMonitor`]: better-route checks, deviation and incidents
//! - [`SessionController`]: session lifecycle and event fan-out
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──start──▶ Active ──arrival──▶ Arrived
//!                   │ ├────cancel───▶ Cancelled
//!                   │ └──permission─▶ Failed
//!                   └──reroute──▶ Active (new plan, step 0)
//! ```

mod events;
mod reroute;
mod session;
mod tracker;

pub use events::{ProgressReport, RerouteReason, SessionEvent, SessionState, TrackerEvent};
pub use reroute::{RequestTicket, RerouteConfig, RerouteMonitor};
pub use session::{NavigationSession, ProposalSummary, SessionController, SessionSnapshot};
pub use tracker::{ProgressTracker, TrackerConfig};
