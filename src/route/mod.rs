//! Route model and external route collaborators.
//!
//! - [`RoutePlan`]: immutable ordered maneuvers, replaced wholesale on reroute
//! - [`DirectionsProvider`]: external route computation
//! - [`TrafficFeed`]: external incident reports

mod plan;
mod provider;
mod traffic;

pub use plan::{RoutePlan, RoutePlanSpec, RouteStep, TravelMode};
pub use provider::{DirectionsProvider, DirectionsRequest, ProviderError, StraightLineProvider};
pub use traffic::{Incident, IncidentSeverity, StaticTrafficFeed, TrafficFeed};
