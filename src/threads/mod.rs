//! Threads for MargaNav.
//!
//! - Navigation thread: owns the [`SessionController`](crate::navigation::SessionController)
//!   and runs the event loop (position updates, ticks, commands)
//! - Directions thread: serves provider and traffic requests so that slow
//!   network calls never block the loop

mod directions;
mod navigation;

pub use directions::{DirectionsJob, DirectionsWorker, JobResult};
pub use navigation::{NavCommand, NavigationHandle, NavigationThread};
