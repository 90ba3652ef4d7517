//! Directions worker: serves provider and traffic requests off the
//! navigation loop.
//!
//! The loop submits [`DirectionsJob`]s and collects [`JobResult`]s with a
//! non-blocking poll on its next turn, so a slow provider never delays
//! position processing. The inline mode runs jobs on the caller's thread and
//! is used where deterministic ordering matters (tests, embedding).

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::core::BoundingBox;
use crate::error::Result;
use crate::navigation::RequestTicket;
use crate::route::{
    DirectionsProvider, DirectionsRequest, Incident, ProviderError, RoutePlan, TrafficFeed,
};

/// Work item for the directions worker.
#[derive(Clone, Debug)]
pub enum DirectionsJob {
    /// Compute a candidate route
    Route {
        ticket: RequestTicket,
        request: DirectionsRequest,
    },
    /// Fetch incidents around the remaining route
    Incidents {
        ticket: RequestTicket,
        bbox: BoundingBox,
    },
}

impl DirectionsJob {
    pub fn ticket(&self) -> &RequestTicket {
        match self {
            DirectionsJob::Route { ticket, .. } | DirectionsJob::Incidents { ticket, .. } => ticket,
        }
    }
}

/// Completed work item, tagged with the ticket it was issued under.
#[derive(Debug)]
pub enum JobResult {
    Route {
        ticket: RequestTicket,
        result: std::result::Result<RoutePlan, ProviderError>,
    },
    Incidents {
        ticket: RequestTicket,
        result: std::result::Result<Vec<Incident>, ProviderError>,
    },
}

/// External collaborators the worker calls into.
struct Services {
    provider: Arc<dyn DirectionsProvider>,
    traffic: Option<Arc<dyn TrafficFeed>>,
}

impl Services {
    fn run(&self, job: DirectionsJob) -> JobResult {
        match job {
            DirectionsJob::Route { ticket, request } => {
                tracing::debug!(
                    "Requesting {} route for plan {} ({:?})",
                    request.mode.as_str(),
                    ticket.plan_id,
                    ticket.reason
                );
                JobResult::Route {
                    ticket,
                    result: self.provider.route(&request),
                }
            }
            DirectionsJob::Incidents { ticket, bbox } => {
                let result = match &self.traffic {
                    Some(feed) => feed.incidents(&bbox),
                    None => Ok(Vec::new()),
                };
                JobResult::Incidents { ticket, result }
            }
        }
    }
}

enum Backend {
    Threaded {
        jobs: Option<Sender<DirectionsJob>>,
        results: Receiver<JobResult>,
        handle: Option<JoinHandle<()>>,
    },
    Inline {
        results: VecDeque<JobResult>,
    },
}

/// Handle to the directions worker.
pub struct DirectionsWorker {
    services: Arc<Services>,
    backend: Backend,
}

impl DirectionsWorker {
    /// Start a worker thread.
    pub fn spawn(
        provider: Arc<dyn DirectionsProvider>,
        traffic: Option<Arc<dyn TrafficFeed>>,
    ) -> Result<Self> {
        let services = Arc::new(Services { provider, traffic });
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<DirectionsJob>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<JobResult>();

        let worker_services = Arc::clone(&services);
        let handle = thread::Builder::new()
            .name("directions".into())
            .spawn(move || {
                tracing::info!("Directions worker started");
                for job in job_rx.iter() {
                    if result_tx.send(worker_services.run(job)).is_err() {
                        break;
                    }
                }
                tracing::info!("Directions worker stopped");
            })?;

        Ok(Self {
            services,
            backend: Backend::Threaded {
                jobs: Some(job_tx),
                results: result_rx,
                handle: Some(handle),
            },
        })
    }

    /// Run jobs synchronously on submit; results are queued for `try_result`.
    pub fn inline(
        provider: Arc<dyn DirectionsProvider>,
        traffic: Option<Arc<dyn TrafficFeed>>,
    ) -> Self {
        Self {
            services: Arc::new(Services { provider, traffic }),
            backend: Backend::Inline {
                results: VecDeque::new(),
            },
        }
    }

    /// Whether a traffic feed is configured.
    pub fn has_traffic(&self) -> bool {
        self.services.traffic.is_some()
    }

    /// Hand a job to the worker. Returns `false` if the worker has stopped.
    pub fn submit(&mut self, job: DirectionsJob) -> bool {
        match &mut self.backend {
            Backend::Threaded { jobs, .. } => match jobs {
                Some(tx) => tx.send(job).is_ok(),
                None => false,
            },
            Backend::Inline { results } => {
                results.push_back(self.services.run(job));
                true
            }
        }
    }

    /// Next finished job, without blocking.
    pub fn try_result(&mut self) -> Option<JobResult> {
        match &mut self.backend {
            Backend::Threaded { results, .. } => match results.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
            },
            Backend::Inline { results } => results.pop_front(),
        }
    }

    /// Call the provider on the current thread.
    ///
    /// Used for the initial route, where there is nothing to navigate until
    /// the plan exists.
    pub fn route_blocking(
        &self,
        request: &DirectionsRequest,
    ) -> std::result::Result<RoutePlan, ProviderError> {
        self.services.provider.route(request)
    }

    /// Stop the worker thread and wait for it to finish its current job.
    pub fn shutdown(&mut self) {
        if let Backend::Threaded { jobs, handle, .. } = &mut self.backend {
            jobs.take();
            if let Some(handle) = handle.take()
                && handle.join().is_err()
            {
                tracing::error!("Directions worker panicked");
            }
        }
    }
}

impl Drop for DirectionsWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
