//! MargaNav - trace replay for the navigation core
//!
//! Replays a recorded position trace against a route plan and prints the
//! resulting navigation events.
//!
//! ```bash
//! # Follow a route file
//! marga-nav --route demos/route.json --trace demos/trace.jsonl
//!
//! # Let the straight-line provider plan from the first trace sample
//! marga-nav --to 48.2100,16.3790 --trace demos/trace.jsonl --speed 0
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use crossbeam_channel::RecvTimeoutError;
use tracing::{error, info, warn};

use marga_nav::announce::LogSpeech;
use marga_nav::core::GeoPoint;
use marga_nav::position::ReplayPositionSource;
use marga_nav::route::{DirectionsRequest, StaticTrafficFeed, StraightLineProvider, TrafficFeed};
use marga_nav::threads::{DirectionsWorker, NavigationThread};
use marga_nav::{
    MargaConfig, NavError, Result, RoutePlan, SessionController, SessionEvent, SessionState,
    TravelMode,
};

#[derive(Parser)]
#[command(name = "marga-nav")]
#[command(version)]
#[command(about = "Replay a position trace through the turn-by-turn navigation core")]
struct Cli {
    /// Route plan JSON file
    #[arg(long, conflicts_with = "to")]
    route: Option<PathBuf>,

    /// Destination "LAT,LON"; the route is planned from the first trace sample
    #[arg(long, value_parser = parse_point)]
    to: Option<GeoPoint>,

    /// Travel mode used with --to
    #[arg(long, value_enum, default_value = "driving")]
    mode: ModeArg,

    /// JSON-lines position trace
    #[arg(long)]
    trace: PathBuf,

    /// Configuration file (default: marga.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Playback speed multiplier (0 = as fast as possible)
    #[arg(long)]
    speed: Option<f32>,

    /// Start with announcements muted
    #[arg(long)]
    mute: bool,

    /// JSON file with traffic incidents
    #[arg(long)]
    incidents: Option<PathBuf>,

    /// Accept faster routes as soon as they are proposed
    #[arg(long)]
    accept_better_routes: bool,

    /// Print events as JSON lines instead of text
    #[arg(long)]
    json_events: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Driving,
    Walking,
    Cycling,
    Transit,
}

impl From<ModeArg> for TravelMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Driving => TravelMode::Driving,
            ModeArg::Walking => TravelMode::Walking,
            ModeArg::Cycling => TravelMode::Cycling,
            ModeArg::Transit => TravelMode::Transit,
        }
    }
}

fn parse_point(s: &str) -> std::result::Result<GeoPoint, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{}'", s))?;
    let point = GeoPoint::new(
        lat.trim().parse().map_err(|e| format!("latitude: {}", e))?,
        lon.trim().parse().map_err(|e| format!("longitude: {}", e))?,
    );
    if !point.is_valid() {
        return Err(format!("coordinates out of range: {}", s));
    }
    Ok(point)
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("marga_nav=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(SessionState::Arrived) => ExitCode::SUCCESS,
        Ok(state) => {
            warn!("Navigation ended in state {}", state);
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<MargaConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            MargaConfig::load(path)?
        }
        None if Path::new("marga.toml").exists() => {
            info!("Loading configuration from marga.toml");
            MargaConfig::load(Path::new("marga.toml"))?
        }
        None => {
            info!("Using default configuration");
            MargaConfig::default()
        }
    };

    if let Some(speed) = cli.speed {
        config.replay.speed = speed;
    }
    if cli.mute {
        config.announce.muted = true;
    }
    if cli.accept_better_routes {
        config.replay.accept_better_routes = true;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<SessionState> {
    let config = load_config(&cli)?;
    info!("MargaNav v{}", env!("CARGO_PKG_VERSION"));

    let source = ReplayPositionSource::open(&cli.trace, config.replay.speed)?;
    let origin = source.first_sample().map(|s| s.point());

    let traffic: Option<Arc<dyn TrafficFeed>> = match &cli.incidents {
        Some(path) => Some(Arc::new(StaticTrafficFeed::load(path)?)),
        None => None,
    };
    let worker = DirectionsWorker::spawn(Arc::new(StraightLineProvider::new()), traffic)?;
    let speech = LogSpeech::new(config.announce.words_per_minute);
    let mut controller =
        SessionController::new(Box::new(source), Box::new(speech), worker, &config);

    let plan = match (&cli.route, cli.to) {
        (Some(path), _) => {
            info!("Loading route from {:?}", path);
            RoutePlan::load(path)?
        }
        (None, Some(destination)) => {
            let origin = origin.ok_or_else(|| {
                NavError::PositionUnavailable("trace has no samples to plan from".to_string())
            })?;
            controller.fetch_initial_plan(&DirectionsRequest::new(
                origin,
                destination,
                cli.mode.into(),
            ))?
        }
        (None, None) => {
            return Err(NavError::Config(
                "either --route or --to is required".to_string(),
            ));
        }
    };

    let events = controller.subscribe();
    let tick = Duration::from_millis(config.replay.tick_interval_ms);
    let mut handle = NavigationThread::spawn(controller, tick)?;
    handle.start(plan)?;

    let idle_timeout = Duration::try_from_secs_f32(config.replay.idle_timeout_secs.max(0.1))
        .unwrap_or(Duration::from_secs(5));
    let final_state = loop {
        match events.recv_timeout(idle_timeout) {
            Ok(event) => {
                print_event(&event, cli.json_events);
                match event {
                    SessionEvent::StateChanged { to, .. } if to.is_terminal() => break to,
                    SessionEvent::BetterRouteAvailable { .. }
                    | SessionEvent::RerouteProposed { .. }
                        if config.replay.accept_better_routes =>
                    {
                        if let Err(e) = handle.accept_proposal() {
                            warn!("Could not accept proposal: {}", e);
                        }
                    }
                    _ => {}
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "No events for {:.1}s, cancelling navigation",
                    idle_timeout.as_secs_f32()
                );
                handle.cancel()?;
                break SessionState::Cancelled;
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Navigation loop stopped unexpectedly");
                break SessionState::Failed;
            }
        }
    };

    let snapshot = handle.snapshot()?;
    match serde_json::to_string(&snapshot) {
        Ok(json) if cli.json_events => println!("{}", json),
        _ => info!(
            "Finished: {} (plan {:?}, step {:?}/{})",
            snapshot.state,
            snapshot.plan_id,
            snapshot.active_step_index,
            snapshot.step_count
        ),
    }
    handle.shutdown();
    Ok(final_state)
}

fn print_event(event: &SessionEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
        return;
    }

    match event {
        SessionEvent::StateChanged { from, to } => println!("[state] {} -> {}", from, to),
        SessionEvent::Progress(p) => println!(
            "[progress] step {} | next {:.0} m | destination {:.0} m | eta {:.0} s{}",
            p.active_step_index,
            p.distance_to_next_m,
            p.distance_to_destination_m,
            p.eta_s,
            if p.accuracy_degraded { " | degraded" } else { "" }
        ),
        SessionEvent::StepAdvanced {
            from,
            to,
            instruction,
        } => println!("[step] {} -> {}: {}", from, to, instruction),
        SessionEvent::Announcement(notice) => println!(
            "[announce{}] {}",
            if notice.muted { ", muted" } else { "" },
            notice.text
        ),
        SessionEvent::BetterRouteAvailable {
            candidate_plan_id,
            savings_s,
            ..
        } => println!(
            "[reroute] plan {} available, saves {:.0} s",
            candidate_plan_id, savings_s
        ),
        SessionEvent::RerouteProposed {
            candidate_plan_id,
            savings_s,
            reason,
            ..
        } => println!(
            "[reroute] plan {} proposed ({:?}), {:+.0} s against current",
            candidate_plan_id, reason, savings_s
        ),
        SessionEvent::Rerouted {
            old_plan_id,
            plan_id,
            reason,
        } => println!("[reroute] plan {} -> {} ({:?})", old_plan_id, plan_id, reason),
        SessionEvent::OffRoute { distance_m } => println!("[off-route] {:.0} m from route", distance_m),
        SessionEvent::IncidentAhead(incident) => println!(
            "[incident] {} ({:?})",
            incident.description, incident.severity
        ),
        SessionEvent::AccuracyDegraded { degraded } => println!(
            "[accuracy] {}",
            if *degraded { "degraded" } else { "restored" }
        ),
        SessionEvent::Failed { message } => println!("[failed] {}", message),
    }
}
