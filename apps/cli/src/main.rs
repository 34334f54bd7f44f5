#![deny(warnings)]

//! Headless driver: runs one shop-floor session to completion with an
//! automatic release policy, prints the KPIs and optionally writes the
//! session log as JSON.

use anyhow::{Context, Result};
use chrono::Utc;
use shop_core::{RawSettings, Settings};
use shop_runtime::Engine;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    seed: Option<String>,
    minutes: Option<i64>,
    log: Option<PathBuf>,
    /// Release one pending order every this many ticks.
    release_every: Option<u64>,
    version: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next().map(PathBuf::from),
            "--seed" => args.seed = it.next(),
            "--minutes" => args.minutes = it.next().and_then(|s| s.parse().ok()),
            "--log" => args.log = it.next().map(PathBuf::from),
            "--release-every" => args.release_every = it.next().and_then(|s| s.parse().ok()),
            "--version" | "-V" => args.version = true,
            _ => {}
        }
    }
    args
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut raw = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_yaml::from_str::<RawSettings>(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => RawSettings::default(),
    };
    if args.seed.is_some() {
        raw.seed = args.seed.clone();
    }
    if args.minutes.is_some() {
        raw.session_minutes = args.minutes;
    }
    Ok(Settings::from_raw(&raw))
}

/// Release the pending order closest to its due date.
fn release_earliest_due(engine: &mut Engine) {
    let next = engine
        .state()
        .pending()
        .iter()
        .filter(|o| o.scheduled_release.is_none())
        .min_by_key(|o| o.due_at)
        .map(|o| o.id);
    if let Some(id) = next {
        if let Err(e) = engine.release(id) {
            debug!(order = %id, error = %e, "auto-release skipped");
        }
    }
}

/// `RUST_LOG` directives if they parse, otherwise `info`.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() -> Result<()> {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let args = parse_args();
    if args.version {
        println!(
            "shop {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }

    let settings = load_settings(&args)?;
    info!(?settings, "starting session");
    let every = args.release_every.unwrap_or(60).max(1);

    let mut engine = Engine::new(settings);
    engine.start(Utc::now())?;
    let mut ticks: u64 = 0;
    while !engine.state().is_completed() {
        if ticks % every == 0 {
            release_earliest_due(&mut engine);
        }
        engine.tick();
        ticks += 1;
    }

    let state = engine.state();
    let p = &state.performance;
    println!(
        "Session {} | ticks: {} | simulated: {:.0} min | decisions: {}",
        state.session.id,
        ticks,
        state.session.elapsed.as_minutes_f64(),
        state.decisions.len()
    );
    println!(
        "KPI | generated: {} | completed: {} (on time {}, late {}) | on-time: {:.1}% | lead: {:.1} min | throughput: {:.1}/h | wip: {} | pending: {} | bottleneck: {}",
        state.total_orders_generated(),
        p.completed(),
        p.completed_on_time,
        p.completed_late,
        p.on_time_rate * 100.0,
        p.average_lead_time_minutes,
        p.throughput_per_hour,
        p.wip,
        p.pending,
        p.bottleneck
            .map_or_else(|| "none".to_string(), |d| d.to_string())
    );
    for d in state.departments() {
        println!(
            "  {} {:<16} processed: {:>3} | util: {:>5.1}% | {:?}",
            d.id, d.name, d.total_processed, d.utilization, d.status
        );
    }

    if let Some(path) = &args.log {
        let json = engine.session_log().to_json_pretty()?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), events = engine.event_archive().len(), "session log written");
    }
    Ok(())
}
