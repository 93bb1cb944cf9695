//! RePLAY headless simulator CLI
//!
//! Plays a log on a virtual display refresh, or runs the scripted playback
//! scenarios.

use clap::Parser;
use replay_core::{fixtures, load_from_location, load_from_str, AnimationRecord, ViewerConfig};
use replay_env::{FsTransport, LogLocation};
use replay_sim::{HostConfig, ScenarioId, ScenarioResult, ScenarioRunner, SimError, SimHost};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// RePLAY headless playback and scenario CLI
#[derive(Parser, Debug)]
#[command(name = "replay-sim")]
#[command(about = "Play RePLAY animation logs headlessly and run playback scenarios", long_about = None)]
struct Args {
    /// Log file to play
    #[arg(long, conflicts_with = "builtin")]
    log: Option<PathBuf>,

    /// Built-in demo log to play (0 = cylinder/box, 1 = legacy orbit)
    #[arg(long)]
    builtin: Option<usize>,

    /// Host time to play for, in seconds
    #[arg(short, long, default_value = "5")]
    duration: f64,

    /// Playback speed multiplier (negative plays in reverse)
    #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
    speed: f64,

    /// Scenario to run (dual_playback, reverse_wrap, scrub_while_playing, stale_load,
    /// capacity_evict, speed_freeze, fault_isolation, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to run scenarios with
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Viewer configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the playback timeline to a JSON file
    #[arg(long)]
    export: Option<String>,
}

impl Args {
    fn plays_log(&self) -> bool {
        self.log.is_some() || self.builtin.is_some()
    }
}

fn read_config(path: Option<&PathBuf>) -> Result<ViewerConfig, SimError> {
    match path {
        None => Ok(ViewerConfig::default()),
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| SimError::Config(format!("{}: {}", path.display(), e)))?;
            ViewerConfig::from_json(&raw).map_err(|e| SimError::Config(format!("{}: {}", path.display(), e)))
        }
    }
}

fn fetch_record(args: &Args) -> Result<(String, AnimationRecord), SimError> {
    if let Some(index) = args.builtin {
        let raw = fixtures::builtin(index)
            .ok_or_else(|| SimError::Config(format!("No built-in log {}", index)))?;
        let name = fixtures::BUILTIN_LOGS[index].0.to_string();
        return Ok((name, load_from_str(raw)?));
    }

    let location = match &args.log {
        Some(path) => LogLocation::file(path),
        None => return Err(SimError::Config("No log given".to_string())),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SimError::Runtime(e.to_string()))?;
    let record = runtime.block_on(load_from_location(&FsTransport::new(), &location))?;
    Ok((location.to_string(), record))
}

/// Plays one log headlessly and prints what the controls would have shown.
fn run_playback(args: &Args, seed: u64) -> Result<(), SimError> {
    let config = HostConfig {
        viewer: read_config(args.config.as_ref())?,
        ..Default::default()
    };
    let (source, record) = fetch_record(args)?;

    let mut host = SimHost::new(seed, config)?;
    let slot = host.open_viewport(None)?;
    let summary = host.load_now(slot, record)?;
    if let Some(controller) = host.registry_mut().controller_mut(slot) {
        controller.set_speed(args.speed);
    }

    host.run_for(Duration::from_secs_f64(args.duration.max(0.0)));

    let controller = host.registry().controller(slot);
    let final_frame = controller.and_then(|c| c.current_frame());
    let final_time = controller.and_then(|c| c.quantized_time());
    let faults: Vec<String> = host.faults().iter().map(|(_, _, f)| f.to_string()).collect();

    if args.json {
        let report = serde_json::json!({
            "source": source,
            "summary": summary,
            "ticks": host.ticks(),
            "rendered_frames": host.rendered_frames(),
            "final_frame": final_frame,
            "final_time": final_time,
            "faults": faults,
        });
        println!("{}", serde_json::to_string_pretty(&report).map_err(|e| SimError::Runtime(e.to_string()))?);
    } else {
        info!("Played {} for {:.2}s at {}x", source, args.duration, args.speed);
        info!(
            "  {} groups | start={} stop={} step={}",
            summary.groups.len(),
            summary.start,
            summary.stop,
            summary.step
        );
        for group in &summary.groups {
            info!("    {} color={} transparency={}", group.name, group.color, group.transparency);
        }
        info!(
            "  {} ticks, {} rendered | final frame {:?} (t={:?})",
            host.ticks(),
            host.rendered_frames(),
            final_frame,
            final_time
        );
        for fault in &faults {
            error!("  fault: {}", fault);
        }
    }

    if let Some(path) = &args.export {
        let export = host.into_export(&source);
        export
            .write_to_file(path)
            .map_err(|e| SimError::Runtime(format!("Failed to write export: {}", e)))?;
        info!("Exported {} samples to {}", export.samples.len(), path);
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    if args.plays_log() {
        if let Err(e) = run_playback(&args, base_seed) {
            error!("{}", e);
            std::process::exit(1);
        }
        return;
    }

    if !args.json {
        info!("RePLAY Playback Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!(
                "Available scenarios: {}, all",
                ScenarioId::all().iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
            );
            std::process::exit(1);
        })]
    };

    let viewer = match read_config(args.config.as_ref()) {
        Ok(viewer) => viewer,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_host_config(HostConfig {
                jitter_std_ms: 2.0,
                viewer: viewer.clone(),
                ..Default::default()
            });

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sources() {
        let args = Args::try_parse_from(["replay-sim", "--builtin", "1", "--speed", "-2"]).unwrap();
        assert!(args.plays_log());
        assert_eq!(args.speed, -2.0);

        assert!(Args::try_parse_from(["replay-sim", "--log", "a.json", "--builtin", "0"]).is_err());
        assert!(Args::try_parse_from(["replay-sim", "--logref", "someone/robots/main/walk.json"]).is_err());
    }

    #[test]
    fn test_scenarios_by_default() {
        let args = Args::try_parse_from(["replay-sim"]).unwrap();
        assert!(!args.plays_log());
        assert_eq!(args.scenario, "all");
    }
}
