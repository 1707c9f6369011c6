//! `jointmark` – interactive joint markers for every controlled joint.
//!
//! Startup:
//!
//! 1. Load `<package>/config/jointmark.toml` (defaults if absent).
//! 2. Load the joint limit table.
//! 3. Wait for the controller manager and bind every controller that claims
//!    joints.
//! 4. Build one limit-aware marker handle per joint and write
//!    `rviz/current_rviz.rviz`.
//! 5. Serve the visualization bridge and process marker feedback until
//!    Ctrl-C.

mod config;
mod rviz;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use jointmark_hal::{FileControllerManager, JointRegistry, RegistryReport};
use jointmark_kernel::{JointLimitTable, TomlLimitSource};
use jointmark_middleware::{EventBus, WsBridge};
use jointmark_runtime::{FeedbackLoop, init_tracing};
use jointmark_types::JointError;

fn main() -> ExitCode {
    let _guard = init_tracing("jointmark");
    print_banner();

    let package = config::package_path();
    let cfg_path = config::config_path(&package);
    let first_run = !cfg_path.exists();
    let cfg = match config::load_from(&cfg_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "configuration unusable");
            return ExitCode::FAILURE;
        }
    };
    if first_run {
        match config::save_to(&cfg, &cfg_path) {
            Ok(()) => println!(
                "  {} default config written to {}",
                "✓".green().bold(),
                cfg_path.display().to_string().bold()
            ),
            Err(e) => warn!(error = %e, "default config not written"),
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(package, cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "jointmark stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(package: PathBuf, cfg: config::Config) -> Result<(), JointError> {
    let addr: SocketAddr = cfg
        .bridge_addr
        .parse()
        .map_err(|e| JointError::Config(format!("invalid bridge_addr {}: {e}", cfg.bridge_addr)))?;

    // ── Shutdown signal ───────────────────────────────────────────────────
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    let stop_on_ctrlc = Arc::clone(&stop_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        let _ = stop_on_ctrlc.send(true);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    // ── Limits & discovery ────────────────────────────────────────────────
    let limits = load_limits(&cfg.limits_path(&package));
    let bus = EventBus::default();
    let mut registry = JointRegistry::new(bus.clone(), limits)
        .with_initial_positions(cfg.initial_positions())
        .with_mesh_resolver(Arc::new(cfg.mesh_resolver()))
        .with_time_from_start(cfg.time_from_start_secs);

    let manager = FileControllerManager::new(
        cfg.controllers_path(&package),
        Duration::from_millis(cfg.discovery_poll_ms),
    );
    let bindings = tokio::select! {
        bindings = registry.discover(&manager) => bindings?,
        _ = stop_rx.changed() => {
            info!("stopped before the controller manager came up");
            return Ok(());
        }
    };

    let report = registry.build_handles(&bindings).clone();
    print_summary(&registry, &report);

    match rviz::write_config(&package, &registry.viz_config()) {
        Ok(path) => println!(
            "  {} visualization config at {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        ),
        Err(e) => warn!(error = %e, "visualization config not written"),
    }

    // ── Bridge & feedback loop ────────────────────────────────────────────
    let mut bridge = tokio::spawn(WsBridge::new(Arc::new(bus.clone())).run(addr));
    let feedback_loop = FeedbackLoop::new(bus.clone(), registry);
    feedback_loop.publish_initial_poses();
    let feedback_task = tokio::spawn(feedback_loop.run(stop_rx.clone()));

    println!("  {} listening on {}", "✓".green().bold(), addr.to_string().bold());
    info!("running");

    let bridge_result = tokio::select! {
        joined = &mut bridge => Some(joined),
        _ = wait_for_stop(&mut stop_rx) => None,
    };
    let _ = stop_tx.send(true);
    bridge.abort();

    if let Ok((_, stats)) = feedback_task.await {
        println!(
            "  {} accepted, {} rejected, {} other interactions",
            stats.accepted.to_string().green(),
            stats.rejected.to_string().red(),
            stats.observed
        );
    }

    match bridge_result {
        Some(Ok(Err(e))) => Err(e),
        Some(Err(e)) => Err(JointError::Io(format!("bridge task failed: {e}"))),
        _ => Ok(()),
    }
}

async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    while !*stop_rx.borrow_and_update() {
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Joint limits from `path`; an unreadable table leaves every joint on the
/// fallback range.
fn load_limits(path: &Path) -> JointLimitTable {
    match JointLimitTable::load(&TomlLimitSource::from_path(path)) {
        Ok(table) => {
            info!(joints = table.len(), path = %path.display(), "joint limits loaded");
            table
        }
        Err(e) => {
            warn!(error = %e, "joint limits unavailable, every joint uses the fallback range");
            JointLimitTable::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Console output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}", "jointmark".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Limit-aware interactive joint markers");
    println!();
}

fn print_summary(registry: &JointRegistry, report: &RegistryReport) {
    println!("  {}", "Joint handles".bold());
    for handle in registry.handles() {
        let range = handle.range();
        let bounds = format!("[{:+.3}, {:+.3}]", range.min, range.max);
        let bounds = if range.fallback {
            format!("{bounds} (fallback)").yellow()
        } else {
            bounds.normal()
        };
        println!(
            "    • {:<28} {:<24} {}",
            handle.name().bold(),
            handle.controller_name(),
            bounds
        );
    }
    for controller in &report.skipped_controllers {
        println!("    {} {controller} claims no joints", "–".dimmed());
    }
    for dup in &report.duplicates {
        println!(
            "    {} {} also claimed by {} (kept on {})",
            "!".yellow().bold(),
            dup.joint,
            dup.ignored,
            dup.owner
        );
    }
    for failure in &report.failures {
        println!("    {} {failure}", "✗".red().bold());
    }
    println!();
}
