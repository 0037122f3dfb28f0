//! modswap: swaps the Command and Option modifiers for selected macOS
//! applications
//!
//! The daemon installs one keyboard event tap per running process whose name
//! is configured, and keeps the set of taps in step with process launches,
//! terminations and config changes:
//! - Apps come from the command line or a config file (one name per line)
//! - The config file is watched and re-read on SIGHUP
//! - SIGTERM/SIGINT tear every tap down and exit

#[cfg(target_os = "macos")]
#[macro_use]
extern crate objc;

mod config;
mod engine;
mod events;
mod lifecycle;
mod logging;
mod platform;
mod process;
mod tap;

#[cfg(test)]
mod test_helpers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::{Builder, Handle};
use tracing::info;

use crate::config::{AppDirs, ConfigSource, ConfigWatcher};
use crate::engine::Orchestrator;
use crate::events::{ConfigOrigin, LoopEvent};
use crate::lifecycle::{
    reload_action, shutdown_action, SignalMultiplexer, RELOAD_SIGNALS, SHUTDOWN_SIGNALS,
};
use crate::process::ProcessMonitor;

#[cfg(target_os = "macos")]
use crate::platform::macos::{
    check_accessibility, CoreFoundationLoop, EventTapBackend, WorkspaceProcesses,
};
#[cfg(not(target_os = "macos"))]
use crate::platform::unsupported::{check_accessibility, SleepLoop, UnsupportedBackend};
#[cfg(not(target_os = "macos"))]
use crate::process::SysinfoProcesses;

#[derive(Parser, Debug)]
#[command(name = "modswap", version, about = "Swap Command and Option for selected applications")]
struct Cli {
    /// Application names to swap modifiers for (overrides the config file)
    apps: Vec<String>,

    /// Read application names from this file, one per line
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log to the system log instead of stderr
    #[arg(long)]
    headless: bool,
}

#[cfg(target_os = "macos")]
fn new_orchestrator(runtime: Handle) -> Orchestrator<EventTapBackend> {
    Orchestrator::new(
        EventTapBackend::for_current_thread(),
        WorkspaceProcesses,
        ProcessMonitor::<WorkspaceProcesses>::new(runtime),
        CoreFoundationLoop::for_current_thread(),
    )
}

#[cfg(not(target_os = "macos"))]
fn new_orchestrator(runtime: Handle) -> Orchestrator<UnsupportedBackend> {
    Orchestrator::new(
        UnsupportedBackend,
        SysinfoProcesses::new(),
        ProcessMonitor::<SysinfoProcesses>::new(runtime),
        SleepLoop,
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.headless {
        logging::init_syslog();
    } else {
        logging::init_console();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "modswap starting"
    );

    check_accessibility()?;

    // Listener tasks for signals and process polling. The tap callbacks run
    // on this thread's run loop instead.
    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("modswap-worker")
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let source = ConfigSource::resolve(cli.apps, cli.config, AppDirs::locate)?;
    if let Some(path) = source.path() {
        info!(path = %path.display(), "using configuration file");
    }
    let initial = source.load_initial()?;
    let reloader = source.reloader().map(Arc::new);

    let mut orchestrator = new_orchestrator(runtime.handle().clone());
    let events = orchestrator.events();

    let mut watcher = match (initial.watch, &reloader) {
        (Some(file), Some(reloader)) => Some(ConfigWatcher::start(
            file,
            Arc::clone(reloader),
            events.clone(),
        )?),
        _ => None,
    };

    let mut signals = SignalMultiplexer::new(runtime.handle().clone());
    signals
        .add_handler(&SHUTDOWN_SIGNALS, shutdown_action(events.clone()))
        .context("failed to install shutdown signal handlers")?;
    signals
        .add_handler(&RELOAD_SIGNALS, reload_action(reloader, events.clone()))
        .context("failed to install reload signal handler")?;

    // Applied by the loop once process notifications are attached, so no
    // launch falls between the scan and the subscription.
    events
        .send(LoopEvent::Configure {
            names: initial.names,
            origin: ConfigOrigin::Startup,
        })
        .context("event loop closed before start")?;

    let result = orchestrator.start();

    // No reloads while tearing down.
    signals.remove_handler(&RELOAD_SIGNALS);
    if let Some(watcher) = watcher.as_mut() {
        watcher.stop();
    }
    signals.cleanup();
    drop(orchestrator);
    runtime.shutdown_timeout(Duration::from_secs(1));

    result?;
    info!("modswap stopped");
    Ok(())
}
