//! OS signal handling
//!
//! SIGTERM/SIGINT shut the daemon down, SIGHUP reloads the config file.
//! Signals are turned into loop events by listener tasks on the runtime.

mod signals;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ConfigReloader;
use crate::events::{ConfigOrigin, LoopEvent};

pub use signals::{HandlerId, SignalAction, SignalMultiplexer};

/// Signals that stop the daemon
pub const SHUTDOWN_SIGNALS: [i32; 2] = [libc::SIGTERM, libc::SIGINT];

/// Signals that reload the config file
pub const RELOAD_SIGNALS: [i32; 1] = [libc::SIGHUP];

/// Ask the loop to shut down, recording which signal asked
pub fn shutdown_action(events: mpsc::UnboundedSender<LoopEvent>) -> SignalAction {
    Arc::new(move |signo| {
        info!(signal = signo, "received shutdown signal");
        if events.send(LoopEvent::Shutdown { signal: Some(signo) }).is_err() {
            warn!(signal = signo, "event loop already gone");
        }
    })
}

/// Reload the config file and hand the result to the loop.
///
/// Without a reloader the apps came from the command line and the signal is
/// only logged.
pub fn reload_action(
    reloader: Option<Arc<ConfigReloader>>,
    events: mpsc::UnboundedSender<LoopEvent>,
) -> SignalAction {
    Arc::new(move |signo| match &reloader {
        Some(reloader) => {
            info!(signal = signo, path = %reloader.path().display(), "reloading configuration");
            reloader.reload_into(&events, ConfigOrigin::Signal);
        }
        None => info!(signal = signo, "apps given on the command line, ignoring SIGHUP"),
    })
}
