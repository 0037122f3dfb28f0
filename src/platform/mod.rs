//! Capability interfaces onto the host platform
//!
//! The tap manager and orchestrator only talk to the OS through these
//! traits: keyboard hook acquisition, process enumeration, process
//! lifecycle notifications and the run loop that delivers tap callbacks.

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod unsupported;

use std::time::Duration;

use tokio::sync::mpsc;

use crate::events::LoopEvent;
use crate::tap::EventMask;

/// Process identifier, as used by the host
pub type Pid = libc::pid_t;

/// A running process as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    /// Display name matched against the configured application names
    pub name: String,
}

impl ProcessInfo {
    pub fn new(pid: Pid, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// An installed keyboard interception.
///
/// Teardown is split into the three steps the tap manager performs in
/// order: stop delivery, invalidate the underlying port, detach from the
/// run loop.
pub trait Hook {
    fn disable(&mut self);
    fn invalidate(&mut self);
    fn detach(&mut self);
}

/// Acquires per-process keyboard hooks.
///
/// The backend installs a callback that evaluates
/// [`crate::tap::intercept`] for the owning pid and applies the result.
pub trait HookBackend {
    type Hook: Hook;

    fn acquire(&mut self, pid: Pid, name: &str, mask: EventMask) -> Result<Self::Hook, HookError>;
}

/// Enumerates running processes
pub trait ProcessSource {
    fn running_processes(&mut self) -> Vec<ProcessInfo>;
}

/// Delivers process launch/terminate notifications onto the loop channel
pub trait LifecycleSource {
    fn subscribe(&mut self, events: mpsc::UnboundedSender<LoopEvent>) -> Result<(), LifecycleError>;
    fn unsubscribe(&mut self);
}

/// The loop that tap callbacks are attached to
pub trait RunLoop {
    /// Service platform sources for at most `timeout`.
    fn run_for(&mut self, timeout: Duration);
    /// Wake the loop early if it is blocked in `run_for`.
    fn stop(&self);
}

/// Errors acquiring a keyboard hook
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("failed to create event tap for pid {pid} ({name}): {reason}")]
    Creation {
        pid: Pid,
        name: String,
        reason: String,
    },

    #[error("failed to create run loop source for pid {pid}")]
    RunLoopSource { pid: Pid },

    #[error("keyboard event taps are not supported on this platform")]
    Unsupported,
}

/// Errors subscribing to process lifecycle notifications
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("process monitor is already subscribed")]
    AlreadySubscribed,
}

/// The OS capability required to intercept keyboard events was not granted
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error(
        "Accessibility permissions are required for keyboard monitoring.\n  \
         1. Open System Settings > Privacy & Security > Accessibility.\n  \
         2. Grant permission for this application.\n  \
         3. Run the application again."
    )]
    AccessibilityDenied,

    #[error("keyboard interception is only available on macOS")]
    Unsupported,
}
