//! Events delivered to the loop thread
//!
//! Every asynchronous source (process monitor, config watcher, signal
//! listeners) only sends these; the orchestrator applies them in order on
//! the loop thread.

use std::fmt;

use crate::platform::Pid;

/// Where a new application list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Command line or initial config file load
    Startup,
    /// The config file changed on disk
    Watcher,
    /// SIGHUP
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// A process started
    ProcessLaunched { pid: Pid, name: String },

    /// A process exited
    ProcessTerminated { pid: Pid },

    /// Replace the desired application set
    Configure {
        names: Vec<String>,
        origin: ConfigOrigin,
    },

    /// Stop everything and leave the loop
    Shutdown {
        /// Signal number that requested it, if any
        signal: Option<i32>,
    },
}

impl fmt::Display for LoopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopEvent::ProcessLaunched { pid, name } => {
                write!(f, "PROCESS_LAUNCHED ({name}, pid {pid})")
            }
            LoopEvent::ProcessTerminated { pid } => write!(f, "PROCESS_TERMINATED (pid {pid})"),
            LoopEvent::Configure { names, origin } => {
                write!(f, "CONFIGURE ({} apps, {:?})", names.len(), origin)
            }
            LoopEvent::Shutdown { signal: Some(signo) } => write!(f, "SHUTDOWN (signal {signo})"),
            LoopEvent::Shutdown { signal: None } => write!(f, "SHUTDOWN"),
        }
    }
}
