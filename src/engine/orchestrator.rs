//! Orchestrator implementation
//!
//! Everything here runs on the loop thread. Producers on other threads only
//! hold a sender for `LoopEvent`s, so the registry and the desired set need
//! no locking.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::events::LoopEvent;
use crate::platform::{HookBackend, LifecycleError, LifecycleSource, Pid, ProcessSource, RunLoop};
use crate::tap::TapManager;

/// How long the platform loop is serviced between drains of the event queue
pub const LOOP_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Constructed, loop not started
    #[default]
    Idle,
    /// Loop running, lifecycle notifications attached
    Running,
    /// Tearing down
    Stopping,
    /// Loop terminated, registry drained
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Running => write!(f, "Running"),
            EngineState::Stopping => write!(f, "Stopping"),
            EngineState::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("cannot start the event loop from state {0}")]
    AlreadyStarted(EngineState),

    #[error("failed to attach process notifications: {0}")]
    Subscribe(#[from] LifecycleError),
}

pub struct Orchestrator<B: HookBackend> {
    state: EngineState,
    /// Guards `stop`: only the first request tears down
    stopping: bool,
    /// Tells the loop in `start` to return
    quit: bool,
    desired: HashSet<String>,
    taps: TapManager<B>,
    processes: Box<dyn ProcessSource>,
    lifecycle: Box<dyn LifecycleSource>,
    run_loop: Box<dyn RunLoop>,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    events_rx: mpsc::UnboundedReceiver<LoopEvent>,
}

impl<B: HookBackend> Orchestrator<B> {
    pub fn new(
        backend: B,
        processes: impl ProcessSource + 'static,
        lifecycle: impl LifecycleSource + 'static,
        run_loop: impl RunLoop + 'static,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: EngineState::Idle,
            stopping: false,
            quit: false,
            desired: HashSet::new(),
            taps: TapManager::new(backend),
            processes: Box::new(processes),
            lifecycle: Box::new(lifecycle),
            run_loop: Box::new(run_loop),
            events_tx,
            events_rx,
        }
    }

    /// Sender for producers on other threads
    pub fn events(&self) -> mpsc::UnboundedSender<LoopEvent> {
        self.events_tx.clone()
    }

    #[cfg(test)]
    pub fn state(&self) -> EngineState {
        self.state
    }

    #[cfg(test)]
    pub fn desired(&self) -> &HashSet<String> {
        &self.desired
    }

    #[cfg(test)]
    pub fn taps(&self) -> &TapManager<B> {
        &self.taps
    }

    /// Replace the desired app set and rebuild every tap from scratch.
    ///
    /// Callable in any state, including before `start`.
    pub fn configure<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.desired = names.into_iter().map(Into::into).collect();

        let running = self.processes.running_processes();
        let hooked = self.taps.reconcile(&self.desired, running);

        if self.desired.is_empty() {
            info!("no apps configured");
        } else {
            let mut apps: Vec<&str> = self.desired.iter().map(String::as_str).collect();
            apps.sort_unstable();
            info!(apps = %apps.join(", "), hooked, "monitoring apps");
        }
    }

    /// Attach lifecycle notifications and run the loop until `shutdown`.
    ///
    /// Blocks the calling thread, which becomes the loop thread.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Idle {
            return Err(EngineError::AlreadyStarted(self.state));
        }

        self.lifecycle.subscribe(self.events_tx.clone())?;
        self.transition_to(EngineState::Running);

        while !self.quit {
            self.pump();
            if self.quit {
                break;
            }
            self.run_loop.run_for(LOOP_TICK);
        }

        info!("event loop exited");
        Ok(())
    }

    /// Apply queued events until the queue is empty or shutdown was
    /// requested. Returns how many events were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while !self.quit {
            let Ok(event) = self.events_rx.try_recv() else {
                break;
            };
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    fn dispatch(&mut self, event: LoopEvent) {
        debug!(%event, "dispatching loop event");

        match event {
            LoopEvent::ProcessLaunched { pid, name } => self.handle_launch(pid, &name),
            LoopEvent::ProcessTerminated { pid } => {
                // Unconditional: the app may have left the desired set while
                // it was still running.
                self.taps.remove_hook(pid);
            }
            LoopEvent::Configure { names, origin } => {
                debug!(?origin, "applying configuration");
                self.configure(names);
            }
            LoopEvent::Shutdown { signal } => {
                info!(?signal, "shutdown requested");
                self.shutdown();
            }
        }
    }

    fn handle_launch(&mut self, pid: Pid, name: &str) {
        // The previous owner of a reused pid can exit between two polls
        // without a termination ever being reported.
        if let Some(stale) = self.taps.hooked_name(pid) {
            if stale != name {
                debug!(pid, stale, name, "pid reused, dropping stale event tap");
                self.taps.remove_hook(pid);
            }
        }

        if self.stopping || !self.desired.contains(name) {
            return;
        }
        self.taps.install_hook(pid, name);
    }

    /// Detach lifecycle notifications and remove every tap. Idempotent.
    pub fn stop(&mut self) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        self.transition_to(EngineState::Stopping);

        self.lifecycle.unsubscribe();
        self.taps.reconcile(&HashSet::new(), Vec::new());
    }

    /// Stop, drain the registry and make `start` return. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state == EngineState::Stopped {
            debug!("already shut down");
            return;
        }

        self.stop();

        let drained = self.taps.remove_all();
        if drained > 0 {
            debug!(drained, "drained taps installed during stop");
        }

        self.quit = true;
        self.run_loop.stop();
        self.transition_to(EngineState::Stopped);
    }

    fn transition_to(&mut self, new_state: EngineState) {
        info!(from = %self.state, to = %new_state, "engine state transition");
        self.state = new_state;
    }
}

impl<B: HookBackend> Drop for Orchestrator<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
