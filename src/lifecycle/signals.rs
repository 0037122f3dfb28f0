//! Signal multiplexing
//!
//! Each signal number gets one listener task on the runtime; a group of
//! signals shares one action. The first group to claim a signal keeps it.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Action run with the signal number that fired
pub type SignalAction = Arc<dyn Fn(i32) + Send + Sync>;

/// Identifies the group created by one `add_handler` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct HandlerGroup {
    id: HandlerId,
    signals: Vec<i32>,
}

pub struct SignalMultiplexer {
    runtime: Handle,
    listeners: HashMap<i32, (HandlerId, JoinHandle<()>)>,
    groups: Vec<HandlerGroup>,
    next_id: u64,
}

impl SignalMultiplexer {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            listeners: HashMap::new(),
            groups: Vec::new(),
            next_id: 0,
        }
    }

    /// Route `signals` to `action`.
    ///
    /// Signals already claimed by an earlier group are skipped. Registering
    /// a listener replaces the signal's default disposition.
    pub fn add_handler(&mut self, signals: &[i32], action: SignalAction) -> io::Result<HandlerId> {
        let id = HandlerId(self.next_id);
        self.next_id += 1;

        let mut installed = Vec::new();
        for &signo in signals {
            if self.is_claimed(signo) || installed.iter().any(|(s, _)| *s == signo) {
                debug!(signal = signo, "signal already handled, skipping");
                continue;
            }

            match self.listen(signo, Arc::clone(&action)) {
                Ok(listener) => installed.push((signo, listener)),
                Err(e) => {
                    for (_, listener) in installed {
                        listener.abort();
                    }
                    return Err(e);
                }
            }
        }

        for (signo, listener) in installed {
            debug!(signal = signo, "signal listener installed");
            self.listeners.insert(signo, (id, listener));
        }

        self.groups.push(HandlerGroup {
            id,
            signals: signals.to_vec(),
        });

        Ok(id)
    }

    /// Stop listening for `signals` and forget groups fully covered by them
    pub fn remove_handler(&mut self, signals: &[i32]) {
        for signo in signals {
            if let Some((_, listener)) = self.listeners.remove(signo) {
                listener.abort();
            }
        }
        self.groups.retain(|group| {
            let covered = group.signals.iter().all(|signo| signals.contains(signo));
            if covered {
                debug!(group = ?group.id, "signal handler group removed");
            }
            !covered
        });
    }

    /// Cancel every listener and forget every group
    pub fn cleanup(&mut self) {
        if self.listeners.is_empty() && self.groups.is_empty() {
            return;
        }
        for (_, (_, listener)) in self.listeners.drain() {
            listener.abort();
        }
        self.groups.clear();
        info!("signal handlers removed");
    }

    /// Group whose action runs when `signo` fires
    #[cfg(test)]
    pub fn handler_for(&self, signo: i32) -> Option<HandlerId> {
        self.listeners.get(&signo).map(|(id, _)| *id)
    }

    fn is_claimed(&self, signo: i32) -> bool {
        self.groups.iter().any(|group| group.signals.contains(&signo))
    }

    fn listen(&self, signo: i32, action: SignalAction) -> io::Result<JoinHandle<()>> {
        // signal() must be called from within the runtime.
        let _guard = self.runtime.enter();
        let mut stream = signal(SignalKind::from_raw(signo))?;

        Ok(self.runtime.spawn(async move {
            while stream.recv().await.is_some() {
                action(signo);
            }
        }))
    }
}

impl Drop for SignalMultiplexer {
    fn drop(&mut self) {
        self.cleanup();
    }
}
