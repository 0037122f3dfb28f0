//! Registry of hooked processes
//!
//! The registry is the single source of truth for "is this process hooked".
//! Every entry owns exactly one live hook; an entry is only created around a
//! successfully acquired hook and the hook is fully torn down before its
//! entry is deleted.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::platform::{Hook, HookBackend, Pid, ProcessInfo};

use super::event::EventMask;

/// A process with an installed keyboard hook
pub struct TappedProcess<H> {
    pub pid: Pid,
    pub name: String,
    hook: H,
}

/// Owns the pid → hook registry and the backend that creates hooks
pub struct TapManager<B: HookBackend> {
    backend: B,
    registry: HashMap<Pid, TappedProcess<B::Hook>>,
}

impl<B: HookBackend> TapManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: HashMap::new(),
        }
    }

    /// Install a hook for `pid` unless one is already installed.
    ///
    /// Returns true if a new hook was installed. Acquisition failures are
    /// logged and leave the registry untouched.
    pub fn install_hook(&mut self, pid: Pid, name: &str) -> bool {
        if self.registry.contains_key(&pid) {
            debug!(pid, name, "event tap already installed");
            return false;
        }

        match self.backend.acquire(pid, name, EventMask::KEYBOARD) {
            Ok(hook) => {
                self.registry.insert(
                    pid,
                    TappedProcess {
                        pid,
                        name: name.to_string(),
                        hook,
                    },
                );
                info!(pid, name, "event tap created");
                true
            }
            Err(e) => {
                warn!(pid, name, error = %e, "failed to create event tap");
                false
            }
        }
    }

    /// Tear down and forget the hook for `pid`, if any.
    ///
    /// Order is disable, invalidate, detach, delete: once disabled no further
    /// event can reach the callback while the rest of the teardown runs.
    pub fn remove_hook(&mut self, pid: Pid) -> bool {
        let Some(tapped) = self.registry.get_mut(&pid) else {
            return false;
        };

        tapped.hook.disable();
        tapped.hook.invalidate();
        tapped.hook.detach();

        if let Some(tapped) = self.registry.remove(&pid) {
            info!(pid = tapped.pid, name = %tapped.name, "removed event tap");
        }
        true
    }

    /// Remove every hook. Returns how many were removed.
    pub fn remove_all(&mut self) -> usize {
        let pids: Vec<Pid> = self.registry.keys().copied().collect();
        pids.into_iter().filter(|pid| self.remove_hook(*pid)).count()
    }

    /// Full reset: remove every hook, then hook each running process whose
    /// name is in `desired`. Returns the number of hooks installed.
    pub fn reconcile<I>(&mut self, desired: &HashSet<String>, running: I) -> usize
    where
        I: IntoIterator<Item = ProcessInfo>,
    {
        let removed = self.remove_all();

        let installed = running
            .into_iter()
            .filter(|process| desired.contains(&process.name))
            .filter(|process| self.install_hook(process.pid, &process.name))
            .count();

        debug!(removed, installed, "reconciled event taps");
        installed
    }

    #[cfg(test)]
    pub fn is_hooked(&self, pid: Pid) -> bool {
        self.registry.contains_key(&pid)
    }

    /// Name the hook for `pid` was installed under
    pub fn hooked_name(&self, pid: Pid) -> Option<&str> {
        self.registry.get(&pid).map(|tapped| tapped.name.as_str())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    #[cfg(test)]
    pub fn tapped(&self) -> impl Iterator<Item = &TappedProcess<B::Hook>> {
        self.registry.values()
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: HookBackend> Drop for TapManager<B> {
    fn drop(&mut self) {
        self.remove_all();
    }
}
