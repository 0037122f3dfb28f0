//! In-memory capability implementations shared by unit tests

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::events::LoopEvent;
use crate::platform::{
    Hook, HookBackend, HookError, LifecycleError, LifecycleSource, Pid, ProcessInfo,
    ProcessSource, RunLoop,
};
use crate::tap::EventMask;

pub fn names<const N: usize>(items: [&str; N]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

type Journal = Rc<RefCell<Vec<String>>>;

/// Records every acquire and teardown step in a shared journal
#[derive(Default)]
pub struct MockBackend {
    journal: Journal,
    failing: HashSet<Pid>,
}

impl MockBackend {
    pub fn failing<const N: usize>(pids: [Pid; N]) -> Self {
        Self {
            journal: Journal::default(),
            failing: pids.into_iter().collect(),
        }
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }

    pub fn journal_handle(&self) -> Journal {
        Rc::clone(&self.journal)
    }

    pub fn acquired(&self) -> usize {
        self.journal
            .borrow()
            .iter()
            .filter(|entry| entry.starts_with("acquire "))
            .count()
    }
}

impl HookBackend for MockBackend {
    type Hook = MockHook;

    fn acquire(&mut self, pid: Pid, name: &str, mask: EventMask) -> Result<MockHook, HookError> {
        assert_eq!(mask, EventMask::KEYBOARD);
        if self.failing.contains(&pid) {
            return Err(HookError::Creation {
                pid,
                name: name.to_string(),
                reason: "mock failure".to_string(),
            });
        }
        self.journal.borrow_mut().push(format!("acquire {pid}"));
        Ok(MockHook {
            pid,
            journal: Rc::clone(&self.journal),
        })
    }
}

pub struct MockHook {
    pid: Pid,
    journal: Journal,
}

impl Hook for MockHook {
    fn disable(&mut self) {
        self.journal.borrow_mut().push(format!("disable {}", self.pid));
    }

    fn invalidate(&mut self) {
        self.journal.borrow_mut().push(format!("invalidate {}", self.pid));
    }

    fn detach(&mut self) {
        self.journal.borrow_mut().push(format!("detach {}", self.pid));
    }
}

impl Drop for MockHook {
    fn drop(&mut self) {
        self.journal.borrow_mut().push(format!("drop {}", self.pid));
    }
}

/// A process table tests can edit while the orchestrator holds it
#[derive(Clone, Default)]
pub struct MockProcesses {
    table: Rc<RefCell<Vec<ProcessInfo>>>,
}

impl MockProcesses {
    pub fn with<const N: usize>(processes: [(Pid, &str); N]) -> Self {
        let table = processes
            .into_iter()
            .map(|(pid, name)| ProcessInfo::new(pid, name))
            .collect();
        Self {
            table: Rc::new(RefCell::new(table)),
        }
    }

    pub fn launch(&self, pid: Pid, name: &str) {
        self.table.borrow_mut().push(ProcessInfo::new(pid, name));
    }
}

impl ProcessSource for MockProcesses {
    fn running_processes(&mut self) -> Vec<ProcessInfo> {
        self.table.borrow().clone()
    }
}

/// Counts subscriptions and keeps the sender so tests can inject events
#[derive(Clone, Default)]
pub struct MockLifecycle {
    state: Rc<RefCell<LifecycleState>>,
}

#[derive(Default)]
struct LifecycleState {
    subscribes: usize,
    unsubscribes: usize,
    sender: Option<mpsc::UnboundedSender<LoopEvent>>,
}

impl MockLifecycle {
    pub fn subscribes(&self) -> usize {
        self.state.borrow().subscribes
    }

    pub fn unsubscribes(&self) -> usize {
        self.state.borrow().unsubscribes
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.borrow().sender.is_some()
    }
}

impl LifecycleSource for MockLifecycle {
    fn subscribe(&mut self, events: mpsc::UnboundedSender<LoopEvent>) -> Result<(), LifecycleError> {
        let mut state = self.state.borrow_mut();
        if state.sender.is_some() {
            return Err(LifecycleError::AlreadySubscribed);
        }
        state.subscribes += 1;
        state.sender = Some(events);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        let mut state = self.state.borrow_mut();
        if state.sender.take().is_some() {
            state.unsubscribes += 1;
        }
    }
}

/// Run loop with no platform sources; counts stop requests
#[derive(Clone, Default)]
pub struct MockLoop {
    ticks: Rc<RefCell<usize>>,
    stops: Rc<RefCell<usize>>,
}

impl MockLoop {
    pub fn ticks(&self) -> usize {
        *self.ticks.borrow()
    }

    pub fn stops(&self) -> usize {
        *self.stops.borrow()
    }
}

impl RunLoop for MockLoop {
    fn run_for(&mut self, _timeout: Duration) {
        *self.ticks.borrow_mut() += 1;
    }

    fn stop(&self) {
        *self.stops.borrow_mut() += 1;
    }
}
