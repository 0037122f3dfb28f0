//! Process table polling

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

#[cfg(any(test, not(target_os = "macos")))]
use sysinfo::{ProcessesToUpdate, System};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::events::LoopEvent;
use crate::platform::{LifecycleError, LifecycleSource, Pid, ProcessInfo, ProcessSource};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// pid → display name
pub type ProcessTable = HashMap<Pid, String>;

fn snapshot(source: &mut impl ProcessSource) -> ProcessTable {
    source
        .running_processes()
        .into_iter()
        .map(|process| (process.pid, process.name))
        .collect()
}

/// Every process on the host, named by executable.
///
/// Used where no display names are available.
#[cfg(any(test, not(target_os = "macos")))]
pub struct SysinfoProcesses {
    system: System,
}

#[cfg(any(test, not(target_os = "macos")))]
impl SysinfoProcesses {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

#[cfg(any(test, not(target_os = "macos")))]
impl Default for SysinfoProcesses {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, not(target_os = "macos")))]
impl ProcessSource for SysinfoProcesses {
    fn running_processes(&mut self) -> Vec<ProcessInfo> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        self.system
            .processes()
            .iter()
            .map(|(pid, process)| {
                ProcessInfo::new(
                    pid.as_u32() as Pid,
                    process.name().to_string_lossy().into_owned(),
                )
            })
            .collect()
    }
}

/// Launch/terminate events between two snapshots of the process table.
///
/// A pid that reappears under another name is reported as a termination
/// followed by a launch. Terminations come first; each group is ordered by
/// pid.
pub fn diff_process_tables(previous: &ProcessTable, current: &ProcessTable) -> Vec<LoopEvent> {
    let mut terminated: Vec<Pid> = previous
        .iter()
        .filter(|(pid, name)| current.get(*pid) != Some(*name))
        .map(|(pid, _)| *pid)
        .collect();
    terminated.sort_unstable();

    let mut launched: Vec<(Pid, &String)> = current
        .iter()
        .filter(|(pid, name)| previous.get(*pid) != Some(*name))
        .map(|(pid, name)| (*pid, name))
        .collect();
    launched.sort_unstable_by_key(|(pid, _)| *pid);

    terminated
        .into_iter()
        .map(|pid| LoopEvent::ProcessTerminated { pid })
        .chain(launched.into_iter().map(|(pid, name)| LoopEvent::ProcessLaunched {
            pid,
            name: name.clone(),
        }))
        .collect()
}

/// Polls a process source and reports launches and terminations.
///
/// Each subscription polls its own `S`. The baseline is the table at
/// subscribe time, so processes already running are left to the
/// reconciliation scan.
pub struct ProcessMonitor<S> {
    runtime: Handle,
    poll_interval: Duration,
    task: Option<JoinHandle<()>>,
    source: PhantomData<fn() -> S>,
}

impl<S> ProcessMonitor<S> {
    pub fn new(runtime: Handle) -> Self {
        Self::with_interval(runtime, POLL_INTERVAL)
    }

    pub fn with_interval(runtime: Handle, poll_interval: Duration) -> Self {
        Self {
            runtime,
            poll_interval,
            task: None,
            source: PhantomData,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.task.is_some()
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("process monitor stopped");
        }
    }
}

impl<S> LifecycleSource for ProcessMonitor<S>
where
    S: ProcessSource + Default + Send + 'static,
{
    fn subscribe(&mut self, events: mpsc::UnboundedSender<LoopEvent>) -> Result<(), LifecycleError> {
        if self.task.is_some() {
            return Err(LifecycleError::AlreadySubscribed);
        }

        let mut source = S::default();
        let mut known = snapshot(&mut source);
        let poll_interval = self.poll_interval;

        self.task = Some(self.runtime.spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let current = snapshot(&mut source);
                for event in diff_process_tables(&known, &current) {
                    debug!(%event, "process lifecycle change");
                    if events.send(event).is_err() {
                        return;
                    }
                }
                known = current;
            }
        }));

        info!(interval_ms = poll_interval.as_millis() as u64, "process monitor started");
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.stop();
    }
}

impl<S> Drop for ProcessMonitor<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn table<const N: usize>(entries: [(Pid, &str); N]) -> ProcessTable {
        entries
            .into_iter()
            .map(|(pid, name)| (pid, name.to_string()))
            .collect()
    }

    #[test]
    fn test_diff_reports_launches_and_terminations() {
        let previous = table([(1, "Finder"), (2, "Safari")]);
        let current = table([(1, "Finder"), (3, "Mail"), (4, "Notes")]);

        assert_eq!(
            diff_process_tables(&previous, &current),
            vec![
                LoopEvent::ProcessTerminated { pid: 2 },
                LoopEvent::ProcessLaunched {
                    pid: 3,
                    name: "Mail".to_string()
                },
                LoopEvent::ProcessLaunched {
                    pid: 4,
                    name: "Notes".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_diff_pid_reuse() {
        let previous = table([(7, "Safari")]);
        let current = table([(7, "Mail")]);

        assert_eq!(
            diff_process_tables(&previous, &current),
            vec![
                LoopEvent::ProcessTerminated { pid: 7 },
                LoopEvent::ProcessLaunched {
                    pid: 7,
                    name: "Mail".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_diff_unchanged_is_empty() {
        let snapshot = table([(1, "Finder")]);
        assert!(diff_process_tables(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn test_enumerates_this_process() {
        let mut processes = SysinfoProcesses::new();
        let own = std::process::id() as Pid;
        assert!(processes.running_processes().iter().any(|p| p.pid == own));
    }

    #[tokio::test]
    async fn test_subscribe_twice_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut monitor = ProcessMonitor::<SysinfoProcesses>::with_interval(Handle::current(), Duration::from_secs(60));

        monitor.subscribe(tx.clone()).unwrap();
        assert!(matches!(
            monitor.subscribe(tx),
            Err(LifecycleError::AlreadySubscribed)
        ));

        monitor.unsubscribe();
        assert!(!monitor.is_subscribed());
    }

    /// Waits for a launch (with the given name) or termination of `target`
    async fn saw(
        rx: &mut mpsc::UnboundedReceiver<LoopEvent>,
        target: Pid,
        launched_as: Option<&str>,
    ) -> bool {
        let wait = async {
            while let Some(event) = rx.recv().await {
                match (&event, launched_as) {
                    (LoopEvent::ProcessLaunched { pid, name }, Some(expected))
                        if *pid == target && name == expected =>
                    {
                        return true
                    }
                    (LoopEvent::ProcessTerminated { pid }, None) if *pid == target => return true,
                    _ => {}
                }
            }
            false
        };
        tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .unwrap_or(false)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reports_child_lifecycle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut monitor = ProcessMonitor::<SysinfoProcesses>::with_interval(
            Handle::current(),
            Duration::from_millis(50),
        );
        monitor.subscribe(tx).unwrap();

        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let child_pid = child.id() as Pid;

        assert!(saw(&mut rx, child_pid, Some("sleep")).await);

        child.kill().unwrap();
        child.wait().unwrap();
        assert!(saw(&mut rx, child_pid, None).await);

        monitor.unsubscribe();
    }

    static APPS: Mutex<Vec<ProcessInfo>> = Mutex::new(Vec::new());

    /// Display names as a workspace would report them
    #[derive(Default)]
    struct Apps;

    impl ProcessSource for Apps {
        fn running_processes(&mut self) -> Vec<ProcessInfo> {
            APPS.lock().unwrap().clone()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reports_names_from_source() {
        APPS.lock().unwrap().push(ProcessInfo::new(10, "Finder"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut monitor =
            ProcessMonitor::<Apps>::with_interval(Handle::current(), Duration::from_millis(20));
        monitor.subscribe(tx).unwrap();

        APPS.lock()
            .unwrap()
            .push(ProcessInfo::new(77, "Visual Studio Code"));
        assert!(saw(&mut rx, 77, Some("Visual Studio Code")).await);

        APPS.lock().unwrap().retain(|app| app.pid != 77);
        assert!(saw(&mut rx, 77, None).await);

        monitor.unsubscribe();
    }
}
