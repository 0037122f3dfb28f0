//! Process lifecycle notifications by polling a process source

mod monitor;

pub use monitor::{diff_process_tables, ProcessMonitor, ProcessTable};

#[cfg(any(test, not(target_os = "macos")))]
pub use monitor::SysinfoProcesses;
