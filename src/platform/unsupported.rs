//! Fallback for hosts without CGEventTap: hooks can never be acquired

use std::thread;
use std::time::Duration;

use crate::tap::EventMask;

use super::{Hook, HookBackend, HookError, PermissionError, Pid, RunLoop};

pub fn check_accessibility() -> Result<(), PermissionError> {
    Err(PermissionError::Unsupported)
}

pub struct NoHook;

impl Hook for NoHook {
    fn disable(&mut self) {}
    fn invalidate(&mut self) {}
    fn detach(&mut self) {}
}

pub struct UnsupportedBackend;

impl HookBackend for UnsupportedBackend {
    type Hook = NoHook;

    fn acquire(&mut self, _pid: Pid, _name: &str, _mask: EventMask) -> Result<NoHook, HookError> {
        Err(HookError::Unsupported)
    }
}

/// Sleeps for the tick; there are no platform sources to service
pub struct SleepLoop;

impl RunLoop for SleepLoop {
    fn run_for(&mut self, timeout: Duration) {
        thread::sleep(timeout);
    }

    fn stop(&self) {}
}
