//! Intercepted keyboard events and the per-tap callback rule

use std::fmt;

use tracing::debug;

use crate::platform::Pid;

use super::flags::{swap_command_option, ModifierFlags};

/// Kind of event delivered to a tap callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A key was pressed
    KeyDown,
    /// A modifier key changed state
    FlagsChanged,
    /// Anything else, including tap-disabled notifications
    Other,
}

/// Event types a tap subscribes to, as a CGEventMask-compatible bit set
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EventMask(u64);

impl EventMask {
    /// kCGEventKeyDown
    pub const KEY_DOWN: Self = Self(1 << 10);
    /// kCGEventFlagsChanged
    pub const FLAGS_CHANGED: Self = Self(1 << 12);
    /// What every per-process tap listens to
    pub const KEYBOARD: Self = Self(Self::KEY_DOWN.0 | Self::FLAGS_CHANGED.0);

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Debug for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventMask({:#x})", self.0)
    }
}

/// A keyboard event as seen by a tap callback. Never stored.
#[derive(Debug, Clone, Copy)]
pub struct InterceptedEvent {
    pub kind: EventKind,
    pub flags: ModifierFlags,
    /// Process the event is being delivered to
    pub target_pid: Pid,
}

/// What the callback wants done with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Deliver the event unchanged
    PassThrough,
    /// Replace the event's modifier flags
    Rewrite(ModifierFlags),
}

/// Callback rule for a tap owned by `owner`.
///
/// Only key-down events addressed to the owning process are considered; the
/// rest pass through so a tap can never rewrite another process's input.
pub fn intercept(owner: Pid, event: &InterceptedEvent) -> Disposition {
    if event.kind != EventKind::KeyDown {
        return Disposition::PassThrough;
    }

    if event.target_pid != owner {
        return Disposition::PassThrough;
    }

    match swap_command_option(event.flags) {
        Some(flags) => {
            debug!(pid = owner, from = %event.flags, to = %flags, "option^=command");
            Disposition::Rewrite(flags)
        }
        None => Disposition::PassThrough,
    }
}
