//! Per-process keyboard taps
//!
//! Holds the modifier swap rule, the callback rule every tap runs, and the
//! registry that keeps installed taps consistent with the desired apps.

mod event;
mod flags;
mod manager;

pub use event::{intercept, Disposition, EventKind, EventMask, InterceptedEvent};
pub use flags::{swap_command_option, ModifierFlags};
pub use manager::{TapManager, TappedProcess};
