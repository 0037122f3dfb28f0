//! The orchestrator: owns the desired app set and the tap registry, and runs
//! the single loop every notification is funneled through
//!
//! States:
//! - Idle: constructed, `configure` may already have installed taps
//! - Running: lifecycle notifications attached, loop active
//! - Stopping: notifications detached, taps removed
//! - Stopped: loop told to exit, registry drained

mod orchestrator;

pub use orchestrator::{EngineError, EngineState, Orchestrator, LOOP_TICK};
