//! lease-idle — terminates the lease once nobody has used the workload
//! for long enough.
//!
//! # State machine
//!
//! ```text
//!            sample: idle                 idle for >= threshold
//!   ACTIVE ─────────────────→ IDLE_PENDING ─────────────────────→ SHUTTING_DOWN
//!     ↑                           │                                (terminal)
//!     └──── sample: active ───────┘
//! ```
//!
//! The idle timer resets fully on any activity. A sample that fails or
//! times out counts as activity: keeping the instance up by mistake is
//! cheaper than losing a session by mistake.
//!
//! On entering `SHUTTING_DOWN` the daemon requests one final sync and waits
//! for it (bounded), then terminates the instance. Nothing here is
//! persisted; a restarted daemon starts a fresh idle timer.

pub mod daemon;
pub mod decision;
pub mod error;
pub mod probe;
pub mod terminate;

pub use daemon::{FinalSync, IdleExit, IdleSettings, IdleShutdownDaemon};
pub use decision::{IdleState, ShutdownDecision};
pub use error::{SamplingError, TerminateError};
pub use probe::{ActivityProbe, ActivitySignal, CommandProbe, sample_fail_safe};
pub use terminate::{CommandTerminator, Terminator};
