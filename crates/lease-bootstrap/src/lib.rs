//! lease-bootstrap — turns a freshly booted machine into a running service.
//!
//! A [`BootstrapPlan`] is an ordered list of [`BootstrapStep`] descriptors
//! built once and consumed by a single sequential [`Orchestrator`].
//!
//! # Execution rules
//!
//! ```text
//! for step in plan (in authored order):
//!     if step.idempotent and step.check exits 0:
//!         Skipped
//!     else:
//!         run step.action
//!         exit 0  → Applied
//!         else    → Failed, stop (no retry, no rollback)
//! ```
//!
//! A failed bootstrap leaves the instance partially provisioned. The step
//! records (exit code, output tails) are the only recovery aid; the remedy
//! is replacing the lease, not repairing it in place.
//!
//! On success a [`CompletionMarker`] carrying the descriptor fingerprint is
//! written, so the plan runs exactly once per instance lifetime.

pub mod error;
pub mod marker;
pub mod orchestrator;
pub mod reference;
pub mod runner;
pub mod step;

pub use error::{BootstrapError, BootstrapResult};
pub use marker::CompletionMarker;
pub use orchestrator::{
    BootstrapOutcome, BootstrapReport, Orchestrator, RunOnce, StepOutcome, StepRecord,
};
pub use reference::{ReferenceParams, ScriptAsset, reference_plan};
pub use runner::{ActionOutput, ShellRunner, StepRunner};
pub use step::{BootstrapPlan, BootstrapStep, PlanBuilder, StepAction};
