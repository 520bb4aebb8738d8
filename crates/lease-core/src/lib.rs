//! lease-core — shared types for the ephemeral game-server lease.
//!
//! Holds the immutable [`LeaseDescriptor`] that shapes a lease, the
//! [`DaemonConfig`] read by the lifecycle daemons, and the small helpers
//! (duration strings, fixed-interval schedules) both sides agree on.
//!
//! A running instance's effective configuration is always exactly the
//! descriptor that created it. [`LeaseDescriptor::fingerprint`] gives that
//! descriptor a stable identity so drift can be detected instead of repaired.

pub mod config;
pub mod descriptor;
pub mod duration;
pub mod error;
pub mod schedule;

pub use config::{DaemonConfig, IdleConfig, SyncConfig};
pub use descriptor::{LeaseDescriptor, MachineProfile, NetworkRule, Protocol};
pub use duration::{epoch_secs, parse_duration};
pub use error::{ProvisioningError, ProvisioningResult};
pub use schedule::Schedule;
