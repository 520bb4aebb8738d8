//! lease-sync — copies the workload's save-state directory to durable
//! storage on a fixed interval.
//!
//! # Architecture
//!
//! ```text
//! SyncDaemon (one task)
//!   ├── interval tick ─────────┐
//!   ├── SyncHandle requests ───┼─→ Synchronizer::sync_once (mutex-guarded)
//!   └── control socket ────────┘        └── Syncer (storage-sync command)
//! ```
//!
//! Every run is independent and overwrites the destination (last writer
//! wins). A failed run is logged and the next tick tries again; nothing
//! here ever stops the daemon or touches the workload. At most one sync
//! runs against the destination at any time.

pub mod control;
pub mod daemon;
pub mod error;
pub mod job;
pub mod syncer;

pub use control::{SocketTrigger, serve_control_socket};
pub use daemon::{SyncDaemon, SyncHandle, SyncTrigger, Synchronizer};
pub use error::{SyncError, SyncResult};
pub use job::SyncJob;
pub use syncer::{CommandSyncer, Syncer};
