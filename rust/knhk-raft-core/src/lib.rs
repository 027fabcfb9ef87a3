//! Deterministic executor and segmented log for a Raft-replicated state
//! machine.
//!
//! This crate provides the two pieces of a replicated service that sit
//! below the consensus layer and above raw storage:
//!
//! - [`executor`] — applies committed entries to a user state machine under
//!   a replicated logical clock, with a deterministic scheduler for timer
//!   callbacks.
//! - [`log_segment`] — a crash-safe, append-only, indexed on-disk log
//!   segment with tombstone truncation and compaction.
//!
//! Both components are single-threaded by contract: a single "service
//! thread" owns all state, and there is no internal locking. Composing them
//! into a running replica (leader election, networking, snapshotting
//! across segments) is the job of an external orchestrator and is out of
//! scope for this crate.

#![warn(missing_docs)]

pub mod error;
pub mod executor;
pub mod log_segment;

pub use error::{ExecutorError, ExecutorResult, LogError, LogResult};
pub use executor::{Commit, Executor, Handler, OperationId, OperationKind, Scheduled};
pub use log_segment::LogSegment;

/// Crate version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
