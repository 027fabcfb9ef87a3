//! Error taxonomy for the executor and the log segment.
//!
//! The two halves of this crate fail independently and are kept on separate
//! error enums so that matching on one never has to account for variants
//! that can only originate from the other.

use std::error::Error as StdError;

use thiserror::Error;

use crate::executor::OperationId;

/// Errors produced by [`crate::executor::Executor`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// `apply` was called with an [`OperationId`] that has no registered
    /// handler. Fatal to the caller.
    #[error("no handler registered for operation {0:?}")]
    UnknownOperation(OperationId),

    /// The handler for `op_id` returned an error. Surfaced only after the
    /// post-op task queue has fully drained.
    #[error("handler for operation {op_id:?} failed: {source}")]
    ApplicationError {
        /// The operation whose handler failed.
        op_id: OperationId,
        /// The underlying error the handler returned.
        source: Box<dyn StdError + Send + Sync>,
    },

    /// `execute`/`schedule` was called while the current operation is not a
    /// COMMAND (or while no operation is in progress at all).
    #[error("{attempted} is only legal during a COMMAND")]
    IllegalContext {
        /// Name of the call that was rejected, e.g. `"schedule"`.
        attempted: &'static str,
    },
}

/// Result alias for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors produced by [`crate::log_segment::LogSegment`].
#[derive(Debug, Error)]
pub enum LogError {
    /// The segment was used in a way its lifecycle forbids: operating on a
    /// closed segment, or opening one that is already open.
    #[error("illegal log segment state: {0}")]
    IllegalState(String),

    /// A read encountered a stored index strictly greater than the index it
    /// was looking for. The log is missing an entry and cannot be trusted
    /// past this point.
    #[error("log corruption: sought index {sought} but next stored index is {found}")]
    MissingEntries {
        /// The index the read was looking for.
        sought: u64,
        /// The stored index the scan actually encountered.
        found: u64,
    },

    /// The underlying file I/O failed during open, append, compact, flush,
    /// close, or delete.
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for log segment operations.
pub type LogResult<T> = Result<T, LogError>;
