//! Errors of scheduler construction and lifecycle calls.

use std::io;

use thiserror::Error;

/// Errors returned by [`Scheduler`](crate::Scheduler) construction and
/// lifecycle calls.
///
/// Failures while collecting or pushing are never returned; they are
/// reported through the scheduler's [`Logger`](crate::Logger).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No sink was supplied.
    #[error("sink is not initialized")]
    SinkMissing,
    /// `start` was called on a scheduler that is already running.
    #[error("scheduler is already running")]
    AlreadyRunning,
    /// `start` was called after `shutdown`.
    #[error("scheduler has been shut down")]
    Stopped,
    /// The worker thread could not be spawned.
    #[error("failed to spawn scheduler thread")]
    Spawn(#[source] io::Error),
}

/// A `Result` specialized for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;
