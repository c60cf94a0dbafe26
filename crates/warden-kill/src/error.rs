//! Errors raised while signalling processes.

use thiserror::Error;

/// Failure to deliver a signal to (or inspect) a process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KillError {
    /// The process disappeared between inspection and signalling.
    #[error("process {pid} no longer exists")]
    Vanished {
        /// Process id that could not be found.
        pid: u32,
    },

    /// The caller lacks the privileges to signal the target.
    #[error("not permitted to signal process {pid}")]
    PermissionDenied {
        /// Process id that refused the signal.
        pid: u32,
    },

    /// The operating system rejected the signal for another reason.
    #[error("signalling process {pid} failed: {message}")]
    Signal {
        /// Process id the signal was aimed at.
        pid: u32,
        /// Error text reported by the operating system.
        message: String,
    },
}
