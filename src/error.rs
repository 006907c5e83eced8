//! Error types surfaced by the protection engine.
//!
//! KV unavailability, lock-acquire failures, and the like are recovered
//! internally and never reach the caller — they are logged via `tracing`
//! and the engine degrades. Only the variants below are the caller's to
//! handle.

use thiserror::Error;

/// Errors the caller of [`crate::engine::ProtectionEngine`] may observe.
#[derive(Debug, Error)]
pub enum GuardError {
    /// `load_fn` returned an error; nothing was written to the KV store.
    #[error("load function failed: {0}")]
    LoadFnFailed(#[source] anyhow::Error),

    /// `load_fn` did not complete within `sync_load_timeout_s`.
    #[error("load timed out")]
    LoadTimeout,

    /// The read was cancelled via the caller-supplied cancellation signal.
    #[error("request cancelled")]
    Cancelled,
}
