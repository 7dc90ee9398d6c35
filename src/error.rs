//! Crate-wide error type.
//!
//! Every fallible operation on the public control surface fails with one of
//! these kinds; the link-layer internals (join, tx, rx) never surface errors
//! directly — they log and keep the server running (see `server.rs`).

use thiserror::Error;

/// A single error kind for every fallible operation in this crate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GatewayError {
    /// Operation attempted on an unopened, or already-closed, gateway handle.
    #[error("gateway is not open")]
    Ebadf,
    /// `open` attempted while a server loop is already running.
    #[error("gateway is already open")]
    Emfile,
    /// Invalid argument: bad channel, bad slot id, or a size mismatch.
    #[error("invalid argument")]
    Einval,
    /// A resource could not be allocated (e.g. the loop thread could not be spawned).
    #[error("out of resources")]
    Enomem,
    /// Channel acquisition failed: every channel in the scan band is occupied.
    #[error("no free channel")]
    Eusers,
    /// A pending `accept` was cancelled.
    #[error("operation cancelled")]
    Ecanceled,
    /// The persistent identity store reports an inconsistent size header.
    #[error("persistent store is corrupt")]
    Efault,
}
