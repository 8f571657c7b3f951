//! Error taxonomy shared by both bridges.
//!
//! Nothing in this enum ever crosses the interop edge: the JNI and C ABI
//! layers log the error and hand the caller a sentinel (0, null, empty,
//! `false`) instead.

use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;

/// Errors from bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Null, released, or foreign handle.
    #[error("invalid handle {0:#x}")]
    InvalidHandle(i64),

    /// The native resource could not be constructed.
    #[error("failed to load {path}: {source:#}")]
    Load {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Model type outside {kitten, vits, kokoro, matcha}.
    #[error("unsupported model type '{0}'")]
    UnsupportedModelType(String),

    /// Argument out of range or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Synthesizer used after `destroy`.
    #[error("synthesizer has been destroyed")]
    Destroyed,

    /// Failure inside the wrapped inference engine.
    #[error("engine error: {0:#}")]
    Engine(#[from] anyhow::Error),
}

impl BridgeError {
    pub(crate) fn load(path: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Load { path: path.into(), source }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Run `f`, turning a panic into `fallback` so it never unwinds into the
/// foreign caller.  Used by every exported JNI and C ABI function.
pub(crate) fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => v,
        Err(_) => {
            tracing::error!("[{name}] panicked; returning sentinel");
            fallback
        }
    }
}
