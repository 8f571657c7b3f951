//! One-shot `tracing` subscriber installation for host apps.
//!
//! The library itself only emits `tracing` events.  Hosts that have no
//! subscriber of their own call [`init`] (the JNI `JNI_OnLoad` hook and
//! `ra_init_logging` do so) to get formatted output filtered by `RUST_LOG`.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INSTALLED: OnceCell<bool> = OnceCell::new();

/// Install a fmt subscriber with an `EnvFilter` (default `info`).
///
/// Returns `true` if this crate's subscriber is the active global one.
/// A subscriber already set by the host is left in place.
pub fn init() -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).with_target(true).try_init().is_ok()
    })
}
