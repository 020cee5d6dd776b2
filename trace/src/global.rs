//! Process-wide tracer registry.
//!
//! Libraries that do not want to thread a Tracer through every call can fetch
//! the one installed by the application at startup.

use std::sync::{PoisonError, RwLock};

use lazy_static::lazy_static;
use tracing::debug;

use crate::tracer::{FlushOutcome, Tracer};

lazy_static! {
    static ref GLOBAL_TRACER: RwLock<Option<Tracer>> = RwLock::new(None);
}

/// set_tracer installs tracer as the global tracer and returns the one it
/// replaces, if any. The replaced tracer is not shut down.
pub fn set_tracer(tracer: Tracer) -> Option<Tracer> {
    debug!(service = %tracer.config().service_name, "installing global tracer");
    GLOBAL_TRACER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(tracer)
}

/// tracer returns the global tracer, if one is installed.
pub fn tracer() -> Option<Tracer> {
    GLOBAL_TRACER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// shutdown removes the global tracer and shuts it down.
pub async fn shutdown() -> FlushOutcome {
    let tracer = GLOBAL_TRACER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match tracer {
        Some(tracer) => tracer.shutdown().await,
        None => FlushOutcome::default(),
    }
}
