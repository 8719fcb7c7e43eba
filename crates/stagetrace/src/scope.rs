//! Task-local tracer scope.
//!
//! Installs a tracer for the duration of an async operation so deeply nested
//! code can record stages without threading a `&Tracer` through every call.
//! The free functions here are no-ops when no tracer is installed.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::tracer::Tracer;
use crate::types::{Record, Stage};

tokio::task_local! {
    static CURRENT_TRACER: Arc<Tracer>;
}

/// Execute an async operation with a fresh tracer installed.
///
/// Returns both the operation result and the tracer it recorded into.
pub async fn with_tracer<F, T>(f: F) -> (T, Tracer)
where
    F: Future<Output = T>,
{
    let tracer = Arc::new(Tracer::new());
    let result = with_shared_tracer(Arc::clone(&tracer), f).await;

    // Spawned tasks may still hold a clone; fall back to a copy.
    let tracer = Arc::try_unwrap(tracer).unwrap_or_else(|shared| (*shared).clone());
    (result, tracer)
}

/// Execute an async operation with an existing tracer installed.
///
/// The caller keeps its own handle, which is useful when the tracer is also
/// recorded into outside the scope or handed to spawned tasks.
pub async fn with_shared_tracer<F, T>(tracer: Arc<Tracer>, f: F) -> T
where
    F: Future<Output = T>,
{
    CURRENT_TRACER.scope(tracer, f).await
}

/// Check if a tracer is installed in the current task.
pub fn is_tracing_active() -> bool {
    CURRENT_TRACER.try_with(|_| ()).is_ok()
}

/// Handle to the installed tracer, for passing into spawned tasks.
pub fn current_tracer() -> Option<Arc<Tracer>> {
    CURRENT_TRACER.try_with(Arc::clone).ok()
}

/// Append `{key: value}` to `stage` of the installed tracer (no-op if none).
pub fn record_value(stage: &str, key: impl Into<String>, value: impl Into<Value>) {
    let _ = CURRENT_TRACER.try_with(|t| t.record_value(stage, key, value));
}

/// Append `record` to `stage` of the installed tracer (no-op if none).
pub fn record_info(stage: &str, record: Record) {
    let _ = CURRENT_TRACER.try_with(|t| t.record_info(stage, record));
}

/// Copy of the installed tracer's stages (None if no tracer is installed).
pub fn current_snapshot() -> Option<Vec<Stage>> {
    CURRENT_TRACER.try_with(|t| t.snapshot()).ok()
}
