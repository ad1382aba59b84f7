//! Progress reporting trait for partition batch stages.
//!
//! Decouples batch progress from any rendering backend. The CLI wires
//! in `indicatif` bars; library callers and tests use the silent
//! implementation.

use std::sync::Arc;

/// Reports progress while a pipeline stage walks a batch of partitions.
///
/// Implementations must be `Send + Sync` so one callback can be shared
/// via `Arc` across stages.
pub trait ProgressCallback: Send + Sync {
    /// Declare how many partitions the stage is about to process.
    fn begin(&self, total: u64);

    /// Label the partition currently being processed.
    fn stage(&self, label: String);

    /// Record one processed partition, whether it succeeded or not.
    fn advance(&self);

    /// Tear down the indicator once the stage has finished.
    fn complete(&self);
}

/// A [`ProgressCallback`] that ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn begin(&self, _total: u64) {}
    fn stage(&self, _label: String) {}
    fn advance(&self) {}
    fn complete(&self) {}
}

/// Returns a shared [`NullProgress`] instance for convenient use.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
