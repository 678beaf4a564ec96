//! Application state for the web layer.

use crate::pipeline::PipelineHandle;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Access to the store, stats and event hub of the running pipeline
    pub pipeline: PipelineHandle,
}

impl AppState {
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self { pipeline }
    }
}
