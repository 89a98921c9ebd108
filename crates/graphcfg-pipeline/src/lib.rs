//! Pipeline Driver: topological ordering, cycle detection, and
//! bounded-concurrency rendering of the resource graph.

pub mod config;
pub mod driver;
pub mod prepare;
pub mod topo;

pub use config::PipelineConfig;
pub use driver::{run, PipelineReport, VertexOutcome};
pub use prepare::{PrepareError, Preparer, PreparerRegistry, RenderContext, Task};
pub use topo::topological_order;

use graphcfg_core::vertex::VertexId;
use std::time::Duration;

/// Errors the Pipeline Driver itself raises, as opposed to failures of an
/// individual vertex's `Prepare` call.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("dependency cycle: {}", format_cycle(.0))]
    CycleDetected(Vec<VertexId>),
    #[error("resource kind {0:?} already registered")]
    AlreadyRegistered(String),
    #[error("invalid field {field}: {reason}")]
    ValidationError { field: String, reason: String },
    #[error("vertex {vertex} timed out after {duration:?}")]
    Timeout { vertex: VertexId, duration: Duration },
    #[error("pipeline run was cancelled")]
    Aborted,
}

fn format_cycle(ids: &[VertexId]) -> String {
    ids.iter()
        .map(VertexId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
