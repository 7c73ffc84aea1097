//! Job orchestrator.
//!
//! Owns the job lifecycle: a request becomes a `pending` record, enumeration
//! expands it into file tasks, fetchers are driven through the governor, and
//! completion triggers archive assembly. The orchestrator is the sole writer
//! of job state; every mutation goes through the store's read-modify-write
//! path so racing completions never lose counter updates.

mod runner;
mod types;

pub use runner::JobOrchestrator;
pub use types::{JobError, OrchestratorStatus};
