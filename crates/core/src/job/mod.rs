//! Job and file-task data types.
//!
//! A [`Job`] is one bulk-download request and its mutable progress state.
//! Each file the catalog enumerates becomes a [`FileTask`] owned exclusively
//! by its job. The orchestrator is the sole writer of these records; the
//! store replicates them across tiers.

mod types;

pub use types::{
    ArchiveRef, CreateJobRequest, FailureKind, FileTask, FileTaskStatus, GroupSelection, Job,
    JobFailure, JobStatus,
};
