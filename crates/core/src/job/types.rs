//! Core job data types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetcher::FetchErrorKind;

// ============================================================================
// Request Types
// ============================================================================

/// One requested group and the subgroups selected within it.
///
/// A group corresponds to a subject in the upstream catalog, a subgroup to a
/// specific exam season.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupSelection {
    /// Catalog identifier of the group.
    pub group_id: String,
    /// Catalog identifiers of the selected subgroups, in request order.
    pub subgroup_ids: Vec<String>,
}

/// Request to create a new bulk-download job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    /// The selection to download. Must contain at least one group, and every
    /// group must select at least one subgroup.
    pub requested_groups: Vec<GroupSelection>,
}

// ============================================================================
// Job State
// ============================================================================

/// Job lifecycle status.
///
/// Transitions are monotonic: `pending -> fetching -> assembling ->
/// completed`, with `fetching -> failed` and any non-terminal state
/// `-> cancelled`. There are no backward transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Fetching,
    Assembling,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Status name as persisted/serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Fetching => "fetching",
            JobStatus::Assembling => "assembling",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Why a job ended up `failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Enumeration produced zero files across the whole selection.
    EnumerationEmpty,
    /// Every enumerated file failed to download.
    AllDownloadsFailed,
    /// Archive assembly failed after at least one successful download.
    AssemblyFailed,
}

/// Terminal failure details recorded on a `failed` job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Opaque handle to an assembled archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveRef {
    /// Archive file name within the staging root.
    pub file_name: String,
    /// SHA-256 of the archive bytes, hex encoded.
    pub sha256: String,
    /// Archive size in bytes.
    pub size_bytes: u64,
}

// ============================================================================
// File Tasks
// ============================================================================

/// Lifecycle of a single file download within a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileTaskStatus {
    Pending,
    Downloading,
    Done,
    Failed,
}

impl FileTaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileTaskStatus::Done | FileTaskStatus::Failed)
    }
}

/// One file's download unit of work within a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileTask {
    /// Where to fetch the file from.
    pub source_url: String,
    /// Path of the entry inside the final archive, also the staging path
    /// relative to the job's staging directory.
    pub relative_target_path: String,
    pub status: FileTaskStatus,
    /// Network attempts consumed so far.
    #[serde(default)]
    pub attempt_count: u32,
    /// Set when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FetchErrorKind>,
    /// Bytes written to staging, set when `status` is `done`.
    #[serde(default)]
    pub bytes: u64,
}

impl FileTask {
    /// A fresh pending task for the given source and target.
    pub fn pending(source_url: impl Into<String>, relative_target_path: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            relative_target_path: relative_target_path.into(),
            status: FileTaskStatus::Pending,
            attempt_count: 0,
            error_kind: None,
            bytes: 0,
        }
    }
}

// ============================================================================
// Job Record
// ============================================================================

/// One bulk-download request and its mutable progress/result state.
///
/// All mutation goes through the store's read-modify-write path; the helper
/// methods here keep the derived counters consistent with `files` so a
/// completion can never be half-applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Unique identifier, assigned at creation, immutable.
    pub id: String,
    pub status: JobStatus,
    /// The input selection, immutable after creation.
    pub requested_groups: Vec<GroupSelection>,
    /// File tasks keyed by their archive path (stable, collision-free).
    #[serde(default)]
    pub files: BTreeMap<String, FileTask>,
    pub total_count: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    /// Set only when `status` is `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_ref: Option<ArchiveRef>,
    /// Set only when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    /// Per-subgroup enumeration soft failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation; drives TTL expiry.
    pub updated_at: DateTime<Utc>,
    /// Bumped on every read-modify-write; verified on durable-tier writes.
    #[serde(default)]
    pub revision: u64,
}

impl Job {
    /// Create a fresh `pending` job.
    pub fn new(id: impl Into<String>, requested_groups: Vec<GroupSelection>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            requested_groups,
            files: BTreeMap::new(),
            total_count: 0,
            completed_count: 0,
            failed_count: 0,
            archive_ref: None,
            failure: None,
            warnings: Vec::new(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Install the enumerated file list and reset the counters.
    pub fn set_files(&mut self, files: BTreeMap<String, FileTask>) {
        self.total_count = files.len() as u32;
        self.completed_count = 0;
        self.failed_count = 0;
        self.files = files;
    }

    /// Mark one task as admitted for download.
    pub fn mark_task_downloading(&mut self, key: &str) {
        if let Some(task) = self.files.get_mut(key) {
            if task.status == FileTaskStatus::Pending {
                task.status = FileTaskStatus::Downloading;
            }
        }
    }

    /// Mark one task terminal `done` and bump exactly one counter.
    ///
    /// A task that is already terminal is left untouched, which makes the
    /// operation safe to replay.
    pub fn mark_task_done(&mut self, key: &str, attempt_count: u32, bytes: u64) {
        if let Some(task) = self.files.get_mut(key) {
            if task.status.is_terminal() {
                return;
            }
            task.status = FileTaskStatus::Done;
            task.attempt_count = attempt_count;
            task.bytes = bytes;
            task.error_kind = None;
            self.completed_count += 1;
        }
    }

    /// Mark one task terminal `failed` and bump exactly one counter.
    pub fn mark_task_failed(&mut self, key: &str, attempt_count: u32, kind: FetchErrorKind) {
        if let Some(task) = self.files.get_mut(key) {
            if task.status.is_terminal() {
                return;
            }
            task.status = FileTaskStatus::Failed;
            task.attempt_count = attempt_count;
            task.error_kind = Some(kind);
            self.failed_count += 1;
        }
    }

    /// Whether every file task has reached a terminal status.
    pub fn all_files_terminal(&self) -> bool {
        self.completed_count + self.failed_count == self.total_count
    }

    /// Derived completion percentage for progress reporting.
    pub fn percentage(&self) -> f32 {
        match self.status {
            JobStatus::Completed => 100.0,
            _ if self.total_count == 0 => 0.0,
            _ => {
                let resolved = (self.completed_count + self.failed_count) as f32;
                (resolved / self.total_count as f32) * 100.0
            }
        }
    }

    /// Keys of the tasks that finished `done`, in stable archive order.
    pub fn done_keys(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|(_, task)| task.status == FileTaskStatus::Done)
            .map(|(key, _)| key.clone())
            .collect()
    }
}
