//! Job orchestrator implementation.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::assembler::Assembler;
use crate::catalog::{Catalog, CatalogFile};
use crate::fetcher::{FetchError, FetchRequest, Fetcher};
use crate::governor::Governor;
use crate::job::{
    ArchiveRef, CreateJobRequest, FailureKind, FileTask, Job, JobFailure, JobStatus,
};
use crate::metrics;
use crate::reaper::Reaper;
use crate::store::TieredJobStore;

use super::types::{JobError, OrchestratorStatus};

/// The job orchestrator.
///
/// `create_job` returns as soon as the initial record is persisted;
/// enumeration and fetching run on a spawned driver task per job, and
/// callers observe progress through [`JobOrchestrator::get_job`] snapshots.
/// Cloning is cheap; all state is shared.
#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<TieredJobStore>,
    catalog: Arc<dyn Catalog>,
    fetcher: Arc<dyn Fetcher>,
    governor: Arc<Governor>,
    assembler: Arc<Assembler>,
    reaper: Option<Arc<Reaper>>,
    /// Cancellation flags of the jobs driven by this process.
    cancellations: Arc<RwLock<HashMap<String, watch::Sender<bool>>>>,
}

impl JobOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        store: Arc<TieredJobStore>,
        catalog: Arc<dyn Catalog>,
        fetcher: Arc<dyn Fetcher>,
        governor: Arc<Governor>,
        assembler: Arc<Assembler>,
    ) -> Self {
        Self {
            store,
            catalog,
            fetcher,
            governor,
            assembler,
            reaper: None,
            cancellations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attach a reaper to sweep expired jobs before each creation.
    pub fn with_reaper(mut self, reaper: Arc<Reaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }

    /// Validate the request, persist a `pending` job and spawn its driver.
    ///
    /// Never blocks on network I/O; the returned id can be polled
    /// immediately.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<String, JobError> {
        validate_request(&request)?;

        let id = uuid::Uuid::new_v4().to_string();
        let job = Job::new(&id, request.requested_groups);
        self.store.create(job).await?;
        metrics::JOBS_CREATED.inc();

        // Opportunistic cleanup of expired jobs; never delays creation.
        if let Some(reaper) = &self.reaper {
            let reaper = Arc::clone(reaper);
            tokio::spawn(async move {
                reaper.sweep_once().await;
            });
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancellations
            .write()
            .await
            .insert(id.clone(), cancel_tx);

        let this = self.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = this.drive_job(&job_id, cancel_rx).await {
                warn!("Job {} driver stopped on store failure: {}", job_id, e);
            }
            this.cancellations.write().await.remove(&job_id);
        });

        info!("Created job {}", id);
        Ok(id)
    }

    /// Read-only snapshot of a job.
    pub async fn get_job(&self, id: &str) -> Result<Job, JobError> {
        Ok(self.store.get(id).await?)
    }

    /// Resolve the archive of a completed job.
    pub async fn get_archive(&self, id: &str) -> Result<(ArchiveRef, PathBuf), JobError> {
        let job = self.get_job(id).await?;
        match (job.status, &job.archive_ref) {
            (JobStatus::Completed, Some(archive_ref)) => Ok((
                archive_ref.clone(),
                self.assembler.archive_path(&archive_ref.file_name),
            )),
            (status, _) => Err(JobError::NotReady {
                id: job.id,
                status: status.as_str(),
            }),
        }
    }

    /// Cancel a job. Idempotent; cancelling a terminal job is a no-op.
    ///
    /// Outstanding fetchers are signalled to abandon. An in-flight attempt
    /// may still finish its write, but its result is discarded.
    pub async fn cancel_job(&self, id: &str) -> Result<Job, JobError> {
        let job = self.get_job(id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }

        let updated = self
            .store
            .update(id, |job| {
                if !job.status.is_terminal() {
                    job.status = JobStatus::Cancelled;
                }
            })
            .await?;
        metrics::JOBS_TERMINAL.with_label_values(&["cancelled"]).inc();

        let cancellations = self.cancellations.read().await;
        match cancellations.get(id) {
            Some(cancel_tx) => {
                let _ = cancel_tx.send(true);
            }
            None => {
                // No driver in this process (e.g. the job predates a
                // restart); schedule the partial-state cleanup ourselves.
                let assembler = Arc::clone(&self.assembler);
                let job_id = id.to_string();
                tokio::spawn(async move {
                    assembler.remove_job_files(&job_id).await;
                });
            }
        }

        info!("Cancelled job {}", id);
        Ok(updated)
    }

    /// Current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            active_jobs: self.cancellations.read().await.len(),
            governor: self.governor.status(),
        }
    }

    /// Drive one job from `pending` to a terminal status.
    async fn drive_job(
        &self,
        id: &str,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<(), JobError> {
        let job = self
            .store
            .update(id, |job| {
                if job.status == JobStatus::Pending {
                    job.status = JobStatus::Fetching;
                }
            })
            .await?;
        if job.status != JobStatus::Fetching {
            return Ok(());
        }

        let job = self.enumerate(id, &job, &cancel_rx).await?;
        match job.status {
            JobStatus::Fetching => {}
            JobStatus::Cancelled => {
                self.assembler.remove_job_files(id).await;
                return Ok(());
            }
            _ => return Ok(()),
        }

        info!("Job {}: fetching {} file(s)", id, job.total_count);
        self.drive_fetchers(id, &job, &cancel_rx).await;
        self.finalize(id).await
    }

    /// Expand the selection into file tasks via the catalog collaborator.
    ///
    /// Per-subgroup failures become warnings, not job failures; only an
    /// entirely empty enumeration is fatal.
    async fn enumerate(
        &self,
        id: &str,
        job: &Job,
        cancel_rx: &watch::Receiver<bool>,
    ) -> Result<Job, JobError> {
        let mut listed: Vec<CatalogFile> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        'groups: for selection in &job.requested_groups {
            for subgroup_id in &selection.subgroup_ids {
                if *cancel_rx.borrow() {
                    break 'groups;
                }
                match self
                    .catalog
                    .enumerate_files(&selection.group_id, subgroup_id)
                    .await
                {
                    Ok(files) => {
                        debug!(
                            "Job {}: {}/{} enumerated {} file(s)",
                            id,
                            selection.group_id,
                            subgroup_id,
                            files.len()
                        );
                        listed.extend(files);
                    }
                    Err(e) => {
                        warn!(
                            "Job {}: enumeration of {}/{} failed: {}",
                            id, selection.group_id, subgroup_id, e
                        );
                        warnings.push(format!(
                            "Enumeration of {}/{} failed: {}",
                            selection.group_id, subgroup_id, e
                        ));
                    }
                }
            }
        }

        let files = file_tasks_from(listed);
        let updated = self
            .store
            .update(id, move |job| {
                if job.status != JobStatus::Fetching {
                    return;
                }
                job.warnings = warnings;
                job.set_files(files);
                if job.total_count == 0 {
                    job.status = JobStatus::Failed;
                    job.failure = Some(JobFailure {
                        kind: FailureKind::EnumerationEmpty,
                        message: "enumeration produced no files".to_string(),
                    });
                }
            })
            .await?;

        if updated.status == JobStatus::Failed {
            metrics::JOBS_TERMINAL.with_label_values(&["failed"]).inc();
            info!("Job {} failed: nothing enumerated", id);
        }
        Ok(updated)
    }

    /// Submit every file task through the governor and wait for the results.
    async fn drive_fetchers(&self, id: &str, job: &Job, cancel_rx: &watch::Receiver<bool>) {
        let mut handles = Vec::with_capacity(job.files.len());
        for (key, task) in &job.files {
            let key = key.clone();
            let source_url = task.source_url.clone();
            let job_id = id.to_string();
            let store = Arc::clone(&self.store);
            let governor = Arc::clone(&self.governor);
            let fetcher = Arc::clone(&self.fetcher);
            let dest_path = self.assembler.task_path(id, &key);
            let mut cancel = cancel_rx.clone();

            handles.push(tokio::spawn(async move {
                let Some(permit) = governor.admit(&mut cancel).await else {
                    return;
                };

                apply_update(&store, &job_id, {
                    let key = key.clone();
                    move |job| {
                        if job.status == JobStatus::Fetching {
                            job.mark_task_downloading(&key);
                        }
                    }
                })
                .await;

                let result = fetcher
                    .fetch(
                        FetchRequest {
                            source_url,
                            dest_path,
                        },
                        cancel.clone(),
                    )
                    .await;
                drop(permit);

                // Each completion marks exactly one task terminal and bumps
                // exactly one counter; results of a cancelled job are
                // discarded, not applied.
                match result {
                    Ok(fetched) => {
                        metrics::FETCH_RESULTS.with_label_values(&["done"]).inc();
                        apply_update(&store, &job_id, move |job| {
                            if job.status == JobStatus::Fetching {
                                job.mark_task_done(&key, fetched.attempts, fetched.bytes);
                            }
                        })
                        .await;
                    }
                    Err(FetchError::Cancelled) => {}
                    Err(e) => {
                        metrics::FETCH_RESULTS
                            .with_label_values(&[e.kind().as_str()])
                            .inc();
                        let (attempts, kind) = (e.attempts(), e.kind());
                        apply_update(&store, &job_id, move |job| {
                            if job.status == JobStatus::Fetching {
                                job.mark_task_failed(&key, attempts, kind);
                            }
                        })
                        .await;
                    }
                }
            }));
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("Job {}: fetch task panicked: {}", id, e);
            }
        }
    }

    /// Resolve the job's terminal status once every task is terminal.
    async fn finalize(&self, id: &str) -> Result<(), JobError> {
        let job = self.store.get(id).await?;
        match job.status {
            JobStatus::Fetching => {}
            JobStatus::Cancelled => {
                self.assembler.remove_job_files(id).await;
                return Ok(());
            }
            _ => return Ok(()),
        }

        if job.completed_count == 0 {
            self.store
                .update(id, |job| {
                    if job.status == JobStatus::Fetching {
                        job.status = JobStatus::Failed;
                        job.failure = Some(JobFailure {
                            kind: FailureKind::AllDownloadsFailed,
                            message: format!("all {} file(s) failed to download", job.total_count),
                        });
                    }
                })
                .await?;
            metrics::JOBS_TERMINAL.with_label_values(&["failed"]).inc();
            info!("Job {} failed: no file downloaded", id);
            return Ok(());
        }

        let job = self
            .store
            .update(id, |job| {
                if job.status == JobStatus::Fetching {
                    job.status = JobStatus::Assembling;
                }
            })
            .await?;
        if job.status != JobStatus::Assembling {
            if job.status == JobStatus::Cancelled {
                self.assembler.remove_job_files(id).await;
            }
            return Ok(());
        }

        let assembler = Arc::clone(&self.assembler);
        let snapshot = job.clone();
        let timer = metrics::ARCHIVE_BUILD_DURATION.start_timer();
        let assembled =
            tokio::task::spawn_blocking(move || assembler.assemble(&snapshot)).await;
        timer.observe_duration();

        match assembled {
            Ok(Ok(archive_ref)) => {
                let updated = self
                    .store
                    .update(id, move |job| {
                        if job.status == JobStatus::Assembling {
                            job.status = JobStatus::Completed;
                            job.archive_ref = Some(archive_ref);
                        }
                    })
                    .await?;
                if updated.status == JobStatus::Completed {
                    metrics::JOBS_TERMINAL
                        .with_label_values(&["completed"])
                        .inc();
                    info!(
                        "Job {} completed: {}/{} file(s) archived",
                        id, updated.completed_count, updated.total_count
                    );
                } else {
                    // Cancelled while assembling; the archive is discarded.
                    self.assembler.remove_job_files(id).await;
                }
            }
            Ok(Err(e)) => {
                warn!("Job {}: archive assembly failed: {}", id, e);
                self.fail_assembly(id, e.to_string()).await?;
            }
            Err(e) => {
                warn!("Job {}: assembly task panicked: {}", id, e);
                self.fail_assembly(id, e.to_string()).await?;
            }
        }
        Ok(())
    }

    async fn fail_assembly(&self, id: &str, message: String) -> Result<(), JobError> {
        self.store
            .update(id, move |job| {
                if !job.status.is_terminal() {
                    job.status = JobStatus::Failed;
                    job.failure = Some(JobFailure {
                        kind: FailureKind::AssemblyFailed,
                        message,
                    });
                }
            })
            .await?;
        metrics::JOBS_TERMINAL.with_label_values(&["failed"]).inc();
        Ok(())
    }
}

/// Apply a completion update, logging instead of propagating store failures:
/// a record deleted mid-run (reaper, explicit cancel cleanup) is not an
/// error worth killing the driver over.
async fn apply_update<F>(store: &TieredJobStore, id: &str, mutate: F)
where
    F: FnOnce(&mut Job),
{
    if let Err(e) = store.update(id, mutate).await {
        warn!("Update of job {} not applied: {}", id, e);
    }
}

/// Reject structurally empty selections before any work starts.
fn validate_request(request: &CreateJobRequest) -> Result<(), JobError> {
    if request.requested_groups.is_empty() {
        return Err(JobError::InvalidRequest(
            "at least one group must be selected".to_string(),
        ));
    }
    for selection in &request.requested_groups {
        if selection.group_id.trim().is_empty() {
            return Err(JobError::InvalidRequest(
                "group id must not be empty".to_string(),
            ));
        }
        if selection.subgroup_ids.is_empty() {
            return Err(JobError::InvalidRequest(format!(
                "group {} selects no subgroups",
                selection.group_id
            )));
        }
    }
    Ok(())
}

/// Build the file-task map from the enumerated listing.
///
/// Keys are `<group>/<subgroup>/<file>` from display names. Duplicate
/// targets are disambiguated deterministically in enumeration order, which
/// is stable: groups and subgroups are visited in request order, files in
/// catalog order.
fn file_tasks_from(listed: Vec<CatalogFile>) -> BTreeMap<String, FileTask> {
    let mut files = BTreeMap::new();
    for file in listed {
        let dir = format!(
            "{}/{}",
            sanitize_component(&file.group_name),
            sanitize_component(&file.subgroup_name)
        );
        let name = sanitize_component(&file.file_name);
        let mut key = format!("{}/{}", dir, name);
        if files.contains_key(&key) {
            let (stem, ext) = split_name(&name);
            let mut n = 2;
            loop {
                key = match ext {
                    Some(ext) => format!("{}/{} ({}).{}", dir, stem, n, ext),
                    None => format!("{}/{} ({})", dir, stem, n),
                };
                if !files.contains_key(&key) {
                    break;
                }
                n += 1;
            }
        }
        files.insert(key.clone(), FileTask::pending(file.source_url, key));
    }
    files
}

/// Make a display name safe as a single path component. Separators become
/// dashes; names that would escape the staging directory are neutralized.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::GroupSelection;
    use crate::testing::fixtures;

    #[test]
    fn test_validate_rejects_empty_selection() {
        let result = validate_request(&CreateJobRequest {
            requested_groups: vec![],
        });
        assert!(matches!(result, Err(JobError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_rejects_group_without_subgroups() {
        let result = validate_request(&CreateJobRequest {
            requested_groups: vec![GroupSelection {
                group_id: "math".to_string(),
                subgroup_ids: vec![],
            }],
        });
        assert!(matches!(result, Err(JobError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_accepts_minimal_selection() {
        let result = validate_request(&CreateJobRequest {
            requested_groups: vec![fixtures::selection("math", &["s24"])],
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_file_tasks_use_display_names() {
        let files = file_tasks_from(vec![fixtures::catalog_file(
            "Mathematics",
            "June 2024",
            "paper1.pdf",
        )]);
        assert!(files.contains_key("Mathematics/June 2024/paper1.pdf"));
    }

    #[test]
    fn test_duplicate_targets_are_disambiguated_deterministically() {
        let listed = vec![
            fixtures::catalog_file("Math", "June 2024", "paper.pdf"),
            fixtures::catalog_file("Math", "June 2024", "paper.pdf"),
            fixtures::catalog_file("Math", "June 2024", "paper.pdf"),
        ];
        let files = file_tasks_from(listed);
        let keys: Vec<&String> = files.keys().collect();
        assert_eq!(
            keys,
            vec![
                "Math/June 2024/paper (2).pdf",
                "Math/June 2024/paper (3).pdf",
                "Math/June 2024/paper.pdf",
            ]
        );
    }

    #[test]
    fn test_sanitize_component_neutralizes_separators() {
        assert_eq!(sanitize_component("AS/A Level"), "AS-A Level");
        assert_eq!(sanitize_component("win\\path"), "win-path");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("  "), "_");
    }

    #[test]
    fn test_split_name_handles_extensions() {
        assert_eq!(split_name("paper.pdf"), ("paper", Some("pdf")));
        assert_eq!(split_name("README"), ("README", None));
        assert_eq!(split_name(".hidden"), (".hidden", None));
    }
}
