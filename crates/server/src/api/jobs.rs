//! Job API handlers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use papyrus_core::{
    ArchiveRef, CreateJobRequest, FetchErrorKind, FileTaskStatus, GroupSelection, Job, JobError,
    JobFailure, JobStatus,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub requested_groups: Vec<GroupSelectionBody>,
}

#[derive(Debug, Deserialize)]
pub struct GroupSelectionBody {
    pub group_id: String,
    pub subgroup_ids: Vec<String>,
}

/// Response for job creation
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// One file task in a job snapshot
#[derive(Debug, Serialize)]
pub struct FileTaskResponse {
    pub path: String,
    pub status: FileTaskStatus,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FetchErrorKind>,
    pub bytes: u64,
}

/// Full job snapshot
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub status: JobStatus,
    pub total_count: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub percentage: f32,
    pub files: Vec<FileTaskResponse>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveRef>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let percentage = job.percentage();
        Self {
            percentage,
            files: job
                .files
                .into_iter()
                .map(|(path, task)| FileTaskResponse {
                    path,
                    status: task.status,
                    attempt_count: task.attempt_count,
                    error_kind: task.error_kind,
                    bytes: task.bytes,
                })
                .collect(),
            id: job.id,
            status: job.status,
            total_count: job.total_count,
            completed_count: job.completed_count,
            failed_count: job.failed_count,
            warnings: job.warnings,
            failure: job.failure,
            archive: job.archive_ref,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

fn error_reply(e: JobError) -> (StatusCode, Json<JobErrorResponse>) {
    let status = match &e {
        JobError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::NotReady { .. } => StatusCode::CONFLICT,
        JobError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(JobErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new bulk-download job
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<CreateJobResponse>), (StatusCode, Json<JobErrorResponse>)> {
    let request = CreateJobRequest {
        requested_groups: body
            .requested_groups
            .into_iter()
            .map(|g| GroupSelection {
                group_id: g.group_id,
                subgroup_ids: g.subgroup_ids,
            })
            .collect(),
    };

    match state.orchestrator().create_job(request).await {
        Ok(job_id) => Ok((
            StatusCode::ACCEPTED,
            Json(CreateJobResponse {
                job_id,
                status: JobStatus::Pending,
            }),
        )),
        Err(e) => Err(error_reply(e)),
    }
}

/// Get a job snapshot by id
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, (StatusCode, Json<JobErrorResponse>)> {
    match state.orchestrator().get_job(&id).await {
        Ok(job) => Ok(Json(JobResponse::from(job))),
        Err(e) => Err(error_reply(e)),
    }
}

/// Cancel a job (idempotent)
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, (StatusCode, Json<JobErrorResponse>)> {
    match state.orchestrator().cancel_job(&id).await {
        Ok(job) => Ok(Json(JobResponse::from(job))),
        Err(e) => Err(error_reply(e)),
    }
}

/// Download the assembled archive of a completed job
pub async fn get_archive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<JobErrorResponse>)> {
    let (archive_ref, path) = state
        .orchestrator()
        .get_archive(&id)
        .await
        .map_err(error_reply)?;

    let bytes = tokio::fs::read(&path).await.map_err(|_| {
        // Completed job whose archive was already reclaimed.
        (
            StatusCode::NOT_FOUND,
            Json(JobErrorResponse {
                error: format!("Archive for job {} no longer exists", id),
            }),
        )
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", archive_ref.file_name),
            ),
            (header::ETAG, format!("\"{}\"", archive_ref.sha256)),
        ],
        bytes,
    ))
}
