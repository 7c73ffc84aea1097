//! Archive assembly and staging layout.
//!
//! The assembler owns the staging directory layout (one directory per job,
//! plus the finished archives) and packages a terminal job's successfully
//! downloaded files into a single ZIP whose internal paths follow
//! `<group>/<subgroup>/<file>`. Assembly is deterministic (sorted entry
//! order, fixed entry metadata, per-entry Deflate), so re-invoking it for
//! the same job yields a byte-identical archive.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::job::{ArchiveRef, Job};

/// Errors that can occur assembling an archive.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// A task was recorded `done` but its staged file is gone.
    #[error("Staged file missing: {0}")]
    MissingStagedFile(String),

    #[error("Archive I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive write failed: {0}")]
    Zip(String),
}

/// Builds ZIP archives from a job's staging directory.
pub struct Assembler {
    staging_root: PathBuf,
}

impl Assembler {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
        }
    }

    /// Directory holding a job's fetched files before assembly.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.staging_root.join(job_id)
    }

    /// Staging path of one file task.
    pub fn task_path(&self, job_id: &str, relative_target_path: &str) -> PathBuf {
        self.job_dir(job_id).join(relative_target_path)
    }

    /// Path of an assembled archive by its recorded file name.
    pub fn archive_path(&self, file_name: &str) -> PathBuf {
        self.staging_root.join(file_name)
    }

    /// Assemble (or reuse) the archive for a job.
    ///
    /// Blocking; run it on a blocking thread from async contexts. If the
    /// archive already exists (a client re-requesting after a restart),
    /// the existing bytes are summarized and returned untouched.
    pub fn assemble(&self, job: &Job) -> Result<ArchiveRef, AssemblyError> {
        let file_name = format!("{}.zip", job.id);
        let archive_path = self.archive_path(&file_name);

        if archive_path.exists() {
            debug!("Archive for job {} already assembled, reusing", job.id);
            return summarize_archive(&archive_path, file_name);
        }

        let job_dir = self.job_dir(&job.id);
        let tmp_path = self.staging_root.join(format!(".{}.zip.part", job.id));

        std::fs::create_dir_all(&self.staging_root)?;
        let tmp_file = File::create(&tmp_path)?;
        let mut writer = ZipWriter::new(tmp_file);

        // Fixed timestamp and sorted entry order keep re-assembly
        // byte-identical.
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644);

        let result = (|| -> Result<(), AssemblyError> {
            for key in job.done_keys() {
                let source = job_dir.join(&key);
                if !source.is_file() {
                    return Err(AssemblyError::MissingStagedFile(key));
                }
                writer
                    .start_file(key.as_str(), options)
                    .map_err(|e| AssemblyError::Zip(e.to_string()))?;
                let mut reader = BufReader::new(File::open(&source)?);
                std::io::copy(&mut reader, &mut writer)?;
            }
            writer
                .finish()
                .map_err(|e| AssemblyError::Zip(e.to_string()))?;
            Ok(())
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        std::fs::rename(&tmp_path, &archive_path)?;
        summarize_archive(&archive_path, file_name)
    }

    /// Remove a job's staged files and archive. Best-effort and idempotent.
    pub async fn remove_job_files(&self, job_id: &str) {
        let job_dir = self.job_dir(job_id);
        if let Err(e) = tokio::fs::remove_dir_all(&job_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Removing staging dir for job {} failed: {}", job_id, e);
            }
        }

        let archive = self.archive_path(&format!("{}.zip", job_id));
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Removing archive for job {} failed: {}", job_id, e);
            }
        }
    }
}

/// Hash and measure an assembled archive.
fn summarize_archive(path: &Path, file_name: String) -> Result<ArchiveRef, AssemblyError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut size_bytes: u64 = 0;
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        size_bytes += read as u64;
    }

    Ok(ArchiveRef {
        file_name,
        sha256: format!("{:x}", hasher.finalize()),
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use super::*;
    use crate::fetcher::FetchErrorKind;
    use crate::job::FileTask;

    fn staged_job(staging: &Path) -> Job {
        let mut job = Job::new("job-1", vec![]);
        let mut files = BTreeMap::new();
        for (key, body) in [
            ("Math/June 2024/paper1.pdf", "paper one"),
            ("Math/June 2024/paper2.pdf", "paper two"),
            ("Physics/Nov 2023/paper1.pdf", "other paper"),
        ] {
            files.insert(key.to_string(), FileTask::pending("http://x", key));
            let path = staging.join("job-1").join(key);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        job.set_files(files);
        job.mark_task_done("Math/June 2024/paper1.pdf", 1, 9);
        job.mark_task_done("Physics/Nov 2023/paper1.pdf", 1, 11);
        job.mark_task_failed("Math/June 2024/paper2.pdf", 3, FetchErrorKind::NotFound);
        job
    }

    #[test]
    fn test_archive_contains_only_done_entries() {
        let dir = TempDir::new().unwrap();
        let assembler = Assembler::new(dir.path());
        let job = staged_job(dir.path());

        let archive_ref = assembler.assemble(&job).unwrap();
        assert_eq!(archive_ref.file_name, "job-1.zip");

        let file = File::open(assembler.archive_path(&archive_ref.file_name)).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len() as u32, job.completed_count);

        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"Math/June 2024/paper1.pdf".to_string()));
        assert!(names.contains(&"Physics/Nov 2023/paper1.pdf".to_string()));
        assert!(!names.iter().any(|n| n.contains("paper2")));
    }

    #[test]
    fn test_reassembly_is_content_identical() {
        let dir = TempDir::new().unwrap();
        let assembler = Assembler::new(dir.path());
        let job = staged_job(dir.path());

        let first = assembler.assemble(&job).unwrap();
        let second = assembler.assemble(&job).unwrap();
        assert_eq!(first.sha256, second.sha256);
        assert_eq!(first.size_bytes, second.size_bytes);
    }

    #[test]
    fn test_rebuild_after_archive_loss_is_identical() {
        let dir = TempDir::new().unwrap();
        let assembler = Assembler::new(dir.path());
        let job = staged_job(dir.path());

        let first = assembler.assemble(&job).unwrap();
        std::fs::remove_file(assembler.archive_path(&first.file_name)).unwrap();
        let rebuilt = assembler.assemble(&job).unwrap();
        assert_eq!(first.sha256, rebuilt.sha256);
    }

    #[test]
    fn test_missing_staged_file_fails_assembly() {
        let dir = TempDir::new().unwrap();
        let assembler = Assembler::new(dir.path());
        let job = staged_job(dir.path());
        std::fs::remove_file(dir.path().join("job-1/Math/June 2024/paper1.pdf")).unwrap();

        let result = assembler.assemble(&job);
        assert!(matches!(result, Err(AssemblyError::MissingStagedFile(_))));
        // No partial archive left behind.
        assert!(!assembler.archive_path("job-1.zip").exists());
    }

    #[tokio::test]
    async fn test_remove_job_files_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let assembler = Assembler::new(dir.path());
        let job = staged_job(dir.path());
        assembler.assemble(&job).unwrap();

        assembler.remove_job_files("job-1").await;
        assert!(!assembler.job_dir("job-1").exists());
        assert!(!assembler.archive_path("job-1.zip").exists());

        // Removing an already-removed job is a no-op.
        assembler.remove_job_files("job-1").await;
    }
}
