//! JSON file-backed store with atomic writes.

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    tokio::{fs, io::AsyncWriteExt, sync::Mutex},
};

use crate::{
    Error, Result,
    store::{Archive, JobStore, newest_first},
    types::{CompletedJob, Job},
};

/// File-backed store. Jobs live in a single JSON file, firings are appended
/// to a JSONL archive.
pub struct FileStore {
    jobs_path: PathBuf,
    archive_path: PathBuf,
    /// Serializes read-modify-write cycles on the jobs file and archive appends.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(jobs_path: PathBuf, archive_path: PathBuf) -> Self {
        Self {
            jobs_path,
            archive_path,
            write_lock: Mutex::new(()),
        }
    }

    /// `jobs.json` and `completed.jsonl` under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("jobs.json"), dir.join("completed.jsonl"))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write to a temp file, keep the previous file as `.bak`, rename over.
    async fn atomic_write_jobs(&self, jobs: &[Job]) -> Result<()> {
        Self::ensure_parent(&self.jobs_path).await?;
        let json = serde_json::to_string_pretty(jobs)?;
        let tmp = self.jobs_path.with_extension("json.tmp");

        fs::write(&tmp, json.as_bytes()).await?;

        if fs::try_exists(&self.jobs_path).await.unwrap_or(false) {
            let bak = self.jobs_path.with_extension("json.bak");
            if let Err(e) = fs::copy(&self.jobs_path, &bak).await {
                tracing::warn!(error = %e, path = %bak.display(), "failed to write jobs backup");
            }
        }

        fs::rename(&tmp, &self.jobs_path).await?;
        Ok(())
    }

    async fn read_jobs(&self) -> Result<Vec<Job>> {
        if !fs::try_exists(&self.jobs_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.jobs_path).await?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&data)?)
    }

    async fn read_archive(&self) -> Result<Vec<CompletedJob>> {
        if !fs::try_exists(&self.archive_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.archive_path).await?;
        let mut records = Vec::new();
        for (lineno, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    line = lineno + 1,
                    error = %e,
                    "skipping unreadable archive line"
                ),
            }
        }
        newest_first(&mut records);
        Ok(records)
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn load_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = self.read_jobs().await?;
        jobs.sort_by_key(|j| j.created_at_ms);
        Ok(jobs)
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(Error::conflict(&job.id));
        }
        jobs.push(job.clone());
        self.atomic_write_jobs(&jobs).await
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        let slot = jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| Error::job_not_found(&job.id))?;
        *slot = job.clone();
        self.atomic_write_jobs(&jobs).await
    }

    async fn delete_job(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Err(Error::job_not_found(id));
        }
        self.atomic_write_jobs(&jobs).await
    }
}

#[async_trait]
impl Archive for FileStore {
    async fn append(&self, record: &CompletedJob) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        Self::ensure_parent(&self.archive_path).await?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.archive_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<CompletedJob>> {
        Ok(self
            .read_archive()
            .await?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<CompletedJob>> {
        Ok(self.read_archive().await?.into_iter().find(|r| r.id == id))
    }

    async fn history(&self, id: &str, limit: usize) -> Result<Vec<CompletedJob>> {
        Ok(self
            .read_archive()
            .await?
            .into_iter()
            .filter(|r| r.id == id)
            .take(limit)
            .collect())
    }
}
