//! Persistence traits for live jobs and the completed-job archive.

use async_trait::async_trait;

use crate::{
    Result,
    types::{CompletedJob, Job},
};

/// Durable home of live job definitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn load_jobs(&self) -> Result<Vec<Job>>;
    /// Fails with [`crate::Error::Conflict`] when the id is taken.
    async fn insert_job(&self, job: &Job) -> Result<()>;
    /// Fails with [`crate::Error::JobNotFound`] when the id is unknown.
    async fn update_job(&self, job: &Job) -> Result<()>;
    /// Fails with [`crate::Error::JobNotFound`] when the id is unknown.
    async fn delete_job(&self, id: &str) -> Result<()>;
}

/// Append-only record of firings.
#[async_trait]
pub trait Archive: Send + Sync {
    async fn append(&self, record: &CompletedJob) -> Result<()>;
    /// Newest first by `completed_at_ms`.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<CompletedJob>>;
    /// Most recent record for a job id.
    async fn get(&self, id: &str) -> Result<Option<CompletedJob>>;
    /// Newest first, at most `limit` records for one job id.
    async fn history(&self, id: &str, limit: usize) -> Result<Vec<CompletedJob>>;
}

/// Newest-first ordering shared by the non-SQL archives. Ties keep the later
/// append first.
pub(crate) fn newest_first(records: &mut [CompletedJob]) {
    records.reverse();
    records.sort_by(|a, b| b.completed_at_ms.cmp(&a.completed_at_ms));
}
