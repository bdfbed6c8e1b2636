//! In-memory store for tests and ephemeral runs.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    Error, Result,
    store::{Archive, JobStore, newest_first},
    types::{CompletedJob, Job},
};

/// In-memory store backed by `HashMap`. Nothing survives a restart.
pub struct InMemoryStore {
    jobs: Mutex<HashMap<String, Job>>,
    completed: Mutex<Vec<CompletedJob>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    fn sorted(&self) -> Vec<CompletedJob> {
        let mut records = self
            .completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        newest_first(&mut records);
        records
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn load_jobs(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut jobs: Vec<Job> = jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at_ms);
        Ok(jobs)
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&job.id) {
            return Err(Error::conflict(&job.id));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            },
            None => Err(Error::job_not_found(&job.id)),
        }
    }

    async fn delete_job(&self, id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.remove(id).is_none() {
            return Err(Error::job_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl Archive for InMemoryStore {
    async fn append(&self, record: &CompletedJob) -> Result<()> {
        self.completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<CompletedJob>> {
        Ok(self.sorted().into_iter().skip(offset).take(limit).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<CompletedJob>> {
        Ok(self.sorted().into_iter().find(|r| r.id == id))
    }

    async fn history(&self, id: &str, limit: usize) -> Result<Vec<CompletedJob>> {
        Ok(self
            .sorted()
            .into_iter()
            .filter(|r| r.id == id)
            .take(limit)
            .collect())
    }
}
