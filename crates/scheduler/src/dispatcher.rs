//! The dispatcher: owns live jobs, sleeps until the earliest fire time, and
//! hands due jobs to the [`Executor`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tokio_util::task::TaskTracker,
    tracing::{debug, error, info, warn},
};

use {
    crate::{
        Error, Result,
        clock::{Clock, SystemClock},
        executor::Executor,
        store::JobStore,
        types::{DispatcherStatus, Job, JobCreate, JobStatus, JobUpdate, Trigger},
    },
    tocsin_config::{CatchUpPolicy, SchedulerConfig},
};

/// Runtime knobs for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// What to do with a one-time trigger whose time already passed.
    pub catch_up: CatchUpPolicy,
    /// Longest sleep when nothing is scheduled sooner.
    pub idle_poll: Duration,
    /// How long `stop` waits for in-flight executions.
    pub shutdown_grace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for DispatcherConfig {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            catch_up: cfg.catch_up,
            idle_poll: Duration::from_secs(cfg.idle_poll_secs.max(1)),
            shutdown_grace: Duration::from_secs(cfg.shutdown_grace_secs),
        }
    }
}

/// The job dispatcher.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    executor: Arc<Executor>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
    /// Authoritative in-process view of live jobs, mirrored to `store`.
    jobs: RwLock<HashMap<String, Job>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<Executor>,
        config: DispatcherConfig,
    ) -> Arc<Self> {
        Self::with_clock(store, executor, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn JobStore>,
        executor: Arc<Executor>,
        config: DispatcherConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            executor,
            clock,
            config,
            jobs: RwLock::new(HashMap::new()),
            timer_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
            tracker: TaskTracker::new(),
        })
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Load jobs from the store, restore their schedule, start the wake loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if *self.running.read().await {
            return Ok(());
        }

        let loaded = self.store.load_jobs().await?;
        info!(count = loaded.len(), "loaded jobs");
        self.recover(loaded).await;

        self.tracker.reopen();
        *self.running.write().await = true;

        let dispatcher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            dispatcher.timer_loop().await;
        });
        *self.timer_handle.lock().await = Some(handle);
        info!("dispatcher started");
        Ok(())
    }

    /// Stop the wake loop and wait (bounded) for in-flight executions.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();

        if let Some(mut handle) = self.timer_handle.lock().await.take()
            && tokio::time::timeout(Duration::from_secs(1), &mut handle)
                .await
                .is_err()
        {
            handle.abort();
        }

        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight > 0 {
            info!(in_flight, "waiting for in-flight executions");
        }
        if tokio::time::timeout(self.config.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.tracker.len(),
                "shutdown grace period elapsed with executions still running"
            );
        }
        info!("dispatcher stopped");
    }

    /// Register a new job.
    pub async fn create(&self, create: JobCreate) -> Result<Job> {
        create.request.validate()?;
        let now = self.clock.now_ms();
        let trigger = create.trigger.resolve(now)?;

        let id = create
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            return Err(Error::conflict(id));
        }

        let mut job = Job {
            id,
            name: create.name,
            created_at_ms: now,
            updated_at_ms: now,
            trigger,
            request: create.request,
            status: JobStatus::Pending,
            next_run_at_ms: None,
            last_run_at_ms: None,
        };
        job.next_run_at_ms = Some(self.first_fire(&job.trigger, now)?);
        job.status = JobStatus::Active;

        self.store.insert_job(&job).await?;
        jobs.insert(job.id.clone(), job.clone());
        drop(jobs);

        info!(id = %job.id, next_run_at_ms = ?job.next_run_at_ms, "job created");
        self.wake_notify.notify_one();
        Ok(job)
    }

    pub async fn get(&self, id: &str) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::job_not_found(id))
    }

    /// Snapshot of live jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs
    }

    /// Replace a job's name, request and trigger. A paused job stays paused.
    pub async fn update(&self, id: &str, update: JobUpdate) -> Result<Job> {
        update.request.validate()?;
        let now = self.clock.now_ms();
        let trigger = update.trigger.resolve(now)?;

        let mut jobs = self.jobs.write().await;
        let mut job = jobs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::job_not_found(id))?;

        job.name = update.name;
        job.request = update.request;
        job.next_run_at_ms = match job.status {
            JobStatus::Paused => None,
            JobStatus::Active | JobStatus::Pending => Some(self.first_fire(&trigger, now)?),
        };
        job.trigger = trigger;
        job.updated_at_ms = now;

        self.store.update_job(&job).await?;
        jobs.insert(job.id.clone(), job.clone());
        drop(jobs);

        info!(id = %job.id, "job updated");
        self.wake_notify.notify_one();
        Ok(job)
    }

    /// Suspend future firings. Does not cancel an in-flight execution.
    pub async fn pause(&self, id: &str) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let mut job = jobs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::job_not_found(id))?;
        if job.status == JobStatus::Paused {
            return Ok(job);
        }

        job.status = JobStatus::Paused;
        job.next_run_at_ms = None;
        job.updated_at_ms = self.clock.now_ms();

        self.store.update_job(&job).await?;
        jobs.insert(job.id.clone(), job.clone());
        drop(jobs);

        info!(id = %job.id, "job paused");
        self.wake_notify.notify_one();
        Ok(job)
    }

    /// Recompute the next fire time from now and reactivate.
    pub async fn resume(&self, id: &str) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let mut job = jobs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::job_not_found(id))?;
        if job.status == JobStatus::Active {
            return Ok(job);
        }

        let now = self.clock.now_ms();
        job.next_run_at_ms = Some(self.first_fire(&job.trigger, now)?);
        job.status = JobStatus::Active;
        job.updated_at_ms = now;

        self.store.update_job(&job).await?;
        jobs.insert(job.id.clone(), job.clone());
        drop(jobs);

        info!(id = %job.id, next_run_at_ms = ?job.next_run_at_ms, "job resumed");
        self.wake_notify.notify_one();
        Ok(job)
    }

    /// Delete a live job. An execution already in flight still completes and
    /// is archived.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(id) {
            return Err(Error::job_not_found(id));
        }
        self.store.delete_job(id).await?;
        jobs.remove(id);
        drop(jobs);

        info!(id, "job removed");
        self.wake_notify.notify_one();
        Ok(())
    }

    pub async fn status(&self) -> DispatcherStatus {
        let jobs = self.jobs.read().await;
        DispatcherStatus {
            running: *self.running.read().await,
            job_count: jobs.len(),
            active_count: jobs
                .values()
                .filter(|j| j.status == JobStatus::Active)
                .count(),
            paused_count: jobs
                .values()
                .filter(|j| j.status == JobStatus::Paused)
                .count(),
            next_wake_at_ms: next_wake(&jobs),
            in_flight: self.tracker.len(),
        }
    }

    /// First fire time for a trigger being (re)activated at `now`.
    fn first_fire(&self, trigger: &Trigger, now: u64) -> Result<u64> {
        match trigger.next_fire_after(now)? {
            Some(at) => Ok(at),
            None if trigger.is_one_time() => match self.config.catch_up {
                CatchUpPolicy::FireImmediately => Ok(now),
                CatchUpPolicy::Reject => Err(Error::invalid_trigger(
                    "one-time fire time has already passed",
                )),
            },
            None => Err(Error::invalid_trigger("cron expression never fires")),
        }
    }

    /// Rebuild the schedule for jobs loaded at startup.
    ///
    /// One-time jobs keep their fire time, so an elapsed one fires on the
    /// first tick. Cron jobs whose next fire elapsed while down are moved to
    /// the next occurrence after now.
    async fn recover(&self, loaded: Vec<Job>) {
        let now = self.clock.now_ms();
        let mut restored = HashMap::with_capacity(loaded.len());
        let mut changed = Vec::new();

        for mut job in loaded {
            let before = job.clone();
            match (before.status, &before.trigger) {
                (JobStatus::Paused, _) => job.next_run_at_ms = None,
                (_, Trigger::OneTime { fire_at_ms }) => {
                    job.status = JobStatus::Active;
                    job.next_run_at_ms = Some(job.next_run_at_ms.unwrap_or(*fire_at_ms));
                },
                (_, trigger @ Trigger::Cron { .. }) => {
                    if job.next_run_at_ms.is_none_or(|t| t < now) {
                        if job.next_run_at_ms.is_some() {
                            info!(id = %job.id, "skipping cron firings missed while stopped");
                        }
                        match trigger.next_fire_after(now) {
                            Ok(Some(next)) => {
                                job.status = JobStatus::Active;
                                job.next_run_at_ms = Some(next);
                            },
                            Ok(None) | Err(_) => {
                                warn!(id = %job.id, "cron job has no future fire time, pausing");
                                job.status = JobStatus::Paused;
                                job.next_run_at_ms = None;
                            },
                        }
                    } else {
                        job.status = JobStatus::Active;
                    }
                },
            }
            if job != before {
                job.updated_at_ms = now;
                changed.push(job.clone());
            }
            restored.insert(job.id.clone(), job);
        }

        for job in &changed {
            if let Err(e) = self.store.update_job(job).await {
                error!(id = %job.id, error = %e, "failed to persist recovered schedule");
            }
        }

        info!(
            jobs = restored.len(),
            rescheduled = changed.len(),
            "schedule recovered"
        );
        *self.jobs.write().await = restored;
    }

    async fn timer_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let sleep_ms = self.ms_until_next_wake().await;

            if sleep_ms > 0 {
                let notify = Arc::clone(&self.wake_notify);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {},
                    () = notify.notified() => {
                        debug!("timer loop woken by notify");
                        continue;
                    },
                }
            }

            if !*self.running.read().await {
                break;
            }

            self.process_due_jobs().await;
        }
    }

    async fn ms_until_next_wake(&self) -> u64 {
        let idle = self.config.idle_poll.as_millis() as u64;
        let jobs = self.jobs.read().await;
        next_wake(&jobs)
            .map(|at| at.saturating_sub(self.clock.now_ms()).min(idle))
            .unwrap_or(idle)
    }

    /// Fire every active job whose next fire time is not in the future, then
    /// advance its schedule without waiting for the execution.
    pub(crate) async fn process_due_jobs(&self) {
        let now = self.clock.now_ms();
        let mut jobs = self.jobs.write().await;

        let due: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Active && j.next_run_at_ms.is_some_and(|t| t <= now))
            .cloned()
            .collect();

        for job in due {
            self.dispatch(job.clone());

            if job.trigger.is_one_time() {
                jobs.remove(&job.id);
                if let Err(e) = self.store.delete_job(&job.id).await {
                    error!(id = %job.id, error = %e, "failed to delete fired one-time job");
                }
                continue;
            }

            let mut next = job;
            next.last_run_at_ms = Some(now);
            next.updated_at_ms = now;
            match next.trigger.next_fire_after(now) {
                Ok(Some(at)) => next.next_run_at_ms = Some(at),
                Ok(None) | Err(_) => {
                    warn!(id = %next.id, "cron job has no future fire time, pausing");
                    next.status = JobStatus::Paused;
                    next.next_run_at_ms = None;
                },
            }
            if let Err(e) = self.store.update_job(&next).await {
                error!(id = %next.id, error = %e, "failed to persist advanced schedule");
            }
            debug!(id = %next.id, next_run_at_ms = ?next.next_run_at_ms, "schedule advanced");
            jobs.insert(next.id.clone(), next);
        }
    }

    fn dispatch(&self, job: Job) {
        info!(id = %job.id, "firing job");
        #[cfg(feature = "metrics")]
        metrics::counter!("tocsin_firings_total").increment(1);

        let executor = Arc::clone(&self.executor);
        self.tracker.spawn(async move {
            executor.run(&job).await;
        });
    }
}

fn next_wake(jobs: &HashMap<String, Job>) -> Option<u64> {
    jobs.values()
        .filter(|j| j.status == JobStatus::Active)
        .filter_map(|j| j.next_run_at_ms)
        .min()
}
