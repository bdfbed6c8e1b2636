//! SQLite-backed job store and archive using sqlx.

use {
    async_trait::async_trait,
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqlitePoolOptions, SqliteRow},
    },
};

use crate::{
    Error, Result,
    store::{Archive, JobStore},
    types::{CompletedJob, Job},
};

/// SQLite-backed persistence for live jobs and completed firings.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) a database and run migrations.
    ///
    /// An in-memory URL is pinned to a single long-lived connection, since
    /// every SQLite connection to `:memory:` gets its own database.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error, id: &str) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => Error::conflict(id),
        _ => err.into(),
    }
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let status: String = row.try_get("status")?;
    let trigger: String = row.try_get("trigger")?;
    let request: String = row.try_get("request")?;
    Ok(Job {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: status.parse()?,
        trigger: serde_json::from_str(&trigger)?,
        request: serde_json::from_str(&request)?,
        created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
        updated_at_ms: row.try_get::<i64, _>("updated_at_ms")? as u64,
        next_run_at_ms: row
            .try_get::<Option<i64>, _>("next_run_at_ms")?
            .map(|v| v as u64),
        last_run_at_ms: row
            .try_get::<Option<i64>, _>("last_run_at_ms")?
            .map(|v| v as u64),
    })
}

fn completed_from_row(row: &SqliteRow) -> Result<CompletedJob> {
    let status: String = row.try_get("status")?;
    let trigger: String = row.try_get("trigger")?;
    let request: String = row.try_get("request")?;
    let response: String = row.try_get("response")?;
    Ok(CompletedJob {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
        completed_at_ms: row.try_get::<i64, _>("completed_at_ms")? as u64,
        status: status.parse()?,
        trigger: serde_json::from_str(&trigger)?,
        request: serde_json::from_str(&request)?,
        response: serde_json::from_str(&response)?,
        error_message: row.try_get("error_message")?,
    })
}

const COMPLETED_COLUMNS: &str = "id, completed_at_ms, name, created_at_ms, status, error_message, trigger, request, response";

#[async_trait]
impl JobStore for SqliteStore {
    async fn load_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT id, name, status, trigger, request, created_at_ms, updated_at_ms, next_run_at_ms, last_run_at_ms
             FROM jobs
             ORDER BY created_at_ms",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (id, name, status, trigger, request, created_at_ms, updated_at_ms, next_run_at_ms, last_run_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.name)
        .bind(job.status.as_str())
        .bind(serde_json::to_string(&job.trigger)?)
        .bind(serde_json::to_string(&job.request)?)
        .bind(job.created_at_ms as i64)
        .bind(job.updated_at_ms as i64)
        .bind(job.next_run_at_ms.map(|v| v as i64))
        .bind(job.last_run_at_ms.map(|v| v as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &job.id))?;
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs
             SET name = ?, status = ?, trigger = ?, request = ?, updated_at_ms = ?, next_run_at_ms = ?, last_run_at_ms = ?
             WHERE id = ?",
        )
        .bind(&job.name)
        .bind(job.status.as_str())
        .bind(serde_json::to_string(&job.trigger)?)
        .bind(serde_json::to_string(&job.request)?)
        .bind(job.updated_at_ms as i64)
        .bind(job.next_run_at_ms.map(|v| v as i64))
        .bind(job.last_run_at_ms.map(|v| v as i64))
        .bind(&job.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::job_not_found(&job.id));
        }
        Ok(())
    }

    async fn delete_job(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::job_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl Archive for SqliteStore {
    async fn append(&self, record: &CompletedJob) -> Result<()> {
        // Records sharing (id, completed_at_ms) are all kept; seq orders them.
        sqlx::query(
            "INSERT INTO completed_jobs (id, completed_at_ms, name, created_at_ms, status, error_message, trigger, request, response)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(record.completed_at_ms as i64)
        .bind(&record.name)
        .bind(record.created_at_ms as i64)
        .bind(record.status.as_str())
        .bind(&record.error_message)
        .bind(serde_json::to_string(&record.trigger)?)
        .bind(serde_json::to_string(&record.request)?)
        .bind(serde_json::to_string(&record.response)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<CompletedJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMPLETED_COLUMNS} FROM completed_jobs
             ORDER BY completed_at_ms DESC, seq DESC
             LIMIT ? OFFSET ?"
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(completed_from_row).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<CompletedJob>> {
        let row = sqlx::query(&format!(
            "SELECT {COMPLETED_COLUMNS} FROM completed_jobs
             WHERE id = ?
             ORDER BY completed_at_ms DESC, seq DESC
             LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(completed_from_row).transpose()
    }

    async fn history(&self, id: &str, limit: usize) -> Result<Vec<CompletedJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMPLETED_COLUMNS} FROM completed_jobs
             WHERE id = ?
             ORDER BY completed_at_ms DESC, seq DESC
             LIMIT ?"
        ))
        .bind(id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(completed_from_row).collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{ApiRequest, ApiResponse, CompletedStatus, JobStatus, Trigger},
    };

    async fn make_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn make_job(id: &str) -> Job {
        Job {
            id: id.into(),
            name: Some(format!("job-{id}")),
            created_at_ms: 1000,
            updated_at_ms: 1000,
            trigger: Trigger::Cron {
                expr: "*/5 * * * *".into(),
                tz: Some("Europe/Paris".into()),
            },
            request: ApiRequest::post("http://localhost/hook"),
            status: JobStatus::Active,
            next_run_at_ms: Some(300_000),
            last_run_at_ms: None,
        }
    }

    fn make_record(id: &str, completed_at_ms: u64) -> CompletedJob {
        CompletedJob {
            id: id.into(),
            name: None,
            created_at_ms: 0,
            completed_at_ms,
            status: CompletedStatus::ResponseError,
            trigger: Trigger::OneTime { fire_at_ms: 0 },
            request: ApiRequest::post("http://localhost/hook"),
            response: ApiResponse {
                status_code: 500,
                body: serde_json::json!({ "detail": "boom" }),
                ..Default::default()
            },
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_sqlite_insert_and_load() {
        let store = make_store().await;
        store.insert_job(&make_job("1")).await.unwrap();
        store.insert_job(&make_job("2")).await.unwrap();

        let jobs = store.load_jobs().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0], make_job("1"));
    }

    #[tokio::test]
    async fn test_sqlite_insert_duplicate_conflicts() {
        let store = make_store().await;
        store.insert_job(&make_job("1")).await.unwrap();
        let err = store.insert_job(&make_job("1")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_update() {
        let store = make_store().await;
        store.insert_job(&make_job("1")).await.unwrap();

        let mut job = make_job("1");
        job.status = JobStatus::Paused;
        job.next_run_at_ms = None;
        job.last_run_at_ms = Some(42);
        store.update_job(&job).await.unwrap();

        let jobs = store.load_jobs().await.unwrap();
        assert_eq!(jobs[0], job);
    }

    #[tokio::test]
    async fn test_sqlite_update_not_found() {
        let store = make_store().await;
        let err = store.update_job(&make_job("nope")).await.unwrap_err();
        assert!(matches!(err, Error::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_delete() {
        let store = make_store().await;
        store.insert_job(&make_job("1")).await.unwrap();
        store.delete_job("1").await.unwrap();
        assert!(store.load_jobs().await.unwrap().is_empty());
        assert!(matches!(
            store.delete_job("1").await,
            Err(Error::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_sqlite_archive_ordering_and_paging() {
        let store = make_store().await;
        for i in 1..=5 {
            store.append(&make_record("a", i * 1000)).await.unwrap();
        }
        store.append(&make_record("b", 3500)).await.unwrap();

        let all = store.list(0, 100).await.unwrap();
        let times: Vec<u64> = all.iter().map(|r| r.completed_at_ms).collect();
        assert_eq!(times, vec![5000, 4000, 3500, 3000, 2000, 1000]);

        let page = store.list(2, 2).await.unwrap();
        assert_eq!(page[0].completed_at_ms, 3500);
        assert_eq!(page[1].completed_at_ms, 3000);

        assert!(store.list(10, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_archive_get_most_recent() {
        let store = make_store().await;
        store.append(&make_record("a", 1000)).await.unwrap();
        store.append(&make_record("a", 2000)).await.unwrap();

        let latest = store.get("a").await.unwrap().unwrap();
        assert_eq!(latest.completed_at_ms, 2000);
        assert_eq!(latest.response.status_code, 500);
        assert_eq!(latest.response.body["detail"], "boom");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_archive_keeps_same_millisecond_records() {
        let store = make_store().await;
        let mut first = make_record("a", 1000);
        first.status = CompletedStatus::RequestError;
        first.error_message = Some("connection refused".into());
        store.append(&first).await.unwrap();
        store.append(&make_record("a", 1000)).await.unwrap();

        let all = store.list(0, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, CompletedStatus::ResponseError);
        assert_eq!(all[1], first);
        assert_eq!(store.history("a", 10).await.unwrap().len(), 2);
        assert_eq!(
            store.get("a").await.unwrap().unwrap().status,
            CompletedStatus::ResponseError
        );
    }

    #[tokio::test]
    async fn test_sqlite_history_limit() {
        let store = make_store().await;
        for i in 1..=5 {
            store.append(&make_record("a", i * 1000)).await.unwrap();
        }
        let history = store.history("a", 3).await.unwrap();
        let times: Vec<u64> = history.iter().map(|r| r.completed_at_ms).collect();
        assert_eq!(times, vec![5000, 4000, 3000]);
    }

    #[tokio::test]
    async fn test_sqlite_file_database_persists() {
        let tmp = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", tmp.path().join("t.db").display());

        {
            let store = SqliteStore::new(&url).await.unwrap();
            store.insert_job(&make_job("1")).await.unwrap();
            store.append(&make_record("1", 1000)).await.unwrap();
        }

        let store = SqliteStore::new(&url).await.unwrap();
        assert_eq!(store.load_jobs().await.unwrap().len(), 1);
        assert!(store.get("1").await.unwrap().is_some());
    }
}
