//! Performs one job's HTTP call and archives the outcome.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

use {
    crate::{
        clock::Clock,
        store::Archive,
        types::{ApiRequest, ApiResponse, CompletedJob, CompletedStatus, Job},
    },
    tocsin_config::ExecutorConfig,
};

/// Failure before a usable response was obtained.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Performs an outbound HTTP call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| crate::Error::message(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ExecutorConfig) -> crate::Result<Self> {
        Self::new(Duration::from_secs(config.timeout_secs), &config.user_agent)
    }
}

/// Empty bodies become `null`, JSON is kept structured, anything else is
/// kept as (lossy) text.
fn decode_body(bytes: &[u8]) -> serde_json::Value {
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError(format!("invalid HTTP method: {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_null() {
            builder = builder.json(&request.body);
        }

        let resp = builder.send().await.map_err(|e| TransportError(describe(&e)))?;

        let status_code = resp.status().as_u16();
        let headers: BTreeMap<String, String> = resp
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let bytes = resp.bytes().await.map_err(|e| TransportError(describe(&e)))?;

        Ok(ApiResponse {
            status_code,
            headers,
            body: decode_body(&bytes),
        })
    }
}

/// Runs a job's request and appends exactly one archive record per call.
pub struct Executor {
    transport: Arc<dyn Transport>,
    archive: Arc<dyn Archive>,
    clock: Arc<dyn Clock>,
}

impl Executor {
    pub fn new(
        transport: Arc<dyn Transport>,
        archive: Arc<dyn Archive>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            archive,
            clock,
        }
    }

    pub fn archive(&self) -> &Arc<dyn Archive> {
        &self.archive
    }

    /// Perform the call for `job` and archive the outcome. Never fails: a
    /// failed archive write is logged and the record is still returned.
    pub async fn run(&self, job: &Job) -> CompletedJob {
        debug!(id = %job.id, url = %job.request.url, method = %job.request.method, "executing job");
        let started = std::time::Instant::now();

        let (status, response, error_message) = match self.transport.call(&job.request).await {
            Ok(resp) if (200..300).contains(&resp.status_code) => {
                (CompletedStatus::Success, resp, None)
            },
            Ok(resp) => (CompletedStatus::ResponseError, resp, None),
            Err(e) => (
                CompletedStatus::RequestError,
                ApiResponse::default(),
                Some(e.to_string()),
            ),
        };

        let record = CompletedJob {
            id: job.id.clone(),
            name: job.name.clone(),
            created_at_ms: job.created_at_ms,
            completed_at_ms: self.clock.now_ms(),
            status,
            trigger: job.trigger.clone(),
            request: job.request.clone(),
            response,
            error_message,
        };

        match record.status {
            CompletedStatus::Success => {
                info!(
                    id = %record.id,
                    status_code = record.response.status_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job succeeded"
                );
            },
            CompletedStatus::ResponseError => {
                warn!(id = %record.id, status_code = record.response.status_code, "job got error response");
            },
            CompletedStatus::RequestError => {
                warn!(
                    id = %record.id,
                    error = record.error_message.as_deref().unwrap_or_default(),
                    "job request failed"
                );
            },
        }

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("tocsin_jobs_executed_total", "status" => record.status.as_str())
                .increment(1);
            metrics::histogram!("tocsin_job_duration_seconds")
                .record(started.elapsed().as_secs_f64());
        }

        if let Err(e) = self.archive.append(&record).await {
            warn!(id = %record.id, error = %e, "failed to archive completed job");
            #[cfg(feature = "metrics")]
            metrics::counter!("tocsin_archive_failures_total").increment(1);
        }

        record
    }
}
