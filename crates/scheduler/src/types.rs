//! Core data types for the callback scheduler.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// When a job fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Trigger {
    /// Fire once at `fire_at_ms` (epoch millis).
    OneTime { fire_at_ms: u64 },
    /// Standard 5-field cron expression, evaluated in `tz` (UTC when absent).
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

/// Trigger as supplied by a client. Resolved into a [`Trigger`] at creation.
///
/// Cron is listed first so that an object carrying `cron` never falls through
/// to the all-optional one-time shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TriggerSpec {
    Cron {
        cron: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
    /// Exactly one of `delay` (seconds from now) or `date` (ISO 8601).
    OneTime {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<String>,
    },
}

fn default_method() -> String {
    "POST".into()
}

/// Outbound call performed on every firing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl ApiRequest {
    /// A `POST` with no headers and no body.
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: serde_json::Value::Null,
        }
    }

    /// Check that `url` is an absolute http(s) URL with a host and that
    /// `method` is a valid HTTP method token.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| Error::invalid_request(format!("invalid URL '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::invalid_request(format!("invalid URL: {}", self.url)));
        }
        reqwest::Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::invalid_request(format!("invalid HTTP method: {}", self.method)))?;
        Ok(())
    }
}

/// What the callback endpoint answered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    /// `0` when no response was received.
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Lifecycle status of a live job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, first fire time not computed yet.
    Pending,
    Active,
    Paused,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            other => Err(Error::message(format!("unknown job status: {other}"))),
        }
    }
}

/// A job tracked by the job store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub trigger: Trigger,
    pub request: ApiRequest,
    pub status: JobStatus,
    /// Absent while paused.
    #[serde(default)]
    pub next_run_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<u64>,
}

/// Classification of one firing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CompletedStatus {
    /// The endpoint answered with a 2xx status.
    Success,
    /// No usable response: connect failure, timeout, broken body.
    RequestError,
    /// The endpoint answered with a non-2xx status.
    ResponseError,
}

impl CompletedStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RequestError => "request-error",
            Self::ResponseError => "response-error",
        }
    }
}

impl fmt::Display for CompletedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletedStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "request-error" => Ok(Self::RequestError),
            "response-error" => Ok(Self::ResponseError),
            other => Err(Error::message(format!("unknown completed status: {other}"))),
        }
    }
}

/// Archived outcome of one firing. Keyed by `(id, completed_at_ms)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedJob {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at_ms: u64,
    pub completed_at_ms: u64,
    pub status: CompletedStatus,
    pub trigger: Trigger,
    pub request: ApiRequest,
    pub response: ApiResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Input for creating a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreate {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub request: ApiRequest,
    pub trigger: TriggerSpec,
}

/// Full replacement of a live job's definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    #[serde(default)]
    pub name: Option<String>,
    pub request: ApiRequest,
    pub trigger: TriggerSpec,
}

/// Summary status of the dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStatus {
    pub running: bool,
    pub job_count: usize,
    pub active_count: usize,
    pub paused_count: usize,
    pub next_wake_at_ms: Option<u64>,
    pub in_flight: usize,
}
