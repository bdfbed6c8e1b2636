//! HTTP routes over the dispatcher and the completed-job archive.

use std::sync::Arc;

use {
    axum::{
        Json, Router,
        extract::State,
        routing::{get, post},
    },
    tocsin_scheduler::{Archive, Dispatcher, types::DispatcherStatus},
};

pub mod completed;
pub mod error;
pub mod jobs;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub archive: Arc<dyn Archive>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let archive = Arc::clone(dispatcher.executor().archive());
        Self {
            dispatcher,
            archive,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route(
            "/jobs/{id}",
            get(jobs::get_job)
                .put(jobs::update_job)
                .delete(jobs::delete_job),
        )
        .route("/jobs/{id}/pause", post(jobs::pause_job))
        .route("/jobs/{id}/resume", post(jobs::resume_job))
        .route("/completed-jobs", get(completed::list_completed))
        .route("/completed-jobs/{id}", get(completed::get_completed))
        .route("/status", get(status))
        .route("/health", get(health))
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<DispatcherStatus> {
    Json(state.dispatcher.status().await)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{
            body::Body,
            http::{Method, Request, StatusCode},
        },
        std::time::Duration,
        tocsin_scheduler::{
            DispatcherConfig, Executor, ReqwestTransport,
            clock::FakeClock,
            store_memory::InMemoryStore,
            types::{
                ApiRequest, ApiResponse, CompletedJob, CompletedStatus, Trigger,
            },
        },
        tower::ServiceExt,
    };

    const NOW: u64 = 1_706_788_800_000; // 2024-02-01T12:00:00Z

    fn app() -> (Router, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FakeClock::new(NOW));
        let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(1), "tocsin-test").unwrap());
        let executor = Arc::new(Executor::new(transport, store.clone(), clock.clone()));
        let dispatcher = Dispatcher::with_clock(
            store.clone(),
            executor,
            DispatcherConfig::default(),
            clock,
        );
        (router(AppState::new(dispatcher)), store)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            },
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn cron_body(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": "every five",
            "request": { "url": "http://localhost:9/hook", "body": { "k": "v" } },
            "trigger": { "cron": "*/5 * * * *" }
        })
    }

    fn record(id: &str, completed_at_ms: u64) -> CompletedJob {
        CompletedJob {
            id: id.into(),
            name: None,
            created_at_ms: 0,
            completed_at_ms,
            status: CompletedStatus::Success,
            trigger: Trigger::OneTime { fire_at_ms: 0 },
            request: ApiRequest::post("http://localhost/hook"),
            response: ApiResponse {
                status_code: 200,
                ..Default::default()
            },
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (app, _) = app();
        let (status, job) = send(&app, Method::POST, "/jobs", Some(cron_body("a"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["id"], "a");
        assert_eq!(job["status"], "active");
        assert_eq!(job["request"]["method"], "POST");
        assert_eq!(job["trigger"], serde_json::json!({ "type": "cron", "expr": "*/5 * * * *" }));
        assert_eq!(job["nextRunAtMs"], NOW + 300_000);

        let (status, fetched) = send(&app, Method::GET, "/jobs/a", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, job);
    }

    #[tokio::test]
    async fn test_create_duplicate_is_409() {
        let (app, _) = app();
        send(&app, Method::POST, "/jobs", Some(cron_body("dup"))).await;
        let (status, body) = send(&app, Method::POST, "/jobs", Some(cron_body("dup"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("dup"));
    }

    #[tokio::test]
    async fn test_invalid_input_is_422() {
        let (app, _) = app();

        let mut bad_cron = cron_body("x");
        bad_cron["trigger"] = serde_json::json!({ "cron": "* * *" });
        let (status, _) = send(&app, Method::POST, "/jobs", Some(bad_cron)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let ambiguous = serde_json::json!({
            "request": { "url": "http://localhost/hook" },
            "trigger": { "delay": 5, "date": "2030-01-01T00:00:00Z" }
        });
        let (status, _) = send(&app, Method::POST, "/jobs", Some(ambiguous)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let bad_url = serde_json::json!({
            "request": { "url": "ftp://localhost/hook" },
            "trigger": { "delay": 5 }
        });
        let (status, body) = send(&app, Method::POST, "/jobs", Some(bad_url)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].is_string());

        let missing_request = serde_json::json!({ "trigger": { "delay": 5 } });
        let (status, _) = send(&app, Method::POST, "/jobs", Some(missing_request)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/jobs")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let (app, _) = app();
        for (method, uri) in [
            (Method::GET, "/jobs/nope"),
            (Method::POST, "/jobs/nope/pause"),
            (Method::POST, "/jobs/nope/resume"),
            (Method::DELETE, "/jobs/nope"),
            (Method::GET, "/completed-jobs/nope"),
        ] {
            let (status, body) = send(&app, method.clone(), uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_delete() {
        let (app, store) = app();
        send(&app, Method::POST, "/jobs", Some(cron_body("d"))).await;
        let (status, body) = send(&app, Method::DELETE, "/jobs/d", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());
        assert!(
            tocsin_scheduler::JobStore::load_jobs(store.as_ref())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_pause_resume_and_status() {
        let (app, _) = app();
        send(&app, Method::POST, "/jobs", Some(cron_body("p"))).await;

        let (status, job) = send(&app, Method::POST, "/jobs/p/pause", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["status"], "paused");
        assert!(job["nextRunAtMs"].is_null());

        let (_, st) = send(&app, Method::GET, "/status", None).await;
        assert_eq!(st["jobCount"], 1);
        assert_eq!(st["pausedCount"], 1);
        assert!(st["nextWakeAtMs"].is_null());
        assert_eq!(st["running"], false);

        let (status, job) = send(&app, Method::POST, "/jobs/p/resume", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["status"], "active");
        assert_eq!(job["nextRunAtMs"], NOW + 300_000);
    }

    #[tokio::test]
    async fn test_update() {
        let (app, _) = app();
        send(&app, Method::POST, "/jobs", Some(cron_body("u"))).await;

        let update = serde_json::json!({
            "name": "hourly",
            "request": { "url": "https://example.com/x", "method": "PUT" },
            "trigger": { "cron": "0 * * * *" }
        });
        let (status, job) = send(&app, Method::PUT, "/jobs/u", Some(update.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["name"], "hourly");
        assert_eq!(job["request"]["method"], "PUT");
        assert_eq!(job["nextRunAtMs"], NOW + 3_600_000);

        let (status, _) = send(&app, Method::PUT, "/jobs/missing", Some(update)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_sorted_by_creation() {
        let (app, _) = app();
        for id in ["b", "a", "c"] {
            send(&app, Method::POST, "/jobs", Some(cron_body(id))).await;
        }
        let (status, body) = send(&app, Method::GET, "/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|j| j["id"].as_str().unwrap())
            .collect();
        // Same creation instant on the fake clock, so ties break by id.
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_completed_jobs() {
        let (app, store) = app();
        for i in 1..=3 {
            store.append(&record("r", i * 1000)).await.unwrap();
        }
        store.append(&record("other", 1500)).await.unwrap();

        let (status, body) = send(&app, Method::GET, "/completed-jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        let times: Vec<u64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["completedAtMs"].as_u64().unwrap())
            .collect();
        assert_eq!(times, vec![3000, 2000, 1500, 1000]);

        let (_, page) = send(&app, Method::GET, "/completed-jobs?offset=1&limit=2", None).await;
        assert_eq!(page.as_array().unwrap().len(), 2);
        assert_eq!(page[0]["completedAtMs"], 2000);

        let (status, latest) = send(&app, Method::GET, "/completed-jobs/r", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["completedAtMs"], 3000);
        assert_eq!(latest["status"], "success");

        let (status, _) = send(&app, Method::GET, "/completed-jobs?limit=abc", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
