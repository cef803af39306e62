use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use tgc_core::{
    config::CloneDefaults,
    domain::{AccountId, ChannelId},
    registry::JobRegistry,
    transport::memory::{MemoryProvider, MemoryTransport},
    transport::SourceMessage,
};
use tgc_http::{create_router, AppState};

fn fast_defaults() -> CloneDefaults {
    CloneDefaults {
        send_delay: Duration::ZERO,
        fetch_delay: Duration::ZERO,
        ..CloneDefaults::default()
    }
}

fn app_with(mem: Arc<MemoryTransport>) -> Router {
    create_router(AppState {
        registry: JobRegistry::new(Arc::new(MemoryProvider::new(mem))),
        defaults: fast_defaults(),
        default_account: Some(AccountId("main".to_string())),
    })
}

fn seeded() -> Arc<MemoryTransport> {
    let mem = MemoryTransport::new();
    mem.add_channel(
        ChannelId(-1001),
        vec![
            SourceMessage::text(1, "one"),
            SourceMessage::service(2),
            SourceMessage::text(3, "three"),
            SourceMessage::media(4, "photo:4", Some("four")),
        ],
    );
    mem.add_channel(ChannelId(-1002), Vec::new());
    Arc::new(mem)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn wait_for_terminal(app: &Router, job_id: &str) -> Value {
    for _ in 0..500 {
        let (status, body) = call(app, "GET", &format!("/status?jobId={job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        if matches!(body["status"].as_str(), Some("completed" | "error" | "cancelled")) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never finished");
}

#[tokio::test]
async fn liveness_reports_working() {
    let app = app_with(seeded());
    let (status, body) = call(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "working"}));
}

#[tokio::test]
async fn start_clone_runs_job_to_completion() {
    let mem = seeded();
    let app = app_with(mem.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/start-clone",
        Some(json!({
            "sourceChannelId": -1001,
            "targetChannelId": -1002,
            "cloneFloorId": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let done = wait_for_terminal(&app, &job_id).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["totalFetched"], 4);
    assert_eq!(done["totalCloned"], 3);
    assert_eq!(done["lastClonedId"], 4);
    assert_eq!(mem.sent_texts(ChannelId(-1002)), vec!["one", "three", "four"]);

    let (status, list) = call(&app, "GET", "/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["totalJobs"], 1);
    assert_eq!(list["jobs"][0]["jobId"], job_id.as_str());
    assert_eq!(list["jobs"][0]["status"], "completed");
}

#[tokio::test]
async fn stop_clone_cancels_and_keeps_state_queryable() {
    let mem = seeded();
    let app = create_router(AppState {
        registry: JobRegistry::new(Arc::new(MemoryProvider::new(mem.clone()))),
        defaults: CloneDefaults {
            send_delay: Duration::from_secs(60),
            fetch_delay: Duration::ZERO,
            ..CloneDefaults::default()
        },
        default_account: Some(AccountId("main".to_string())),
    });

    let (_, body) = call(
        &app,
        "POST",
        "/start-clone",
        Some(json!({
            "source_chat_id": -1001,
            "target_chat_id": -1002,
            "clone_start_id": 1
        })),
    )
    .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let (status, stopped) = call(&app, "POST", &format!("/stop-clone?jobId={job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped, json!({"status": "stopped", "jobId": job_id}));

    let after = wait_for_terminal(&app, &job_id).await;
    assert_eq!(after["status"], "cancelled");
    assert!(mem.sent_texts(ChannelId(-1002)).len() <= 1);
}

#[tokio::test]
async fn unknown_jobs_are_404() {
    let app = app_with(seeded());

    let (status, body) = call(&app, "GET", "/status?jobId=nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (status, _) = call(&app, "POST", "/stop-clone?jobId=nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_requests_are_400() {
    let app = app_with(seeded());

    let (status, _) = call(
        &app,
        "POST",
        "/start-clone",
        Some(json!({"sourceChannelId": -1001})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        "POST",
        "/start-clone",
        Some(json!({
            "sourceChannelId": -1001,
            "targetChannelId": -1002,
            "cloneFloorId": 1,
            "limit": 1000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, _) = call(&app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = call(&app, "GET", "/jobs", None).await;
    assert_eq!(list["totalJobs"], 0);
}

#[tokio::test]
async fn unresolvable_target_ends_in_error() {
    let app = app_with(seeded());
    let (_, body) = call(
        &app,
        "POST",
        "/start-clone",
        Some(json!({
            "sourceChannelId": -1001,
            "targetChannelId": -9999,
            "cloneFloorId": 1
        })),
    )
    .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let done = wait_for_terminal(&app, &job_id).await;
    assert_eq!(done["status"], "error");
    assert!(done["errorDetail"].as_str().is_some());
    assert_eq!(done["totalCloned"], 0);
}
