//! Router behaviour, driven with `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

use common::fakes::{FakeSource, FakeStore};
use common::{id, payload, Harness};
use epistream_core::catalog::CatalogStore;
use epistream_core::http::{router, AppState};

const CATALOG: &str = r#"{
    "Show": {
        "S1": [
            { "episode": 1, "title": "Pilot", "url": "https://t.me/show/1" },
            { "episode": 2, "title": "Second", "url": "https://t.me/show/2" }
        ],
        "S2": [
            { "episode": 1, "title": "Return", "url": "https://t.me/show/3" }
        ]
    },
    "Other": {
        "S1": [ { "episode": 1, "title": "Only", "url": "https://t.me/other/1" } ]
    }
}"#;

fn app(h: &Harness) -> Router {
    router(AppState {
        pipeline: h.pipeline.clone(),
    })
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn ranged(uri: &str, range: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::RANGE, range)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

/// Poll `/progress` until the object is at least `percent` buffered.
async fn wait_for_percent(app: &Router, object: &str, percent: f64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let resp = app
            .clone()
            .oneshot(request(Method::GET, &format!("/progress/{object}")))
            .await
            .unwrap();
        let json = body_json(resp).await;
        if json["percentage"].as_f64().is_some_and(|p| p >= percent) {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "never reached {percent}%: {json}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn health_and_status() {
    let h = Harness::start(FakeSource::new(1024, Duration::ZERO), FakeStore::default()).await;
    let app = app(&h);

    let resp = app.clone().oneshot(request(Method::GET, "/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "ok");

    let resp = app.clone().oneshot(request(Method::GET, "/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["pool"]["workers"], 2);
    assert_eq!(json["active_jobs"], serde_json::json!([]));

    let resp = app.oneshot(request(Method::POST, "/cleanup")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["files_removed"], 0);
    h.shutdown().await;
}

#[tokio::test]
async fn catalog_routes_keep_order() {
    let h = Harness::start(FakeSource::new(1024, Duration::ZERO), FakeStore::default()).await;
    h.catalog.import_json(CATALOG).await.unwrap();
    let app = app(&h);

    let resp = app.clone().oneshot(request(Method::GET, "/catalog/series")).await.unwrap();
    assert_eq!(
        body_json(resp).await,
        serde_json::json!([{ "name": "Show" }, { "name": "Other" }])
    );

    let resp = app.clone().oneshot(request(Method::GET, "/catalog/series/Show")).await.unwrap();
    assert_eq!(body_json(resp).await, serde_json::json!(["S1", "S2"]));

    let resp = app
        .clone()
        .oneshot(request(Method::GET, "/catalog/series/Show/S1"))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json[0]["object_id"], "show:1");
    assert_eq!(json[0]["title"], "Pilot");
    assert_eq!(json[1]["episode"], 2);
    assert_eq!(json[1]["downloaded"], false);

    let resp = app
        .oneshot(request(Method::GET, "/catalog/series/Nope"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "not_found");
    h.shutdown().await;
}

#[tokio::test]
async fn fetch_reports_queue_state() {
    let oid = id("chan:10");
    let source = FakeSource::new(1024, Duration::ZERO).with_object(&oid, payload(8192));
    let release = source.hold_at(&oid, 1024);
    let h = Harness::start(source, FakeStore::default()).await;
    let app = app(&h);

    let resp = app.clone().oneshot(request(Method::POST, "/fetch/chan:10")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "queued");
    assert_eq!(json["object_id"], "chan:10");
    assert_eq!(json["priority"], "HIGH");

    let resp = app.clone().oneshot(request(Method::POST, "/fetch/chan:10")).await.unwrap();
    assert_eq!(body_json(resp).await["status"], "already_queued");

    let resp = app.clone().oneshot(request(Method::GET, "/progress/chan:10")).await.unwrap();
    assert_eq!(body_json(resp).await["downloading"], true);

    let resp = app.clone().oneshot(request(Method::POST, "/fetch/bad%2Fid")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    release.add_permits(1);
    h.shutdown().await;
}

#[tokio::test]
async fn fetch_of_uploaded_object_returns_remote_url() {
    let h = Harness::start(FakeSource::new(1024, Duration::ZERO), FakeStore::default()).await;
    let oid = id("chan:11");
    h.catalog.mark_downloaded(&oid, "https://cdn.example/chan:11").await.unwrap();

    let resp = app(&h).oneshot(request(Method::POST, "/fetch/chan:11")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["status"], "already_uploaded");
    assert_eq!(json["remote_url"], "https://cdn.example/chan:11");
    assert_eq!(h.source.total_opens(), 0);
    h.shutdown().await;
}

#[tokio::test]
async fn progress_of_unknown_object() {
    let h = Harness::start(FakeSource::new(1024, Duration::ZERO), FakeStore::default()).await;
    let resp = app(&h).oneshot(request(Method::GET, "/progress/chan:404")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["downloading"], false);
    assert_eq!(json["playable"], false);
    assert!(json.get("percentage").is_none());
    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_serves_prefix_while_fetch_is_running() {
    let oid = id("chan:12");
    let data = payload(100 * 1024);
    let source = FakeSource::new(1024, Duration::ZERO).with_object(&oid, data.clone());
    // Hold the source at 5%.
    let release = source.hold_at(&oid, 5 * 1024);
    let h = Harness::start(source, FakeStore::default()).await;
    let app = app(&h);

    let resp = app.clone().oneshot(request(Method::POST, "/fetch/chan:12")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    wait_for_percent(&app, "chan:12", 3.0).await;

    let resp = app
        .clone()
        .oneshot(ranged("/stream/chan:12", "bytes=0-3071"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes 0-3071/102400");
    assert_eq!(resp.headers()[header::CONTENT_LENGTH], "3072");
    assert_eq!(resp.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(body_bytes(resp).await, &data[..3072]);

    // Full body: bytes past the hold arrive once the source resumes.
    let resp = app.clone().oneshot(request(Method::GET, "/stream/chan:12")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_LENGTH], "102400");
    release.add_permits(1);
    let body = tokio::time::timeout(Duration::from_secs(10), body_bytes(resp))
        .await
        .unwrap();
    assert_eq!(body, data);
    h.shutdown().await;
}

#[tokio::test]
async fn stream_rejects_unsatisfiable_range() {
    let oid = id("chan:13");
    let source = FakeSource::new(1024, Duration::ZERO).with_object(&oid, payload(4096));
    let h = Harness::start(source, FakeStore::default()).await;

    let resp = app(&h)
        .oneshot(ranged("/stream/chan:13", "bytes=5000-"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes */4096");
    assert_eq!(body_json(resp).await["error"], "range_unsatisfiable");
    h.shutdown().await;
}

#[tokio::test]
async fn stream_redirects_to_stored_copy() {
    let h = Harness::start(FakeSource::new(1024, Duration::ZERO), FakeStore::default()).await;
    let oid = id("chan:14");
    h.catalog.mark_downloaded(&oid, "https://cdn.example/chan:14").await.unwrap();

    let resp = app(&h).oneshot(request(Method::GET, "/stream/chan:14")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(resp.headers()[header::LOCATION], "https://cdn.example/chan:14");
    assert_eq!(h.source.total_opens(), 0);
    h.shutdown().await;
}

#[tokio::test]
async fn stream_reports_source_failure_as_bad_gateway() {
    // The fake source has no such object: a non-retryable NotFound.
    let h = Harness::start(FakeSource::new(1024, Duration::ZERO), FakeStore::default()).await;
    let resp = app(&h).oneshot(request(Method::GET, "/stream/chan:15")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(resp).await["error"], "source_unavailable");
    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_of_queued_object_waits_for_a_free_worker() {
    let busy = id("chan:17");
    let waiting = id("chan:18");
    let data = payload(8 * 1024);
    let source = FakeSource::new(1024, Duration::ZERO)
        .with_object(&busy, payload(8 * 1024))
        .with_object(&waiting, data.clone());
    let release = source.hold_at(&busy, 1024);
    let h = Harness::start_with(source, FakeStore::default(), |cfg| {
        cfg.fetch_workers = 1;
        cfg.stream.stall_secs = 1;
    })
    .await;
    let app = app(&h);

    let resp = app.clone().oneshot(request(Method::POST, "/fetch/chan:17")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    wait_for_percent(&app, "chan:17", 1.0).await;

    let pending = tokio::spawn(app.clone().oneshot(request(Method::GET, "/stream/chan:18")));
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!pending.is_finished(), "queued stream gave up while the only worker was busy");

    release.add_permits(1);
    let resp = tokio::time::timeout(Duration::from_secs(10), pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, data);
    h.shutdown().await;
}

#[tokio::test]
async fn head_starts_the_fetch_without_waiting() {
    let oid = id("chan:16");
    let source = FakeSource::new(1024, Duration::ZERO).with_object(&oid, payload(4096));
    let release = source.hold_at(&oid, 0);
    let h = Harness::start(source, FakeStore::default()).await;
    let app = app(&h);

    let resp = tokio::time::timeout(
        Duration::from_secs(2),
        app.clone().oneshot(request(Method::HEAD, "/stream/chan:16")),
    )
    .await
    .expect("HEAD must not wait for data")
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::ACCEPT_RANGES], "bytes");
    assert!(h.pipeline.gate().is_active(&oid).await);

    release.add_permits(1);
    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn season_route_counts_queued_episodes() {
    let mut source = FakeSource::new(1024, Duration::ZERO);
    for oid in ["show:1", "show:2", "show:3", "other:1"] {
        source = source.with_object(&id(oid), payload(2048));
    }
    let h = Harness::start(source, FakeStore::default()).await;
    h.catalog.import_json(CATALOG).await.unwrap();
    h.catalog
        .mark_downloaded(&id("show:1"), "https://cdn.example/show:1")
        .await
        .unwrap();
    let app = app(&h);

    let resp = app
        .clone()
        .oneshot(request(Method::POST, "/fetch/season/Show/S1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await,
        serde_json::json!({ "status": "queued", "queued_count": 1 })
    );

    let resp = app
        .oneshot(request(Method::POST, "/fetch/season/Show/S9"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    h.shutdown().await;
}
