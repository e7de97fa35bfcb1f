use std::path::Path;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::http::{header as http_header, Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use uttale_audio::{SegmentExtractor, SymphoniaDecoder};
use uttale_index::{Indexer, IndexStore, SearchService};
use uttale_server::{router, AppState};

fn write_corpus(root: &Path) {
    let dir = root.join("show/s1");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(
        dir.join("e1.vtt"),
        "WEBVTT\n\n00:00:00.000 --> 00:00:02.500\nhello world\n\n00:00:02.500 --> 00:00:05.000\ngoodbye\n",
    )
    .expect("write vtt");

    // Sibling audio: 6 seconds of silence at 8 kHz.
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(dir.join("e1.wav"), spec).expect("create wav");
    for _ in 0..48000 {
        writer.write_sample(0i16).expect("sample");
    }
    writer.finalize().expect("finalize");
}

fn app(corpus: &Path, index: &Path) -> axum::Router {
    let store = Arc::new(IndexStore::open(index).expect("open store"));
    Indexer::new(store.clone()).reindex(corpus).expect("reindex");
    let state = AppState::new(
        store.clone(),
        SearchService::new(store, 20, 160),
        SegmentExtractor::new(Box::new(SymphoniaDecoder), 16),
        corpus.to_path_buf(),
        "wav".to_string(),
    );
    router(Arc::new(state))
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::get(uri).body(axum::body::Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn search_endpoint_returns_resolved_hits() {
    let corpus = TempDir::new().expect("corpus");
    let index = TempDir::new().expect("index");
    write_corpus(corpus.path());
    let app = app(corpus.path(), index.path());

    let (status, hits) = get_json(&app, "/uttale/Search?q=hello").await;
    assert_eq!(status, StatusCode::OK);
    let hits = hits.as_array().expect("array");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["file"], "show/s1/e1.vtt");
    assert_eq!(hits[0]["start"], 0.0);
    assert_eq!(hits[0]["end"], 2.5);
    assert_eq!(hits[0]["text"], "hello world");
}

#[tokio::test]
async fn missing_query_is_a_bad_request() {
    let corpus = TempDir::new().expect("corpus");
    let index = TempDir::new().expect("index");
    write_corpus(corpus.path());
    let app = app(corpus.path(), index.path());

    let (status, _) = get_json(&app, "/uttale/Search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get_json(&app, "/uttale/Search?q=%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scopes_endpoint_lists_and_filters() {
    let corpus = TempDir::new().expect("corpus");
    let index = TempDir::new().expect("index");
    write_corpus(corpus.path());
    let app = app(corpus.path(), index.path());

    let (status, scopes) = get_json(&app, "/uttale/Scopes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scopes, serde_json::json!(["/show/s1"]));

    let (_, filtered) = get_json(&app, "/uttale/Scopes?q=nomatch").await;
    assert_eq!(filtered, serde_json::json!([]));
}

#[tokio::test]
async fn audio_endpoint_returns_wav_bytes_for_a_hit_range() {
    let corpus = TempDir::new().expect("corpus");
    let index = TempDir::new().expect("index");
    write_corpus(corpus.path());
    let app = app(corpus.path(), index.path());

    let response = app
        .clone()
        .oneshot(
            Request::get("/uttale/Audio?file=show/s1/e1.vtt&start=0.0&end=2.5&format=wav")
                .body(axum::body::Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/wav");
    assert_eq!(response.headers()["cache-control"], "max-age=86400");
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert!(body.starts_with(b"RIFF"));
}

#[tokio::test]
async fn audio_endpoint_serves_the_whole_file_without_a_time_range() {
    let corpus = TempDir::new().expect("corpus");
    let index = TempDir::new().expect("index");
    write_corpus(corpus.path());
    let app = app(corpus.path(), index.path());
    let file_size = std::fs::metadata(corpus.path().join("show/s1/e1.wav"))
        .expect("stat")
        .len();

    let response = app
        .clone()
        .oneshot(
            Request::get("/uttale/Audio?file=show/s1/e1.vtt")
                .body(axum::body::Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["accept-ranges"], "bytes");
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert_eq!(body.len() as u64, file_size);
    assert!(body.starts_with(b"RIFF"));
}

#[tokio::test]
async fn audio_endpoint_honors_byte_ranges() {
    let corpus = TempDir::new().expect("corpus");
    let index = TempDir::new().expect("index");
    write_corpus(corpus.path());
    let app = app(corpus.path(), index.path());
    let file_size = std::fs::metadata(corpus.path().join("show/s1/e1.wav"))
        .expect("stat")
        .len();

    let response = app
        .clone()
        .oneshot(
            Request::get("/uttale/Audio?file=show/s1/e1.vtt")
                .header(http_header::RANGE, "bytes=0-3")
                .body(axum::body::Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()["content-range"],
        format!("bytes 0-3/{file_size}")
    );
    assert_eq!(response.headers()["accept-ranges"], "bytes");
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert_eq!(&body[..], b"RIFF");

    // Beyond the file: unsatisfiable.
    let response = app
        .clone()
        .oneshot(
            Request::get("/uttale/Audio?file=show/s1/e1.vtt")
                .header(http_header::RANGE, "bytes=0-999999999")
                .body(axum::body::Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

    // A byte range cannot be combined with a time range.
    let response = app
        .clone()
        .oneshot(
            Request::get("/uttale/Audio?file=show/s1/e1.vtt&start=0.0&end=1.0")
                .header(http_header::RANGE, "bytes=0-3")
                .body(axum::body::Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audio_endpoint_rejects_a_lone_time_bound() {
    let corpus = TempDir::new().expect("corpus");
    let index = TempDir::new().expect("index");
    write_corpus(corpus.path());
    let app = app(corpus.path(), index.path());

    let (status, _) = get_json(&app, "/uttale/Audio?file=show/s1/e1.vtt&start=0.0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get_json(&app, "/uttale/Audio?file=show/s1/e1.vtt&end=1.0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audio_endpoint_maps_errors_to_statuses() {
    let corpus = TempDir::new().expect("corpus");
    let index = TempDir::new().expect("index");
    write_corpus(corpus.path());
    let app = app(corpus.path(), index.path());

    // Reversed range
    let (status, _) = get_json(&app, "/uttale/Audio?file=show/s1/e1.vtt&start=2.0&end=1.0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // Beyond duration
    let (status, _) = get_json(&app, "/uttale/Audio?file=show/s1/e1.vtt&start=0.0&end=60.0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // No such transcript
    let (status, _) = get_json(&app, "/uttale/Audio?file=show/s1/e9.vtt&start=0.0&end=1.0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    // Path escape attempt
    let (status, _) = get_json(&app, "/uttale/Audio?file=../../etc/passwd&start=0.0&end=1.0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // Unknown format
    let (status, _) =
        get_json(&app, "/uttale/Audio?file=show/s1/e1.vtt&start=0.0&end=1.0&format=mp3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reindex_endpoint_acknowledges_and_reports() {
    let corpus = TempDir::new().expect("corpus");
    let index = TempDir::new().expect("index");
    write_corpus(corpus.path());
    let app = app(corpus.path(), index.path());

    let response = app
        .clone()
        .oneshot(
            Request::post("/uttale/Reindex")
                .body(axum::body::Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    // The pass is tiny; poll briefly for the published report.
    for _ in 0..50 {
        let (status, body) = get_json(&app, "/uttale/Reindex").await;
        assert_eq!(status, StatusCode::OK);
        if !body["last_report"].is_null() {
            assert_eq!(body["last_report"]["unchanged"], 1);
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("reindex report never published");
}
