use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json as JsonResponse, Response},
    routing::{get, post},
    serve, Router,
};

use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use uttale_audio::{audio_path_for, SegmentExtractor, SegmentFormat};
use uttale_core::types::{ReindexReport, SearchHit};
use uttale_core::Error;
use uttale_index::{Indexer, IndexStore, SearchService};

// App state
pub struct AppState {
    pub store: Arc<IndexStore>,
    pub search: SearchService,
    pub extractor: SegmentExtractor,
    pub corpus_root: PathBuf,
    pub audio_ext: String,
    reindex_running: AtomicBool,
    last_report: RwLock<Option<ReindexReport>>,
}

impl AppState {
    pub fn new(
        store: Arc<IndexStore>,
        search: SearchService,
        extractor: SegmentExtractor,
        corpus_root: PathBuf,
        audio_ext: String,
    ) -> Self {
        Self {
            store,
            search,
            extractor,
            corpus_root,
            audio_ext,
            reindex_running: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }
}

type ApiError = (StatusCode, JsonResponse<serde_json::Value>);

fn error_response(e: &Error) -> ApiError {
    let status = match e {
        Error::InvalidQuery(_) | Error::Range(_) | Error::Parse { .. } => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "request failed");
    }
    (status, JsonResponse(json!({ "error": e.to_string() })))
}

fn internal_error(detail: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        JsonResponse(json!({ "error": detail })),
    )
}

// Request structs
#[derive(Deserialize)]
struct ScopesQuery {
    #[serde(default)]
    q: String,
    #[serde(default = "default_scope_limit")]
    limit: usize,
}

fn default_scope_limit() -> usize {
    100
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
    scope: Option<String>,
    #[serde(default)]
    page: usize,
}

#[derive(Deserialize)]
struct AudioQuery {
    file: String,
    start: Option<f64>,
    end: Option<f64>,
    #[serde(default)]
    format: String,
}

async fn scopes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScopesQuery>,
) -> JsonResponse<Vec<String>> {
    let needle = query.q.to_lowercase();
    let mut scopes: Vec<String> = state
        .store
        .scopes()
        .into_iter()
        .filter(|s| s.to_lowercase().contains(&needle))
        .collect();
    scopes.truncate(query.limit);
    JsonResponse(scopes)
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<JsonResponse<Vec<SearchHit>>, ApiError> {
    let q = query
        .q
        .ok_or_else(|| error_response(&Error::InvalidQuery("missing q parameter".into())))?;
    let hits = tokio::task::spawn_blocking(move || {
        state.search.search(&q, query.scope.as_deref(), query.page)
    })
    .await
    .map_err(|_| internal_error("search task panicked"))?
    .map_err(|e| error_response(&e))?;
    Ok(JsonResponse(hits))
}

async fn audio(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AudioQuery>,
) -> Result<Response, ApiError> {
    let rel = sanitize_rel_path(&query.file).map_err(|e| error_response(&e))?;
    let path = audio_path_for(&state.corpus_root, &rel, &state.audio_ext);
    let byte_range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (start, end) = match (query.start, query.end) {
        (Some(start), Some(end)) => (start, end),
        // Without a time range the source file is served whole, with byte
        // ranges honored for seeking clients.
        (None, None) => return stream_source_file(path, byte_range).await,
        _ => {
            return Err(error_response(&Error::InvalidQuery(
                "start and end must be given together".to_string(),
            )))
        }
    };
    if byte_range.is_some() {
        return Err(error_response(&Error::InvalidQuery(
            "cannot combine a byte range with start/end".to_string(),
        )));
    }
    let format =
        SegmentFormat::from_name(&query.format).map_err(|e| error_response(&e))?;
    let bytes = tokio::task::spawn_blocking(move || {
        state.extractor.extract(&path, start, end, format)
    })
    .await
    .map_err(|_| internal_error("extraction task panicked"))?
    .map_err(|e| error_response(&e))?;

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type()),
            (header::CACHE_CONTROL, "max-age=86400"),
        ],
        (*bytes).clone(),
    )
        .into_response())
}

/// Serve the source audio file as-is: the whole body, or the requested
/// byte slice with a 206 and `Content-Range` when a `Range` header is
/// present. An unsatisfiable range is 416.
async fn stream_source_file(path: PathBuf, byte_range: Option<String>) -> Result<Response, ApiError> {
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(error_response(&Error::NotFound(format!(
                "audio file {}",
                path.display()
            ))))
        }
        Err(e) => return Err(error_response(&Error::Io(e))),
    };
    let file_size = data.len() as u64;

    let Some(raw) = byte_range else {
        return Ok((
            [
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (header::CACHE_CONTROL, "max-age=86400".to_string()),
            ],
            data,
        )
            .into_response());
    };
    let Some((start, end)) = parse_byte_range(&raw, file_size) else {
        return Err(error_response(&Error::InvalidQuery(format!(
            "invalid range header {raw:?}"
        ))));
    };
    if start >= file_size || end >= file_size || start > end {
        return Err((
            StatusCode::RANGE_NOT_SATISFIABLE,
            JsonResponse(json!({
                "error": format!("range {raw:?} not satisfiable for {file_size} bytes")
            })),
        ));
    }
    let body = data[start as usize..=end as usize].to_vec();
    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_RANGE, format!("bytes {start}-{end}/{file_size}")),
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CACHE_CONTROL, "max-age=86400".to_string()),
        ],
        body,
    )
        .into_response())
}

/// `bytes=a-b` with either side optional; absent sides default to the file
/// bounds. Returns `None` on anything that does not parse.
fn parse_byte_range(raw: &str, file_size: u64) -> Option<(u64, u64)> {
    let spec = raw.strip_prefix("bytes=")?;
    let (lhs, rhs) = spec.split_once('-')?;
    let start = if lhs.is_empty() { 0 } else { lhs.trim().parse().ok()? };
    let end = if rhs.is_empty() { file_size.saturating_sub(1) } else { rhs.trim().parse().ok()? };
    Some((start, end))
}

/// Transcript identifiers are corpus-relative; anything absolute or
/// escaping the root is rejected at the boundary.
fn sanitize_rel_path(raw: &str) -> Result<String, Error> {
    let path = Path::new(raw);
    if path.is_absolute()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(Error::InvalidQuery(format!("invalid file identifier {raw:?}")));
    }
    Ok(raw.to_string())
}

async fn reindex_start(State(state): State<Arc<AppState>>) -> Result<JsonResponse<serde_json::Value>, ApiError> {
    if state
        .reindex_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err((
            StatusCode::CONFLICT,
            JsonResponse(json!({ "error": "reindex already running" })),
        ));
    }
    let task_state = state.clone();
    tokio::task::spawn_blocking(move || {
        let indexer = Indexer::new(task_state.store.clone());
        match indexer.reindex(&task_state.corpus_root) {
            Ok(report) => {
                *task_state.last_report.write().expect("report lock poisoned") = Some(report);
            }
            Err(e) => error!(error = %e, "background reindex failed"),
        }
        task_state.reindex_running.store(false, Ordering::SeqCst);
    });
    Ok(JsonResponse(json!({ "status": "Reindexing started in background" })))
}

async fn reindex_status(State(state): State<Arc<AppState>>) -> JsonResponse<serde_json::Value> {
    let last_report = state.last_report.read().expect("report lock poisoned").clone();
    JsonResponse(json!({
        "running": state.reindex_running.load(Ordering::SeqCst),
        "last_report": last_report,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/uttale/Scopes", get(scopes))
        .route("/uttale/Search", get(search))
        .route("/uttale/Audio", get(audio))
        .route("/uttale/Reindex", post(reindex_start).get(reindex_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct Server {
    state: Arc<AppState>,
    addr: SocketAddr,
}

impl Server {
    pub fn new(state: Arc<AppState>, addr: SocketAddr) -> Self {
        Server { state, addr }
    }

    pub async fn start(self) -> anyhow::Result<()> {
        let app = router(self.state);
        info!("Starting server on {}", self.addr);
        serve(TcpListener::bind(self.addr).await?, app.into_make_service()).await?;
        Ok(())
    }
}
