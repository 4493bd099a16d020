// Axum routers for the bundle server and the auxiliary data server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path as UrlPath, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::server::bundle::normalize_rel_path;
use crate::server::source_map::SourceMapProvider;

#[derive(Clone)]
pub(crate) struct BundleState {
    pub(crate) root: PathBuf,
    pub(crate) source_maps: Arc<SourceMapProvider>,
    pub(crate) verbose: bool,
}

#[derive(Clone)]
pub(crate) struct AuxState {
    pub(crate) root: Option<PathBuf>,
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) verbose: bool,
}

#[derive(serde::Deserialize)]
struct SourceMapQuery {
    file: String,
}

#[derive(serde::Deserialize)]
struct ProxyQuery {
    src: String,
}

/// Router serving the bundle directory plus the source-map endpoint.
pub(crate) fn bundle_router(state: BundleState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/__source-map", get(source_map_handler))
        .route("/{*path}", get(file_handler))
        .with_state(state)
}

/// Router for out-of-band data, kept off the navigation port.
pub(crate) fn aux_router(state: AuxState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/proxy", get(proxy_handler))
        .with_state(state)
}

async fn index_handler(State(state): State<BundleState>) -> Response {
    serve_from(&state.root, "index.html", state.verbose).await
}

async fn file_handler(
    State(state): State<BundleState>,
    UrlPath(path): UrlPath<String>,
) -> Response {
    serve_from(&state.root, &path, state.verbose).await
}

async fn source_map_handler(
    State(state): State<BundleState>,
    Query(q): Query<SourceMapQuery>,
) -> Response {
    match state.source_maps.load(&q.file) {
        Ok(Some(map)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            map.as_str().to_owned(),
        )
            .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "source map not found").into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// `GET /proxy?src=<bundle-relative path>`: stream a local asset to the page.
async fn proxy_handler(State(state): State<AuxState>, Query(q): Query<ProxyQuery>) -> Response {
    let Some(root) = &state.root else {
        return (StatusCode::NOT_FOUND, "no local bundle to proxy from").into_response();
    };
    let Ok(_permit) = state.permits.acquire().await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response();
    };
    let src = q.src.strip_prefix("file://").unwrap_or(&q.src);
    serve_from(root, src, state.verbose).await
}

async fn serve_from(root: &Path, rel: &str, verbose: bool) -> Response {
    let rel = match normalize_rel_path(rel) {
        Ok(rel) => rel,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let path = root.join(&rel);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            if verbose {
                debug!(file = %rel, len = bytes.len(), "serving bundle file");
            }
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type_for(&rel))],
                bytes,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub(crate) fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[path = "../../tests/unit/server/http.rs"]
mod tests;
