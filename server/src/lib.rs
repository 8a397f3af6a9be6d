use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use datamart_core::corpus::{CorpusProvider, DatalakeCorpus};
use datamart_core::indexer::{IndexReport, Indexer};
use datamart_core::storage::StorageBackend;
use datamart_core::tokenizer::tokenize;
use datamart_core::{DocumentMetadata, IndexStats};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Deserialize)]
pub struct IndexParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub title: String,
    pub author: String,
    pub language: String,
    pub snippet: Option<String>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub document_id: String,
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Required in `X-ADMIN-TOKEN` for `POST /index`; indexing over HTTP is refused when unset.
    pub admin_token: Option<String>,
    /// Comma-separated allowed origins; any origin when unset or unparsable.
    pub cors_allow_origin: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn StorageBackend>,
    pub corpus: Arc<DatalakeCorpus>,
    pub admin_token: Option<String>,
}

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub fn build_app(backend: Arc<dyn StorageBackend>, corpus: DatalakeCorpus, config: ServerConfig) -> Router {
    let app_state = AppState { backend, corpus: Arc::new(corpus), admin_token: config.admin_token };

    let cors = match config.cors_allow_origin {
        Some(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/search/title", get(title_search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/stats", get(stats_handler))
        .route("/index", post(index_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.backend.check_connectivity() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "backend unavailable")
    }
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    search_blocking(state, params, false).await
}

pub async fn title_search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    search_blocking(state, params, true).await
}

/// Backend reads and body fetches for snippets stay off the async workers.
async fn search_blocking(state: AppState, params: SearchParams, title_only: bool) -> Result<Json<SearchResponse>, ApiError> {
    tokio::task::spawn_blocking(move || run_search(&state, params, title_only))
        .await
        .map_err(internal)?
}

fn run_search(state: &AppState, params: SearchParams, title_only: bool) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let indexer = Indexer::new(&*state.backend, &*state.corpus);
    let matches = if title_only { indexer.search_title(&params.q) } else { indexer.search(&params.q) };
    let matches = matches.map_err(internal)?;
    let total_hits = matches.len();
    let k = params.k.clamp(1, 100);

    let highlighter = term_pattern(&params.q);
    let mut results = Vec::with_capacity(k.min(total_hits));
    for document_id in matches.into_iter().take(k) {
        let meta = indexer.get_document_info(&document_id).map_err(internal)?.unwrap_or_default();
        let snippet = highlighter.as_ref().and_then(|re| {
            let (_, body) = state.corpus.fetch(&document_id).ok()?;
            snippet(&body, re)
        });
        results.push(SearchHit { document_id, title: meta.title, author: meta.author, language: meta.language, snippet });
    }

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, total_hits, title_only, "search served");
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> Result<Json<DocumentResponse>, ApiError> {
    match state.backend.get_document_metadata(&doc_id).map_err(internal)? {
        Some(metadata) => Ok(Json(DocumentResponse { document_id: doc_id, metadata })),
        None => Err((StatusCode::NOT_FOUND, format!("document {doc_id} not found"))),
    }
}

pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<IndexStats>, ApiError> {
    state.backend.get_stats().map(Json).map_err(internal)
}

async fn index_handler(State(state): State<AppState>, headers: HeaderMap, Query(params): Query<IndexParams>) -> Result<Json<IndexReport>, ApiError> {
    authorize(&state, &headers)?;
    if !state.backend.check_connectivity() {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "backend unavailable".into()));
    }
    let backend = state.backend.clone();
    let corpus = state.corpus.clone();
    let report = tokio::task::spawn_blocking(move || Indexer::new(&*backend, &*corpus).index_all(params.force))
        .await
        .map_err(internal)?
        .map_err(internal)?;
    Ok(Json(report))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

/// Case-insensitive whole-word matcher for the query's index terms.
fn term_pattern(query: &str) -> Option<Regex> {
    let mut terms: Vec<String> = tokenize(query).into_iter().collect();
    if terms.is_empty() { return None; }
    terms.sort();
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Window of text around the first term match, with every match wrapped in `<em>`.
fn snippet(text: &str, re: &Regex) -> Option<String> {
    if text.is_empty() { return None; }
    let window = match re.find(text) {
        Some(m) => {
            let start = char_floor(text, m.start().saturating_sub(SNIPPET_BEFORE));
            let end = char_floor(text, (m.start() + SNIPPET_AFTER).min(text.len()));
            &text[start..end]
        }
        None => &text[..char_floor(text, SNIPPET_AFTER.min(text.len()))],
    };
    Some(re.replace_all(window.trim(), "<em>$0</em>").into_owned())
}

fn char_floor(text: &str, mut idx: usize) -> usize {
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_highlights_whole_words_only() {
        let re = term_pattern("whale").unwrap();
        let s = snippet("Call me Ishmael. The Whale, the whales, the whale.", &re).unwrap();
        assert!(s.contains("<em>Whale</em>"));
        assert!(s.contains("<em>whale</em>."));
        assert!(s.contains("whales"));
        assert!(!s.contains("<em>whales"));
    }

    #[test]
    fn snippet_window_respects_char_boundaries() {
        let text = format!("{} whale {}", "é".repeat(120), "ü".repeat(150));
        let re = term_pattern("whale").unwrap();
        let s = snippet(&text, &re).unwrap();
        assert!(s.contains("<em>whale</em>"));
    }

    #[test]
    fn no_pattern_for_termless_query() {
        assert!(term_pattern("a an ?").is_none());
    }
}
