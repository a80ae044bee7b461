//! HTTP API over the crawl, index, and chat operations.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use futures_util::stream;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{CrawlConfig, SiteChatConfig};
use crate::crawler::{PageFetcher, SiteCrawler, StaticFetcher};
use crate::index::{KnowledgeIndex, RebuildReport};
use crate::types::{ChatMessage, SiteChatError};
use crate::workflow::{self, Answer, ChatWorkflow};

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<ChatWorkflow>,
    pub index: Arc<KnowledgeIndex>,
    pub config: Arc<SiteChatConfig>,
}

/// Error wrapper giving each failure class its HTTP status.
struct ApiError(SiteChatError);

impl From<SiteChatError> for ApiError {
    fn from(err: SiteChatError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SiteChatError::NotReady | SiteChatError::Config(_) => StatusCode::BAD_REQUEST,
            SiteChatError::Embedding(_) | SiteChatError::Completion(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct IndexRequest {
    pub url: String,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub max_pages: Option<usize>,
    /// Render pages in a headless browser before extraction.
    #[serde(default)]
    pub use_rendered: bool,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchMatch {
    pub url: String,
    pub title: String,
    pub heading: Option<String>,
    pub text: String,
    pub score: f32,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<SearchMatch>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/index", post(index_site))
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/search", post(search))
        .with_state(state)
}

/// Binds and serves until the process is stopped.
pub async fn serve(state: AppState) -> Result<(), SiteChatError> {
    let bind = state.config.bind.clone();
    let listener = TcpListener::bind(&bind).await?;
    info!(bind = %bind, "API listening");
    axum::serve(listener, router(state).into_make_service())
        .await
        .map_err(|e| SiteChatError::Io(std::io::Error::other(e)))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "index_ready": state.index.is_ready().await,
        "passages": state.index.count().await,
    }))
}

async fn build_fetcher(
    use_rendered: bool,
    config: &CrawlConfig,
) -> Result<Arc<dyn PageFetcher>, SiteChatError> {
    if use_rendered {
        #[cfg(feature = "rendered")]
        {
            // A browser per crawl; index requests are infrequent.
            let fetcher = crate::crawler::RenderedFetcher::launch(config.fetch_timeout).await?;
            return Ok(Arc::new(fetcher));
        }
        #[cfg(not(feature = "rendered"))]
        return Err(SiteChatError::Config(
            "this build does not include the rendered fetcher".into(),
        ));
    }
    let fetcher = StaticFetcher::new(config.fetch_timeout)?;
    Ok(Arc::new(fetcher))
}

async fn index_site(
    State(state): State<AppState>,
    Json(request): Json<IndexRequest>,
) -> Result<Json<RebuildReport>, ApiError> {
    let mut config = CrawlConfig::new(request.url);
    if let Some(depth) = request.max_depth {
        config = config.with_max_depth(depth);
    }
    if let Some(pages) = request.max_pages {
        config = config.with_max_pages(pages);
    }

    let fetcher = build_fetcher(request.use_rendered, &config).await?;
    let crawler = SiteCrawler::new(fetcher, config)?;
    let pages = crawler.crawl().await?;
    let report = state.index.rebuild(&pages).await?;
    Ok(Json(report))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Answer>, ApiError> {
    let history = workflow::clamp_history(&request.history);
    let answer = state
        .workflow
        .process_query(
            &request.query,
            history,
            request.top_k.unwrap_or(state.config.top_k),
        )
        .await?;
    Ok(Json(answer))
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl futures_util::Stream<Item = Result<SseEvent, Infallible>>> {
    let history = workflow::clamp_history(&request.history).to_vec();
    let rx = state.workflow.process_query_stream(
        request.query,
        history,
        request.top_k.unwrap_or(state.config.top_k),
    );

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event(event.kind()).data(data))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let k = request.top_k.unwrap_or(state.config.top_k);
    let retrieval = state.index.search(&request.query, k).await?;
    Ok(Json(SearchResponse {
        query: retrieval.query,
        matches: retrieval
            .matches
            .into_iter()
            .map(|m| SearchMatch {
                url: m.passage.source_url,
                title: m.passage.source_title,
                heading: m.passage.heading,
                text: m.passage.text,
                score: m.score,
            })
            .collect(),
    }))
}
