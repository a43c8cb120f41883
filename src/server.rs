//! HTTP API for scraper generation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/generate_scraper/` | Generate crawl4ai code for `{"query": "..."}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/generate_scraper` without the trailing slash is routed to the same
//! handler.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `llm_disabled` (503),
//! `embeddings_disabled` (503), `generation_failed` (500).

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::generator::generate_scraper_code;
use crate::llm::{create_chat, ChatClient};
use crate::retrieval::Retriever;
use crate::store::{open_store, Store};

/// Shared handler state. Everything is behind `Arc` so cloning per request
/// is cheap.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatClient>,
    retrieval: Arc<RetrievalConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatClient>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chat,
            retrieval: Arc::new(retrieval),
        }
    }
}

/// Routes and CORS, without binding.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate_scraper/", post(handle_generate))
        .route("/generate_scraper", post(handle_generate))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Binds `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::from(open_store(config).await?);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
    let chat: Arc<dyn ChatClient> = Arc::from(create_chat(&config.llm)?);

    if !chat.is_enabled() {
        println!("Warning: no LLM configured, /generate_scraper/ will return 503");
    }

    let app = build_router(AppState::new(store, embedder, chat, config.retrieval.clone()));

    let bind_addr = config.server.bind.clone();
    println!("crawlrag server listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "Server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unavailable(code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: code.to_string(),
        message: message.into(),
    }
}

fn generation_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "generation_failed".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /generate_scraper/ ============

#[derive(Deserialize)]
struct ScraperRequest {
    #[serde(default)]
    query: String,
}

#[derive(Serialize)]
struct ScraperResponse {
    generated_code: String,
}

async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<ScraperRequest>,
) -> Result<Json<ScraperResponse>, AppError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if !state.chat.is_enabled() {
        return Err(unavailable(
            "llm_disabled",
            "No LLM configured. Set [llm] provider = \"openai\" and OPENAI_API_KEY.",
        ));
    }
    if state.embedder.dims() == 0 {
        return Err(unavailable(
            "embeddings_disabled",
            "Embeddings are disabled. Set [embedding] provider = \"openai\" and OPENAI_API_KEY.",
        ));
    }

    let retriever = Retriever::new(state.store.as_ref(), state.embedder.as_ref(), &state.retrieval);
    let code = generate_scraper_code(&retriever, state.chat.as_ref(), query)
        .await
        .map_err(|e| {
            error!(query, error = %e, "Scraper generation failed");
            generation_failed(e.to_string())
        })?;

    Ok(Json(ScraperResponse {
        generated_code: code,
    }))
}
