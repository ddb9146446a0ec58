// HTTP surface
//
// - /analyze_text: regularity score for a project's model
// - /api/analyze: per-token detail
// - /api/all_projects: project enumeration (configuration only)
// - /get_article_contents: page text via the process-wide page cache
// - /, /client/*, /data/*: static client bundle and data files

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use regularity_core::{
    detail, score, AnalyzeResponse, AnalyzeTextRequest, AnalyzeTextResponse, ArticleRequest,
    ArticleResponse, Project, ProjectConfig, ProjectRegistry, TokenPrediction, ADAPTER_TOP_K,
};
use regularity_local::PageCache;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("model failed: {0}")]
    Model(String),

    #[error("model did not answer within {0:?}")]
    ModelTimeout(Duration),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("fetch failed: {0}")]
    Fetch(String),
}

impl From<regularity_core::Error> for ApiError {
    fn from(e: regularity_core::Error) -> Self {
        use regularity_core::Error as E;
        match e {
            E::InvalidUrl(m) => ApiError::InvalidUrl(m),
            E::Fetch(m) => ApiError::Fetch(m),
            E::Model(m) | E::UnknownModel(m) | E::NotConfigured(m) => ApiError::Model(m),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Model(_) | ApiError::Fetch(_) => StatusCode::BAD_GATEWAY,
            ApiError::ModelTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Process-wide context handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProjectRegistry>,
    pub pages: Arc<PageCache>,
    /// Scoring budget: only the first `top_k` candidates of a position count.
    pub top_k: usize,
    /// Upper bound on a single model call.
    pub model_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StaticDirs {
    /// Built client bundle, served under `/client`.
    pub client_dir: PathBuf,
    /// Data directory, served under `/data`.
    pub data_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn predict(
    state: &AppState,
    project: &Project,
    text: &str,
    top_k: usize,
) -> Result<Vec<TokenPrediction>, ApiError> {
    let call = project.model().predict(text, top_k);
    match tokio::time::timeout(state.model_timeout, call).await {
        Ok(Ok(predictions)) => Ok(predictions),
        Ok(Err(e)) => {
            tracing::warn!(project = %project.id(), error = %e, "model call failed");
            Err(e.into())
        }
        Err(_) => {
            tracing::warn!(
                project = %project.id(),
                timeout_ms = state.model_timeout.as_millis() as u64,
                "model call timed out"
            );
            Err(ApiError::ModelTimeout(state.model_timeout))
        }
    }
}

/// POST /analyze_text
///
/// An unknown project scores an empty prediction list, i.e. `regularity: 0.0`.
pub async fn analyze_text(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeTextRequest>,
) -> Result<Json<AnalyzeTextResponse>, ApiError> {
    let predictions = match state.registry.resolve(&req.project) {
        Some(project) => predict(&state, project, &req.text, state.top_k).await?,
        None => {
            tracing::debug!(project = %req.project, "unknown project");
            Vec::new()
        }
    };
    let result = score(&predictions, state.top_k);
    tracing::info!(
        project = %req.project,
        tokens = predictions.len(),
        regularity = result.regularity,
        "analyzed text"
    );
    Ok(Json(AnalyzeTextResponse::new(req, &result)))
}

/// POST /api/analyze
///
/// Over-fetches candidates for display; membership still uses the scoring budget.
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeTextRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let result = match state.registry.resolve(&req.project) {
        Some(project) => {
            let fetch_k = ADAPTER_TOP_K.max(state.top_k);
            let predictions = predict(&state, project, &req.text, fetch_k).await?;
            Some(detail(&predictions, state.top_k))
        }
        None => None,
    };
    Ok(Json(AnalyzeResponse {
        request: req,
        result,
    }))
}

/// GET /api/all_projects
pub async fn all_projects(State(state): State<AppState>) -> Json<BTreeMap<String, ProjectConfig>> {
    Json(state.registry.list_all())
}

/// POST /get_article_contents
pub async fn get_article_contents(
    State(state): State<AppState>,
    Json(req): Json<ArticleRequest>,
) -> Result<Json<ArticleResponse>, ApiError> {
    let started = std::time::Instant::now();
    let page = state.pages.get_or_fetch(&req.url).await.map_err(|e| {
        tracing::warn!(url = %req.url, error = %e, "article fetch failed");
        ApiError::from(e)
    })?;
    tracing::info!(
        url = %req.url,
        source = ?page.source,
        chars = page.content.chars().count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "article contents"
    );
    Ok(Json(ArticleResponse {
        content: page.content,
    }))
}

/// GET / -> client entry point
pub async fn redirect_to_client() -> Redirect {
    Redirect::to("client/index.html")
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the router. CORS is permissive (any origin, `Content-Type` header) when enabled.
pub fn build_router(state: AppState, dirs: &StaticDirs, cors: bool) -> Router {
    let router = Router::new()
        .route("/", get(redirect_to_client))
        .route("/analyze_text", post(analyze_text))
        .route("/get_article_contents", post(get_article_contents))
        .route("/api/analyze", post(analyze))
        .route("/api/all_projects", get(all_projects))
        .nest_service("/client", ServeDir::new(&dirs.client_dir))
        .nest_service("/data", ServeDir::new(&dirs.data_dir))
        .with_state(state);

    if !cors {
        return router;
    }
    router.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers([header::CONTENT_TYPE]),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
