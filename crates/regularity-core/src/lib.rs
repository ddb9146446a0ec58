use serde::{Deserialize, Serialize};

pub mod registry;
pub mod score;

pub use registry::{ModelCatalog, ModelFactory, Project, ProjectConfig, ProjectRegistry, Resolution};
pub use score::{detail, score, AnalysisDetail, AnalysisResult, TokenDetail};

/// Scoring budget used by the service when the caller does not pick one.
pub const DEFAULT_TOP_K: usize = 10;

/// Candidate budget requested from adapters when the per-token detail is shown.
///
/// Scoring still only looks at the first `k` candidates of each position.
pub const ADAPTER_TOP_K: usize = 20;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("model failed: {0}")]
    Model(String),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub token: String,
    /// Model confidence; higher is better. Units are adapter-specific (logprob, frequency).
    pub score: f64,
}

impl Candidate {
    pub fn new(token: impl Into<String>, score: f64) -> Self {
        Self {
            token: token.into(),
            score,
        }
    }
}

/// One token position of the input text as seen by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrediction {
    pub position: usize,
    /// The token actually present in the text at this position.
    pub observed: String,
    /// What the model expected here given the preceding tokens, best-first.
    /// Empty for position 0.
    pub candidates: Vec<Candidate>,
}

impl TokenPrediction {
    pub fn new(position: usize, observed: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        Self {
            position,
            observed: observed.into(),
            candidates,
        }
    }
}

/// A language model that can say, for every token of a text, what it would have predicted.
///
/// Implementations own tokenization: the returned sequence is in the model's native tokens,
/// one entry per token, with candidates for position `i` computed from positions `< i` only.
#[async_trait::async_trait]
pub trait PredictiveModel: Send + Sync {
    fn name(&self) -> &str;
    async fn predict(&self, text: &str, top_k: usize) -> Result<Vec<TokenPrediction>>;
}

/// Fetch a page and return its readable text.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzeTextRequest {
    pub project: String,
    pub text: String,
}

/// Echo of the request, returned alongside every analysis.
pub type RequestEcho = AnalyzeTextRequest;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzeTextResponse {
    pub request: RequestEcho,
    pub regularity: f64,
}

impl AnalyzeTextResponse {
    pub fn new(request: RequestEcho, result: &AnalysisResult) -> Self {
        Self {
            request,
            regularity: result.regularity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzeResponse {
    pub request: RequestEcho,
    /// `None` when the project is unknown.
    pub result: Option<AnalysisDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleResponse {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Network,
}
