use regularity_core::{Candidate, Error, PredictiveModel, Result, TokenPrediction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const BASE_URL_VAR: &str = "REGULARITY_OPENAI_COMPAT_BASE_URL";
const API_KEY_VAR: &str = "REGULARITY_OPENAI_COMPAT_API_KEY";
// vLLM's default listen address; llama.cpp users override this.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Value of `key` with surrounding whitespace removed. Unset and blank are the same.
fn setting(key: &str) -> Option<String> {
    let raw = std::env::var(key).ok()?;
    let value = raw.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

/// Scores text through an OpenAI-compatible legacy completions endpoint.
///
/// The prompt is echoed back with `max_tokens: 0`, so the server only runs the forward pass
/// over the input and reports, per prompt token, its `top_logprobs` alternatives.
#[derive(Debug, Clone)]
pub struct OpenAiCompatModel {
    client: reqwest::Client,
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatModel {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
        }
    }

    /// `name` is the catalog id, `model` the upstream model name sent to the server.
    pub fn from_env(client: reqwest::Client, name: &str, model: &str) -> Self {
        let base_url = setting(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let mut out = Self::new(client, name, base_url, model);
        out.api_key = setting(API_KEY_VAR);
        out
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_completions(&self) -> String {
        format!("{}/v1/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl PredictiveModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, text: &str, top_k: usize) -> Result<Vec<TokenPrediction>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let req = CompletionsRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
            max_tokens: 0,
            echo: true,
            logprobs: top_k,
            temperature: 0.0,
        };

        let mut rb = self
            .client
            .post(self.endpoint_completions())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Model(format!(
                "openai_compat completions HTTP {status}"
            )));
        }

        let parsed: CompletionsResponse =
            resp.json().await.map_err(|e| Error::Model(e.to_string()))?;
        let logprobs = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.logprobs)
            .ok_or_else(|| Error::Model("completion carried no logprobs".to_string()))?;
        Ok(predictions_from_logprobs(logprobs, top_k))
    }
}

/// Turn echoed prompt logprobs into per-token predictions.
///
/// Servers may add the observed token to `top_logprobs` on top of the `k` best, so every map is
/// re-ranked by logprob (ties by token text) and cut to `top_k`.
fn predictions_from_logprobs(lp: Logprobs, top_k: usize) -> Vec<TokenPrediction> {
    let mut tops = lp.top_logprobs.into_iter();
    lp.tokens
        .into_iter()
        .enumerate()
        .map(|(position, observed)| {
            let alternatives = tops.next().flatten().unwrap_or_default();
            let mut candidates: Vec<Candidate> = if position == 0 {
                Vec::new()
            } else {
                alternatives
                    .into_iter()
                    .map(|(token, logprob)| Candidate::new(token, logprob))
                    .collect()
            };
            candidates.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.token.cmp(&b.token))
            });
            candidates.truncate(top_k);
            TokenPrediction::new(position, observed, candidates)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
struct CompletionsRequest {
    model: String,
    prompt: String,
    max_tokens: u32,
    echo: bool,
    logprobs: usize,
    temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    logprobs: Option<Logprobs>,
}

#[derive(Debug, Clone, Deserialize)]
struct Logprobs {
    tokens: Vec<String>,
    #[serde(default)]
    top_logprobs: Vec<Option<BTreeMap<String, f64>>>,
}
