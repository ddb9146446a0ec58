use regularity_core::{Error, ModelCatalog, PageFetcher, PredictiveModel, Result};
use std::sync::Arc;
use std::time::Duration;

pub mod bigram;
pub mod cache;
pub mod extract;
pub mod openai_compat;

pub use bigram::BigramModel;
pub use cache::{CachedPage, PageCache};
pub use openai_compat::OpenAiCompatModel;

/// Model used when the requested id is not in the catalog.
pub const DEFAULT_MODEL_ID: &str = "gpt-2";

/// Shared HTTP client for page fetches and model servers.
///
/// `timeout` bounds a whole request; model inference over long texts needs more than a page
/// fetch does, so callers pick it.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("regularity-local/0.1")
        .redirect(reqwest::redirect::Policy::limited(10))
        // Avoid "hang forever" on DNS/TLS stalls.
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))
}

/// Every model this build knows how to construct, keyed by catalog id.
pub fn default_catalog(client: reqwest::Client) -> ModelCatalog {
    let mut catalog = ModelCatalog::new(DEFAULT_MODEL_ID);
    for (id, upstream) in [("gpt-2", "gpt2"), ("gpt-2-large", "gpt2-large")] {
        let client = client.clone();
        catalog.add(id, move || {
            Ok(Arc::new(OpenAiCompatModel::from_env(client.clone(), id, upstream))
                as Arc<dyn PredictiveModel>)
        });
    }
    catalog.add("bigram", || {
        Ok(Arc::new(BigramModel::new("bigram")) as Arc<dyn PredictiveModel>)
    });
    catalog
}

/// Fetches pages over plain HTTP(S) and extracts paragraph text.
///
/// No JavaScript is executed; pages that only render client-side come back with whatever
/// text their static HTML carries.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpPageFetcher {
    pub const DEFAULT_MAX_BYTES: usize = 5_000_000;

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: Self::DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn parse_url(raw: &str) -> Result<url::Url> {
        let url = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::InvalidUrl(format!("unsupported scheme: {other}"))),
        }
    }

    /// Body bytes (capped at `max_bytes`) and content type.
    async fn fetch_bytes(&self, url: url::Url) -> Result<(Vec<u8>, Option<String>)> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {status}")));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > self.max_bytes {
                let can_take = self.max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok((bytes, content_type))
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let url = Self::parse_url(url)?;
        let (bytes, content_type) = self.fetch_bytes(url).await?;
        // HTML parsing is CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || extract::page_text(&bytes, content_type.as_deref()))
            .await
            .map_err(|e| Error::Fetch(format!("extract join failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn fetcher() -> HttpPageFetcher {
        HttpPageFetcher::new(build_client(Duration::from_secs(5)).unwrap())
    }

    const ARTICLE: &str = r#"<!doctype html><html><body>
        <header>Site nav</header>
        <p>First <em>paragraph</em>.</p>
        <p>Second paragraph.</p>
    </body></html>"#;

    #[tokio::test]
    async fn fetch_text_returns_paragraphs() {
        let app = Router::new().route(
            "/article",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], ARTICLE) }),
        );
        let addr = spawn(app).await;
        let text = fetcher()
            .fetch_text(&format!("http://{addr}/article"))
            .await
            .unwrap();
        assert_eq!(text, "First paragraph .\n\nSecond paragraph.");
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let app = Router::new().route("/gone", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
        let addr = spawn(app).await;
        let err = fetcher()
            .fetch_text(&format!("http://{addr}/gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch(ref m) if m.contains("404")), "{err}");
    }

    #[tokio::test]
    async fn non_http_urls_are_rejected_before_any_request() {
        let f = fetcher();
        assert!(matches!(
            f.fetch_text("file:///etc/passwd").await,
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            f.fetch_text("not a url").await,
            Err(Error::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn body_is_capped_at_max_bytes() {
        let big = "y".repeat(10_000);
        let app = Router::new().route(
            "/",
            get(move || {
                let body = big.clone();
                async move { ([(header::CONTENT_TYPE, "text/plain")], body) }
            }),
        );
        let addr = spawn(app).await;
        let text = fetcher()
            .with_max_bytes(100)
            .fetch_text(&format!("http://{addr}/"))
            .await
            .unwrap();
        assert_eq!(text.len(), 100);
    }

    #[tokio::test]
    async fn page_cache_over_http_fetches_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let app = Router::new().route(
            "/article",
            get(move || {
                let hits = hits2.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    ([(header::CONTENT_TYPE, "text/html")], ARTICLE)
                }
            }),
        );
        let addr = spawn(app).await;
        let cache = PageCache::new(Arc::new(fetcher()));
        let url = format!("http://{addr}/article");

        let a = cache.get_or_fetch(&url).await.unwrap();
        let b = cache.get_or_fetch(&url).await.unwrap();
        assert_eq!(a.content, b.content);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_catalog_knows_the_bundled_models() {
        let catalog = default_catalog(reqwest::Client::new());
        let ids: Vec<&str> = catalog.ids().collect();
        assert_eq!(ids, vec!["bigram", "gpt-2", "gpt-2-large"]);
        assert_eq!(catalog.default_id(), DEFAULT_MODEL_ID);

        let r = catalog.resolve_with_fallback("gpt-2-small").unwrap();
        assert!(r.substituted);
        assert_eq!(r.resolved, "gpt-2");

        let m = catalog.build("gpt-2-large").unwrap();
        assert_eq!(m.name(), "gpt-2-large");
    }
}
