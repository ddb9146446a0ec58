use dashmap::DashMap;
use regularity_core::{FetchSource, PageFetcher, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub content: String,
    pub source: FetchSource,
}

/// Process-lifetime memo of URL -> extracted page text.
///
/// Entries never expire. Concurrent misses for the same URL share a single fetch; a failed
/// fetch drops its slot so nothing is kept for it and the next caller retries.
pub struct PageCache {
    fetcher: Arc<dyn PageFetcher>,
    entries: DashMap<String, Arc<OnceCell<String>>>,
}

impl PageCache {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            entries: DashMap::new(),
        }
    }

    /// Cached text for `url`, fetching it on first use.
    pub async fn get_or_fetch(&self, url: &str) -> Result<CachedPage> {
        // Clone the cell out so no map shard lock is held across the await below.
        let cell = self
            .entries
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(content) = cell.get() {
            return Ok(CachedPage {
                content: content.clone(),
                source: FetchSource::Cache,
            });
        }

        let fetched_here = AtomicBool::new(false);
        let flag = &fetched_here;
        let content = match cell
            .get_or_try_init(|| async move {
                flag.store(true, Ordering::Relaxed);
                self.fetcher.fetch_text(url).await
            })
            .await
        {
            Ok(content) => content,
            Err(e) => {
                // Drop the empty slot unless a concurrent caller has since filled it.
                self.entries.remove_if(url, |_, c| !c.initialized());
                return Err(e);
            }
        };
        Ok(CachedPage {
            content: content.clone(),
            source: if fetched_here.load(Ordering::Relaxed) {
                FetchSource::Network
            } else {
                FetchSource::Cache
            },
        })
    }

    /// Cache-only lookup. Never fetches.
    pub fn get(&self, url: &str) -> Option<String> {
        self.entries.get(url).and_then(|cell| cell.get().cloned())
    }

    /// Number of URLs with stored text.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
