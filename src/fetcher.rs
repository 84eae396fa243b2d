use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::PageCache;
use crate::error::{Error, FetchReason};
use crate::settings::Settings;

/// A page to fetch and the identifier it reports under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub identifier: String,
    pub url: Url,
}

impl Target {
    pub fn new(identifier: impl Into<String>, url: Url) -> Self {
        Self {
            identifier: identifier.into(),
            url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawDocument {
    pub identifier: String,
    pub url: Url,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    pub from_cache: bool,
}

/// The HTTP layer. Swapped for an in-memory site in tests.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, url: &Url) -> impl Future<Output = Result<Vec<u8>, FetchReason>> + Send;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<Vec<u8>, FetchReason> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchReason::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchReason::Status(status.as_u16()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchReason::Network(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub progress: bool,
}

impl FetchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.concurrency,
            timeout: settings.timeout(),
            max_retries: settings.max_retries,
            backoff: settings.backoff(),
            progress: true,
        }
    }
}

/// Cached page fetcher. The cache is injected so callers decide where it lives.
pub struct Fetcher<T> {
    transport: Arc<T>,
    cache: Arc<dyn PageCache>,
    options: FetchOptions,
}

impl<T> Clone for Fetcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            cache: Arc::clone(&self.cache),
            options: self.options.clone(),
        }
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, cache: Arc<dyn PageCache>, options: FetchOptions) -> Self {
        Self {
            transport: Arc::new(transport),
            cache,
            options,
        }
    }

    pub fn clear_cache(&self) -> anyhow::Result<usize> {
        let removed = self.cache.clear()?;
        info!("Cleared {} cached responses", removed);
        Ok(removed)
    }

    /// Read-through fetch: a cache hit returns the stored bytes unchanged.
    /// An unreadable cache entry counts as a miss.
    pub async fn fetch(&self, target: &Target) -> Result<RawDocument, Error> {
        let key = target.url.as_str();
        let cached = self.cache.get(key).unwrap_or_else(|e| {
            warn!("Could not read cache for {}: {}", key, e);
            None
        });

        if let Some(body) = cached {
            debug!("Cache hit for {}", key);
            return Ok(self.document(target, body, true));
        }

        let body = self.download(&target.url).await?;
        if let Err(e) = self.cache.put(key, &body) {
            warn!("Could not cache {}: {}", key, e);
        }
        Ok(self.document(target, body, false))
    }

    /// Fetch without reading or writing the cache.
    pub async fn fetch_uncached(&self, target: &Target) -> Result<RawDocument, Error> {
        let body = self.download(&target.url).await?;
        Ok(self.document(target, body, false))
    }

    /// Fetch every target with at most `concurrency` requests in flight.
    /// Results come back in the order of `targets`, one per target.
    pub async fn fetch_all(&self, targets: &[Target]) -> Vec<Result<RawDocument, Error>> {
        let total = targets.len();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let pb = self.progress_bar(total);

        let (tx, mut rx) = mpsc::channel::<(usize, Result<RawDocument, Error>)>(
            self.options.concurrency.max(1) * 2,
        );

        for (index, target) in targets.iter().cloned().enumerate() {
            let fetcher = self.clone();
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = match sem.acquire().await {
                    Ok(_permit) => fetcher.fetch(&target).await,
                    Err(_) => Err(Error::fetch(
                        target.url.as_str(),
                        FetchReason::Network("fetch pool closed".into()),
                    )),
                };
                let _ = tx.send((index, result)).await;
            });
        }

        // Drop our copy of tx so rx closes when all spawned tasks finish
        drop(tx);

        let mut slots: Vec<Option<Result<RawDocument, Error>>> = (0..total).map(|_| None).collect();
        let mut failed = 0usize;
        while let Some((index, result)) = rx.recv().await {
            if let Err(e) = &result {
                warn!("{}", e);
                failed += 1;
            }
            slots[index] = Some(result);
            pb.inc(1);
        }
        pb.finish_and_clear();
        info!("Fetched {} pages ({} failed)", total, failed);

        slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    Err(Error::fetch(
                        target.url.as_str(),
                        FetchReason::Network("fetch task aborted".into()),
                    ))
                })
            })
            .collect()
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, Error> {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.options.timeout, self.transport.get(url)).await
            {
                Ok(result) => result,
                Err(_) => Err(FetchReason::Timeout(self.options.timeout)),
            };

            match result {
                Ok(body) => return Ok(body),
                Err(reason) if reason.is_transient() && attempt < self.options.max_retries => {
                    let backoff = backoff_delay(self.options.backoff, attempt);
                    warn!(
                        "{} on {} (attempt {}/{}), backing off {:.1}s",
                        reason,
                        url,
                        attempt + 1,
                        self.options.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(reason) => return Err(Error::fetch(url.as_str(), reason)),
            }
        }
    }

    fn document(&self, target: &Target, body: Vec<u8>, from_cache: bool) -> RawDocument {
        RawDocument {
            identifier: target.identifier.clone(),
            url: target.url.clone(),
            body,
            fetched_at: Utc::now(),
            from_cache,
        }
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.options.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

/// `base * 2^attempt`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}
