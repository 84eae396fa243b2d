//! In-memory site for fetcher and pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use crate::cache::PageCache;
use crate::error::FetchReason;
use crate::fetcher::{FetchOptions, Fetcher, Transport};

#[derive(Clone)]
pub struct Reply {
    delay: Duration,
    result: Result<Vec<u8>, FetchReason>,
}

impl Reply {
    pub fn ok(body: &[u8]) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(body.to_vec()),
        }
    }

    pub fn html(body: &str) -> Self {
        Self::ok(body.as_bytes())
    }

    pub fn status(code: u16) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(FetchReason::Status(code)),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Routes {
    // Replies are consumed front to back; the last one repeats.
    replies: HashMap<String, Vec<Reply>>,
    hits: HashMap<String, usize>,
}

#[derive(Clone, Default)]
pub struct FakeSite {
    inner: Arc<Mutex<Routes>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, reply: Reply) {
        self.script(url, vec![reply]);
    }

    pub fn script(&self, url: &str, replies: Vec<Reply>) {
        self.inner
            .lock()
            .unwrap()
            .replies
            .insert(url.to_string(), replies);
    }

    pub fn hits(&self, url: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .hits
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Most requests that were ever being served at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut routes = self.inner.lock().unwrap();
        *routes.hits.entry(url.to_string()).or_default() += 1;
        match routes.replies.get_mut(url) {
            Some(replies) if replies.len() > 1 => replies.remove(0),
            Some(replies) => replies[0].clone(),
            None => Reply::status(404),
        }
    }
}

impl Transport for FakeSite {
    async fn get(&self, url: &Url) -> Result<Vec<u8>, FetchReason> {
        let reply = self.next_reply(url.as_str());
        let _serving = Serving::enter(self);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

/// Counts a request as in flight until dropped, including when a timeout
/// cancels it.
struct Serving(Arc<AtomicUsize>);

impl Serving {
    fn enter(site: &FakeSite) -> Self {
        let now = site.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        site.peak.fetch_max(now, Ordering::SeqCst);
        Serving(Arc::clone(&site.in_flight))
    }
}

impl Drop for Serving {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn test_options() -> FetchOptions {
    FetchOptions {
        concurrency: 3,
        timeout: Duration::from_millis(100),
        max_retries: 3,
        backoff: Duration::from_millis(1),
        progress: false,
    }
}

pub fn test_fetcher(site: FakeSite, cache: Arc<dyn PageCache>) -> Fetcher<FakeSite> {
    Fetcher::new(site, cache, test_options())
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
}
