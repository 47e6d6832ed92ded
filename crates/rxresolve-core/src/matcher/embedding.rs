//! Embedding service seam, content-addressed cache, and clients.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::resolver::word_tokens;

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Embedding service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Empty embedding returned for '{0}'")]
    Empty(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Embedding cache lock poisoned")]
    CachePoisoned,
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Turns text into a fixed-length vector. Failures must surface as errors.
pub trait EmbeddingService: Send + Sync {
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;
}

impl<T: EmbeddingService + ?Sized> EmbeddingService for Box<T> {
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        (**self).embed(text)
    }
}

impl<T: EmbeddingService + ?Sized> EmbeddingService for Arc<T> {
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        (**self).embed(text)
    }
}

/// Memoizes embeddings by content for the lifetime of the cache.
///
/// Entries are written once and never evicted, so memory grows with the
/// number of distinct strings embedded. Share one cache (behind an `Arc`)
/// between matchers to get process-wide reuse.
pub struct EmbeddingCache {
    service: Box<dyn EmbeddingService>,
    /// sha256(text) hex → slot
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

/// One key's entry. `fill` serializes the service call for this key only;
/// the map lock is never held while embedding.
#[derive(Default)]
struct Slot {
    value: OnceLock<Arc<Vec<f32>>>,
    fill: Mutex<()>,
}

impl EmbeddingCache {
    pub fn new<E: EmbeddingService + 'static>(service: E) -> Self {
        Self {
            service: Box::new(service),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Cached vector for `text`, embedding it on first use.
    ///
    /// Each distinct string reaches the service at most once while calls
    /// succeed. A miss only blocks other callers asking for the same string.
    pub fn get(&self, text: &str) -> EmbeddingResult<Arc<Vec<f32>>> {
        let key = cache_key(text);
        let slot = self.slot(&key)?;
        if let Some(hit) = slot.value.get() {
            return Ok(Arc::clone(hit));
        }

        // a panic in another filler leaves the slot empty, not broken
        let _guard = slot.fill.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = slot.value.get() {
            return Ok(Arc::clone(hit));
        }

        tracing::debug!(key = %&key[..12], "embedding cache miss");
        let vector = self.service.embed(text)?;
        if vector.is_empty() {
            return Err(EmbeddingError::Empty(text.to_string()));
        }
        let vector = Arc::new(vector);
        let _ = slot.value.set(Arc::clone(&vector));
        Ok(vector)
    }

    fn slot(&self, key: &str) -> EmbeddingResult<Arc<Slot>> {
        if let Some(slot) = self
            .slots
            .read()
            .map_err(|_| EmbeddingError::CachePoisoned)?
            .get(key)
        {
            return Ok(Arc::clone(slot));
        }
        let mut slots = self
            .slots
            .write()
            .map_err(|_| EmbeddingError::CachePoisoned)?;
        Ok(Arc::clone(slots.entry(key.to_string()).or_default()))
    }

    /// Number of embedded strings.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .map(|slots| slots.values().filter(|s| s.value.get().is_some()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Content-addressed key for a preprocessed string.
pub fn cache_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

// ═══════════════════════════════════════════════════════════
// OpenAI-compatible client
// ═══════════════════════════════════════════════════════════

/// `/embeddings` client for OpenAI-compatible endpoints.
pub struct OpenAiEmbeddingClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OpenAiEmbeddingClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_secs: u64,
    ) -> EmbeddingResult<Self> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::MissingCredential("OPENAI_API_KEY".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl EmbeddingService for OpenAiEmbeddingClient {
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .map_err(|e| EmbeddingError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EmbeddingError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Empty(text.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════
// Deterministic embedder for tests and offline runs
// ═══════════════════════════════════════════════════════════

/// Default dimension of [`HashingEmbedder`] vectors.
pub const HASHING_DIM: usize = 256;

/// Bag-of-tokens embedder: each word token is hashed into one slot.
///
/// Strings sharing tokens get high cosine similarity, which is enough to
/// exercise ranking without a network service.
pub struct HashingEmbedder {
    dimension: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(HASHING_DIM)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// An embedder whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Number of `embed` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService for HashingEmbedder {
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::Http("embedding service unreachable".into()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in word_tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(bytes) % self.dimension as u64) as usize;
            vector[slot] += 1.0;
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Barrier};
    use std::thread;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_cache_returns_same_vector_and_embeds_once() {
        let embedder = Arc::new(HashingEmbedder::new());
        let cache = EmbeddingCache::new(Arc::clone(&embedder));

        let first = cache.get("albuterol hfa 90 mcg").unwrap();
        let second = cache.get("albuterol hfa 90 mcg").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(embedder.calls(), 1);

        cache.get("albuterol sulfate tablet").unwrap();
        assert_eq!(embedder.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    /// Blocks inside `embed` for [`GATED`] until the test releases it.
    struct GatedEmbedder {
        inner: HashingEmbedder,
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    const GATED: &str = "albuterol slow lookup";

    impl EmbeddingService for GatedEmbedder {
        fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if text == GATED {
                let _ = self.started.lock().unwrap().send(());
                let _ = self.release.lock().unwrap().recv();
            }
            self.inner.embed(text)
        }
    }

    #[test]
    fn test_pending_miss_does_not_block_other_keys() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let cache = Arc::new(EmbeddingCache::new(GatedEmbedder {
            inner: HashingEmbedder::new(),
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        }));
        let warm = cache.get("albuterol hfa 90 mcg").unwrap();

        let pending = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get(GATED).map(|v| v.len()))
        };
        started_rx.recv().unwrap();

        // the gated embed is still in flight here
        let hit = cache.get("albuterol hfa 90 mcg").unwrap();
        assert!(Arc::ptr_eq(&warm, &hit));
        assert!(cache.get("albuterol sulfate tablet").is_ok());
        assert_eq!(cache.len(), 2);

        release_tx.send(()).unwrap();
        assert_eq!(pending.join().unwrap().unwrap(), HASHING_DIM);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_concurrent_misses_embed_once() {
        let embedder = Arc::new(HashingEmbedder::new());
        let cache = EmbeddingCache::new(Arc::clone(&embedder));
        let barrier = Barrier::new(8);

        let vectors: Vec<Arc<Vec<f32>>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get("ventolin hfa 90 mcg inhaler").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(embedder.calls(), 1);
        assert!(vectors.iter().all(|v| Arc::ptr_eq(v, &vectors[0])));
        assert_eq!(cache.len(), 1);
    }

    /// Panics on its first call only.
    struct PanicsOnce {
        tripped: AtomicBool,
        inner: HashingEmbedder,
    }

    impl EmbeddingService for PanicsOnce {
        fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                panic!("embedder crashed");
            }
            self.inner.embed(text)
        }
    }

    #[test]
    fn test_cache_recovers_after_embedder_panic() {
        let cache = Arc::new(EmbeddingCache::new(PanicsOnce {
            tripped: AtomicBool::new(false),
            inner: HashingEmbedder::new(),
        }));

        let crashed = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get("lisinopril 10 mg").map(|_| ()))
        };
        assert!(crashed.join().is_err());

        assert!(cache.get("lisinopril 10 mg").is_ok());
        assert!(cache.get("lisinopril 20 mg").is_ok());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failure_is_not_cached() {
        let embedder = Arc::new(HashingEmbedder::failing());
        let cache = EmbeddingCache::new(Arc::clone(&embedder));
        assert!(cache.get("x").is_err());
        assert!(cache.get("x").is_err());
        assert_eq!(embedder.calls(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hashing_embedder_similarity_tracks_shared_tokens() {
        let e = HashingEmbedder::new();
        let a = e.embed("ventolin hfa 90 mcg inhaler").unwrap();
        let b = e.embed("albuterol hfa 90 mcg/inhal inhal inhaler").unwrap();
        let c = e.embed("albuterol sulfate tablet").unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_cache_key_is_content_addressed() {
        assert_eq!(cache_key("abc"), cache_key("abc"));
        assert_ne!(cache_key("abc"), cache_key("abd"));
        assert_eq!(cache_key("abc").len(), 64);
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            OpenAiEmbeddingClient::new("https://api.openai.com/v1", " ", "m", 5),
            Err(EmbeddingError::MissingCredential(_))
        ));
    }
}
