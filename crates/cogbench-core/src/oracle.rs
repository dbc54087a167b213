//! Semantic oracle contract and the shared, caching wrapper around it.
//!
//! Backends live in `cogbench-oracle`. The evaluator only ever talks to a
//! [`SharedOracle`], which loads the backend once, caches scores by
//! (premise, hypothesis) for its model version, serializes backend access,
//! and puts a deadline on every backend call.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, Semaphore};

use crate::error::OracleError;
use crate::settings::EvaluatorSettings;

/// Entailment-classifier output for one pair, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OracleScores {
    pub entailment: f64,
    pub contradiction: f64,
    /// Probability mass not on entailment (neutral plus contradiction).
    pub novelty: f64,
}

impl OracleScores {
    /// Build scores from the three class probabilities.
    pub fn from_probabilities(entailment: f64, neutral: f64, contradiction: f64) -> Self {
        let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            entailment: clamp(entailment),
            contradiction: clamp(contradiction),
            novelty: clamp(clamp(neutral) + clamp(contradiction)),
        }
    }

    fn is_valid(&self) -> bool {
        [self.entailment, self.contradiction, self.novelty]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

/// One premise/hypothesis pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OracleQuery {
    pub premise: String,
    pub hypothesis: String,
}

impl OracleQuery {
    pub fn new(premise: impl Into<String>, hypothesis: impl Into<String>) -> Self {
        Self {
            premise: premise.into(),
            hypothesis: hypothesis.into(),
        }
    }
}

/// A pretrained entailment/contradiction classifier.
///
/// Implementations must be pure: identical pairs under the same
/// `model_version` always produce identical scores.
#[async_trait]
pub trait SemanticOracle: Send + Sync {
    /// Identifier of the underlying model, stamped on every record.
    fn model_version(&self) -> &str;

    async fn score(&self, query: &OracleQuery) -> Result<OracleScores, OracleError>;

    /// Score several pairs. Results are in input order.
    async fn score_batch(&self, queries: &[OracleQuery]) -> Result<Vec<OracleScores>, OracleError> {
        let mut scores = Vec::with_capacity(queries.len());
        for query in queries {
            scores.push(self.score(query).await?);
        }
        Ok(scores)
    }
}

/// Deferred backend construction, run at most once successfully.
pub type OracleLoader =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn SemanticOracle>, OracleError>> + Send + Sync>;

/// Cache activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleStats {
    pub hits: u64,
    pub misses: u64,
    pub cached: u64,
}

/// Process-wide handle to one oracle backend.
pub struct SharedOracle {
    model_version: String,
    backend: OnceCell<Arc<dyn SemanticOracle>>,
    loader: Option<OracleLoader>,
    cache: RwLock<HashMap<OracleQuery, OracleScores>>,
    permits: Semaphore,
    timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for SharedOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedOracle")
            .field("model_version", &self.model_version)
            .field("loaded", &self.backend.initialized())
            .field("timeout", &self.timeout)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

impl SharedOracle {
    /// Wrap an already constructed backend.
    pub fn new(backend: Arc<dyn SemanticOracle>, settings: &EvaluatorSettings) -> Self {
        let model_version = backend.model_version().to_string();
        Self::build(model_version, OnceCell::new_with(Some(backend)), None, settings)
    }

    /// Defer loading the backend until the first cache miss.
    ///
    /// `model_version` is what records are stamped with; a backend that
    /// loads with a different version is rejected.
    pub fn lazy(
        model_version: impl Into<String>,
        loader: OracleLoader,
        settings: &EvaluatorSettings,
    ) -> Self {
        Self::build(model_version.into(), OnceCell::new(), Some(loader), settings)
    }

    fn build(
        model_version: String,
        backend: OnceCell<Arc<dyn SemanticOracle>>,
        loader: Option<OracleLoader>,
        settings: &EvaluatorSettings,
    ) -> Self {
        Self {
            model_version,
            backend,
            loader,
            cache: RwLock::new(HashMap::new()),
            permits: Semaphore::new(settings.oracle_max_concurrency.max(1)),
            timeout: Duration::from_millis(settings.oracle_timeout_ms),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn stats(&self) -> OracleStats {
        OracleStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            cached: self.cache.read().len() as u64,
        }
    }

    async fn backend(&self) -> Result<&Arc<dyn SemanticOracle>, OracleError> {
        self.backend
            .get_or_try_init(|| async {
                let loader = self
                    .loader
                    .as_ref()
                    .ok_or_else(|| OracleError::Unavailable("no oracle backend configured".into()))?;
                tracing::info!(model = %self.model_version, "loading semantic oracle");
                let backend = loader().await?;
                if backend.model_version() != self.model_version {
                    return Err(OracleError::Unavailable(format!(
                        "loaded model '{}' but expected '{}'",
                        backend.model_version(),
                        self.model_version
                    )));
                }
                Ok(backend)
            })
            .await
    }

    /// Score one pair.
    pub async fn score(&self, query: &OracleQuery) -> Result<OracleScores, OracleError> {
        self.score_many(std::slice::from_ref(query))
            .await
            .pop()
            .unwrap_or_else(|| Err(OracleError::InvalidResponse("no result".into())))
    }

    /// Score many pairs with one backend call for all cache misses.
    ///
    /// Every query gets its own result, in input order. A backend failure
    /// fails every query that was not already cached.
    pub async fn score_many(&self, queries: &[OracleQuery]) -> Vec<Result<OracleScores, OracleError>> {
        let mut pending: Vec<OracleQuery> = Vec::new();
        {
            let cache = self.cache.read();
            let mut seen = HashSet::new();
            for query in queries {
                if cache.contains_key(query) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                } else if seen.insert(query) {
                    pending.push(query.clone());
                }
            }
        }

        let mut fresh: HashMap<OracleQuery, OracleScores> = HashMap::new();
        let mut failure: Option<OracleError> = None;
        if !pending.is_empty() {
            match self.fetch(pending).await {
                Ok(scores) => fresh = scores,
                Err(e) => {
                    tracing::warn!(error = %e, "semantic oracle call failed");
                    failure = Some(e);
                }
            }
        }

        let cache = self.cache.read();
        queries
            .iter()
            .map(|query| {
                if let Some(score) = fresh.get(query).or_else(|| cache.get(query)) {
                    Ok(*score)
                } else {
                    Err(failure
                        .clone()
                        .unwrap_or_else(|| OracleError::Unavailable("score missing".into())))
                }
            })
            .collect()
    }

    /// Score pairs that were not cached, holding a backend permit.
    ///
    /// Pairs cached by another caller while this one waited for the permit
    /// are served from the cache instead of being scored again.
    async fn fetch(
        &self,
        pending: Vec<OracleQuery>,
    ) -> Result<HashMap<OracleQuery, OracleScores>, OracleError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OracleError::Unavailable("oracle semaphore closed".into()))?;

        let mut ready = HashMap::new();
        let mut missing = Vec::new();
        {
            let cache = self.cache.read();
            for query in pending {
                match cache.get(&query) {
                    Some(score) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        ready.insert(query, *score);
                    }
                    None => missing.push(query),
                }
            }
        }
        if missing.is_empty() {
            return Ok(ready);
        }
        self.misses.fetch_add(missing.len() as u64, Ordering::Relaxed);
        tracing::debug!(pairs = missing.len(), "oracle cache miss");

        let call = async {
            let backend = self.backend().await?;
            backend.score_batch(&missing).await
        };
        let scores = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| OracleError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if scores.len() != missing.len() {
            return Err(OracleError::InvalidResponse(format!(
                "expected {} scores, got {}",
                missing.len(),
                scores.len()
            )));
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_valid()) {
            return Err(OracleError::InvalidResponse(format!(
                "scores out of range: {bad:?}"
            )));
        }

        let mut cache = self.cache.write();
        for (query, score) in missing.into_iter().zip(scores) {
            cache.insert(query.clone(), score);
            ready.insert(query, score);
        }
        Ok(ready)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Returns the same scores for every pair and counts batch calls.
    pub struct ConstantOracle {
        pub scores: OracleScores,
        pub delay: Option<Duration>,
        pub batches: AtomicU32,
        pub pairs: AtomicU32,
    }

    impl ConstantOracle {
        pub fn new(entailment: f64, neutral: f64, contradiction: f64) -> Self {
            Self {
                scores: OracleScores::from_probabilities(entailment, neutral, contradiction),
                delay: None,
                batches: AtomicU32::new(0),
                pairs: AtomicU32::new(0),
            }
        }

        pub fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl SemanticOracle for ConstantOracle {
        fn model_version(&self) -> &str {
            "constant-v1"
        }

        async fn score(&self, _query: &OracleQuery) -> Result<OracleScores, OracleError> {
            Ok(self.scores)
        }

        async fn score_batch(&self, queries: &[OracleQuery]) -> Result<Vec<OracleScores>, OracleError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.pairs.fetch_add(queries.len() as u32, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(vec![self.scores; queries.len()])
        }
    }
}
