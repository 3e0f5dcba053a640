//! Semantic query classifier
//!
//! Every intent owns a prototype built from its example utterances: the
//! normalised centroid of the example embeddings plus the examples
//! themselves. A query scores `max(centroid cosine, best example cosine)`
//! against each intent and the best intent wins if it clears the threshold.
//!
//! One prototype set is built per embedding provider. The primary provider
//! is tried first; when it cannot embed (at build time or per query) the
//! local secondary set answers instead. If no set can embed the query the
//! result is `GENERAL` with `degraded` set.

use crate::intent::Intent;
use agent_llm::embeddings::normalize;
use agent_llm::{EmbeddingProvider, cosine_similarity};
use cached::{Cached, SizedCache};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Outcome of classifying one query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Best intent, or GENERAL below the threshold
    pub intent: Intent,
    /// Similarity of the best intent, clamped to [0, 1]
    pub confidence: f32,
    /// No embedding provider could embed the query
    pub degraded: bool,
}

impl ClassificationResult {
    fn degraded() -> Self {
        Self {
            intent: Intent::General,
            confidence: 0.0,
            degraded: true,
        }
    }
}

/// Classifier state for health reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierHealth {
    /// At least one prototype set is available
    pub healthy: bool,
    /// Embedding providers with a prototype set, in preference order
    pub providers: Vec<String>,
    /// Similarity threshold
    pub threshold: f32,
    /// Cached query embeddings
    pub cached_embeddings: usize,
}

struct IntentPrototype {
    intent: Intent,
    centroid: Vec<f32>,
    examples: Vec<Vec<f32>>,
}

struct PrototypeSet {
    provider: Arc<dyn EmbeddingProvider>,
    intents: Vec<IntentPrototype>,
}

impl PrototypeSet {
    async fn build(provider: Arc<dyn EmbeddingProvider>) -> agent_llm::Result<Self> {
        let mut intents = Vec::with_capacity(Intent::ALL.len());
        for intent in Intent::ALL {
            let texts: Vec<String> = intent.examples().iter().map(ToString::to_string).collect();
            let mut examples = provider.embed_batch(&texts).await?;
            for v in &mut examples {
                normalize(v);
            }
            intents.push(IntentPrototype {
                intent,
                centroid: centroid(&examples),
                examples,
            });
        }
        Ok(Self { provider, intents })
    }

    fn name(&self) -> &str {
        self.provider.name()
    }

    /// Best `(intent, score)`; ties keep the earlier intent
    fn best_match(&self, query: &[f32]) -> (Intent, f32) {
        let mut best = (Intent::General, f32::MIN);
        for proto in &self.intents {
            let nearest = proto
                .examples
                .iter()
                .map(|e| cosine_similarity(query, e))
                .fold(f32::MIN, f32::max);
            let score = cosine_similarity(query, &proto.centroid).max(nearest);
            if score > best.1 {
                best = (proto.intent, score);
            }
        }
        best
    }
}

/// Mean of unit vectors, normalised again
fn centroid(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(dim) = vectors.first().map(Vec::len) else {
        return Vec::new();
    };
    let mut acc = vec![0.0f32; dim];
    for v in vectors.iter().filter(|v| v.len() == dim) {
        for (a, x) in acc.iter_mut().zip(v) {
            *a += x;
        }
    }
    let n = vectors.len() as f32;
    for a in &mut acc {
        *a /= n;
    }
    normalize(&mut acc);
    acc
}

/// Embedding-based intent classifier
pub struct SemanticRouter {
    sets: Vec<PrototypeSet>,
    threshold: f32,
    cache: Mutex<SizedCache<String, Vec<f32>>>,
}

impl SemanticRouter {
    /// Build prototypes for the primary (if any) and the secondary provider
    ///
    /// Never fails: a provider that cannot embed the examples is skipped and
    /// logged. With no usable provider every query classifies as degraded.
    pub async fn new(
        primary: Option<Arc<dyn EmbeddingProvider>>,
        secondary: Arc<dyn EmbeddingProvider>,
        threshold: f32,
        cache_size: usize,
    ) -> Self {
        let mut sets = Vec::with_capacity(2);
        for provider in primary.into_iter().chain(std::iter::once(secondary)) {
            let name = provider.name().to_string();
            match PrototypeSet::build(provider).await {
                Ok(set) => {
                    info!(provider = %name, "Built intent prototypes");
                    sets.push(set);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "Embedding provider unavailable for prototypes");
                }
            }
        }

        Self {
            sets,
            threshold: threshold.clamp(0.0, 1.0),
            cache: Mutex::new(SizedCache::with_size(cache_size.max(1))),
        }
    }

    /// Similarity threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Classify a query
    pub async fn classify(&self, query: &str) -> ClassificationResult {
        let text = query.trim();
        for (index, set) in self.sets.iter().enumerate() {
            let Some(embedding) = self.embed_query(set, text).await else {
                continue;
            };
            if index > 0 {
                warn!(provider = %set.name(), "Classifying with secondary embeddings");
            }

            let (intent, score) = set.best_match(&embedding);
            let confidence = score.clamp(0.0, 1.0);
            let intent = if confidence >= self.threshold {
                intent
            } else {
                Intent::General
            };
            debug!(%intent, confidence, provider = %set.name(), "Classified query");
            return ClassificationResult {
                intent,
                confidence,
                degraded: false,
            };
        }

        warn!("No embedding provider could embed the query; classification degraded");
        ClassificationResult::degraded()
    }

    async fn embed_query(&self, set: &PrototypeSet, text: &str) -> Option<Vec<f32>> {
        let key = format!("{}\u{1f}{text}", set.name());
        if let Some(hit) = self.cached_embedding(&key) {
            return Some(hit);
        }

        match set.provider.embed(text).await {
            Ok(mut v) => {
                normalize(&mut v);
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .cache_set(key, v.clone());
                Some(v)
            }
            Err(e) => {
                warn!(provider = %set.name(), error = %e, "Query embedding failed");
                None
            }
        }
    }

    fn cached_embedding(&self, key: &String) -> Option<Vec<f32>> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cache_get(key)
            .cloned()
    }

    /// Classifier state
    pub fn health(&self) -> ClassifierHealth {
        ClassifierHealth {
            healthy: !self.sets.is_empty(),
            providers: self.sets.iter().map(|s| s.name().to_string()).collect(),
            threshold: self.threshold,
            cached_embeddings: self
                .cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cache_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_llm::LLMError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Examples of intent `i` embed to the unit vector `e_i`; queries use a fixed table
    struct FixedEmbedder {
        name: &'static str,
        queries: HashMap<&'static str, Vec<f32>>,
        fail_queries: bool,
        fail_all: bool,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(name: &'static str, queries: Vec<(&'static str, Vec<f32>)>) -> Self {
            Self {
                name,
                queries: queries.into_iter().collect(),
                fail_queries: false,
                fail_all: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, text: &str) -> agent_llm::Result<Vec<f32>> {
            if self.fail_all {
                return Err(LLMError::Unavailable("embeddings offline".to_string()));
            }
            if let Some(i) = Intent::ALL.iter().position(|i| i.examples().contains(&text)) {
                let mut v = vec![0.0; Intent::ALL.len()];
                v[i] = 1.0;
                return Ok(v);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_queries {
                return Err(LLMError::Timeout(100));
            }
            Ok(self
                .queries
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0; Intent::ALL.len()]))
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    /// Similarity `s` with intent 0 and `sqrt(1 - s^2)` with intent `other`
    fn toward(s: f32, other: usize) -> Vec<f32> {
        let mut v = vec![0.0; Intent::ALL.len()];
        v[0] = s;
        v[other] = (1.0 - s * s).sqrt();
        v
    }

    /// Secondary that only knows the examples; other text embeds to zero
    fn local() -> Arc<FixedEmbedder> {
        Arc::new(FixedEmbedder::new("local", Vec::new()))
    }

    async fn router(primary: FixedEmbedder, threshold: f32) -> SemanticRouter {
        SemanticRouter::new(Some(Arc::new(primary)), local(), threshold, 16).await
    }

    #[tokio::test]
    async fn test_confident_match() {
        let query = "Where's AAPL at right now?";
        assert!(!Intent::PriceCheck.examples().contains(&query));
        let primary = FixedEmbedder::new("fixed", vec![(query, toward(0.85, 4))]);
        let r = router(primary, 0.70).await;

        let result = r.classify(query).await;
        assert_eq!(result.intent, Intent::PriceCheck);
        assert!((result.confidence - 0.85).abs() < 1e-5);
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn test_below_threshold_is_general_with_score() {
        let spread = vec![0.6, 0.5, 0.4, 0.3, 0.2, 0.1_f32.sqrt()];
        let primary = FixedEmbedder::new("fixed", vec![("vague", spread)]);
        let r = router(primary, 0.70).await;

        let result = r.classify("vague").await;
        assert_eq!(result.intent, Intent::General);
        assert!((result.confidence - 0.6).abs() < 1e-5);
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn test_tie_resolves_to_earlier_intent() {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let mut v = vec![0.0; Intent::ALL.len()];
        v[2] = half;
        v[3] = half;
        let primary = FixedEmbedder::new("fixed", vec![("tie", v)]);
        let r = router(primary, 0.5).await;

        assert_eq!(r.classify("tie").await.intent, Intent::Fundamentals);
    }

    #[tokio::test]
    async fn test_deterministic_and_cached() {
        let primary = FixedEmbedder::new("fixed", vec![("q", toward(0.9, 1))]);
        let primary = Arc::new(primary);
        let r = SemanticRouter::new(
            Some(Arc::clone(&primary) as Arc<dyn EmbeddingProvider>),
            local(),
            0.7,
            16,
        )
        .await;

        let first = r.classify("q").await;
        let second = r.classify("q").await;
        assert_eq!(first, second);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.health().cached_embeddings, 1);
    }

    #[tokio::test]
    async fn test_query_failure_falls_back_to_secondary() {
        let mut primary = FixedEmbedder::new("fixed", Vec::new());
        primary.fail_queries = true;
        let primary = Arc::new(primary);
        let r = SemanticRouter::new(
            Some(Arc::clone(&primary) as Arc<dyn EmbeddingProvider>),
            local(),
            0.0,
            16,
        )
        .await;

        let result = r.classify("how are markets doing").await;
        assert!(!result.degraded);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.health().providers, vec!["fixed", "local"]);
        // Only the secondary embedding was cached
        assert_eq!(r.health().cached_embeddings, 1);
    }

    #[tokio::test]
    async fn test_unreachable_primary_at_build_uses_secondary() {
        let mut primary = FixedEmbedder::new("fixed", Vec::new());
        primary.fail_all = true;
        let r = router(primary, 0.7).await;

        assert_eq!(r.health().providers, vec!["local"]);
        assert!(!r.classify("anything").await.degraded);
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_degraded() {
        let mut primary = FixedEmbedder::new("fixed", Vec::new());
        primary.fail_all = true;
        let mut secondary = FixedEmbedder::new("fixed-2", Vec::new());
        secondary.fail_all = true;
        let r = SemanticRouter::new(Some(Arc::new(primary)), Arc::new(secondary), 0.7, 16).await;

        let result = r.classify("What is AAPL trading at?").await;
        assert_eq!(result, ClassificationResult::degraded());
        assert!(!r.health().healthy);
    }

    #[test]
    fn test_centroid_is_unit_length() {
        let c = centroid(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((c[0] - expected).abs() < 1e-5);
        assert!((c[1] - expected).abs() < 1e-5);
        assert!(centroid(&[]).is_empty());
    }
}
