// Test support for the clustering domain.
//
// - FixedEmbedder (TextEmbedder) — deterministic vectors: registered texts
//   get exact vectors, unmatched texts get a unique hash-based vector with
//   low similarity to everything
// - helpers for constructing TriageReport fixtures and unit vectors

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use reportfold_core::TextEmbedder;

use crate::clustering::models::TriageReport;

/// Standard embedding dimension for test vectors.
pub const TEST_EMBEDDING_DIM: usize = 64;

// ---------------------------------------------------------------------------
// Report fixtures
// ---------------------------------------------------------------------------

pub fn triage_report(
    id: i64,
    text: &str,
    domain: &str,
    valid_probability: f64,
    reported_at: DateTime<Utc>,
) -> TriageReport {
    TriageReport {
        id,
        valid_probability: Some(valid_probability),
        reported_at,
        url: format!("https://{domain}/page"),
        bucket_id: None,
        cluster_id: None,
        text: text.to_string(),
        domain: domain.to_string(),
    }
}

pub fn triage_report_in_cluster(
    id: i64,
    text: &str,
    domain: &str,
    valid_probability: f64,
    reported_at: DateTime<Utc>,
    cluster_id: Option<i64>,
) -> TriageReport {
    TriageReport {
        cluster_id,
        ..triage_report(id, text, domain, valid_probability, reported_at)
    }
}

/// 2-dimensional unit vector at the given angle (radians).
pub fn unit2(theta: f32) -> Vec<f32> {
    vec![theta.cos(), theta.sin()]
}

// ---------------------------------------------------------------------------
// FixedEmbedder
// ---------------------------------------------------------------------------

/// Deterministic embedder for testing. Registered texts get exact vectors;
/// unmatched texts get a unique hash-based vector (low similarity to
/// everything).
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
        }
    }

    /// Register a text→vector mapping for controlled similarity.
    pub fn on_text(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// Generate a deterministic hash-based vector for unmatched text.
    fn hash_vector(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        let mut vec = vec![0.0f32; self.dimension];
        let mut state = seed;
        for v in vec.iter_mut() {
            // Simple LCG PRNG
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *v = ((state >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0;
        }
        // Normalize to unit vector
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait::async_trait]
impl TextEmbedder for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.hash_vector(text)))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t.as_str())
                    .cloned()
                    .unwrap_or_else(|| self.hash_vector(t))
            })
            .collect())
    }
}
