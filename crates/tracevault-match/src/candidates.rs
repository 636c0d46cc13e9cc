//! Candidate-set retrieval seam.
//!
//! The engine ranks whatever candidates it is handed; where they come from
//! (a search index, a registry service, a scraper-fed table) is an external
//! concern behind this trait.

use async_trait::async_trait;

use tracevault_core::error::Result;
use tracevault_core::types::Embedding;

use crate::engine::Candidate;

/// Source of identity candidates for a query embedding.
///
/// Implementations may use the query to pre-filter (an ANN index would);
/// a static registry ignores it and returns everything.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates_for(&self, target: &Embedding) -> Result<Vec<Candidate>>;
}

/// Fixed in-memory candidate registry.
///
/// Serves tests and local runs; a production deployment would put an
/// indexed profile store behind the same trait.
#[derive(Debug, Default)]
pub struct StaticCandidateSource {
    candidates: Vec<Candidate>,
}

impl StaticCandidateSource {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// A small deterministic registry of dimension `dim`, shaped like the
    /// profiles a scraper would feed in. The "sresearcher" entry is a
    /// near-constant vector so a near-ones query reliably matches it.
    pub fn demo_registry(dim: usize) -> Self {
        let profiles = [
            (
                "twitter_1",
                "John Doe",
                "https://twitter.com/jdoe_account",
                "Tech enthusiast and security researcher.",
                // Alternating signs: close to orthogonal to a ones-vector.
                (0..dim)
                    .map(|i| if i % 2 == 0 { 0.8f32 } else { -0.8 })
                    .collect::<Vec<f32>>(),
            ),
            (
                "twitter_2",
                "Sarah Researcher",
                "https://twitter.com/sresearcher",
                "Forensics expert.",
                vec![0.9f32; dim],
            ),
            (
                "twitter_3",
                "Random User",
                "https://twitter.com/rndm_user",
                "I like cats.",
                (0..dim)
                    .map(|i| ((i % 7) as f32 - 3.0) / 3.0)
                    .collect::<Vec<f32>>(),
            ),
        ];

        let candidates = profiles
            .into_iter()
            .map(|(id, name, url, bio, embedding)| Candidate {
                id: id.to_string(),
                profile_name: name.to_string(),
                source_url: url.to_string(),
                platform: "Twitter".to_string(),
                embedding: Embedding(embedding),
                extended: Some(serde_json::json!({ "bio": bio })),
            })
            .collect();

        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[async_trait]
impl CandidateSource for StaticCandidateSource {
    async fn candidates_for(&self, _target: &Embedding) -> Result<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }
}
