//! Cosine-distance ranking of identity candidates.

use tracing::warn;

use tracevault_core::config::PipelineConfig;
use tracevault_core::error::{Result, TraceVaultError};
use tracevault_core::types::Embedding;

/// One known identity profile with its reference embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Registry identifier (e.g. "twitter_2").
    pub id: String,
    pub profile_name: String,
    pub source_url: String,
    pub platform: String,
    pub embedding: Embedding,
    /// Extra profile fields carried through to the persisted match.
    pub extended: Option<serde_json::Value>,
}

/// One ranked match emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch {
    pub candidate_id: String,
    pub profile_name: String,
    pub source_url: String,
    pub platform: String,
    /// `1 - distance`, rounded to 4 decimal places. Higher is better.
    pub similarity_score: f64,
    /// Raw cosine distance, rounded to 4 decimal places. Lower is better.
    pub distance: f64,
    pub extended: Option<serde_json::Value>,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// The identity matching engine. Pure, stateless, no I/O.
#[derive(Debug, Clone, Copy)]
pub struct MatchEngine {
    dimensions: usize,
    threshold: f64,
}

impl MatchEngine {
    pub fn new(dimensions: usize, threshold: f64) -> Self {
        Self {
            dimensions,
            threshold,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.embedding_dim, config.match_threshold)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Rank candidates against the target embedding.
    ///
    /// Preconditions: the target has length D and non-zero norm; a zero
    /// vector makes cosine distance undefined, so both violations are
    /// `InvalidEmbedding`. A candidate with mismatched dimensionality or a
    /// zero-norm reference vector is rejected (skipped with a warning)
    /// before any distance is computed.
    ///
    /// A candidate is included iff `distance < threshold`. Results are
    /// sorted by similarity descending; the sort is stable, so candidates
    /// with equal similarity retain input order. That tie-break is part of
    /// the contract, not an implementation accident.
    pub fn rank(&self, target: &Embedding, candidates: &[Candidate]) -> Result<Vec<RankedMatch>> {
        if target.dimension() != self.dimensions {
            return Err(TraceVaultError::InvalidEmbedding(format!(
                "target has {} dimensions, deployment expects {}",
                target.dimension(),
                self.dimensions
            )));
        }
        if target.l2_norm() == 0.0 {
            return Err(TraceVaultError::InvalidEmbedding(
                "target embedding has zero norm".to_string(),
            ));
        }

        let mut matches: Vec<RankedMatch> = Vec::new();

        for candidate in candidates {
            if candidate.embedding.dimension() != self.dimensions {
                warn!(
                    candidate_id = %candidate.id,
                    dimension = candidate.embedding.dimension(),
                    expected = self.dimensions,
                    "Rejecting candidate with mismatched embedding length"
                );
                continue;
            }

            let Some(distance) = target.cosine_distance(&candidate.embedding) else {
                warn!(
                    candidate_id = %candidate.id,
                    "Rejecting candidate with zero-norm embedding"
                );
                continue;
            };

            if distance < self.threshold {
                matches.push(RankedMatch {
                    candidate_id: candidate.id.clone(),
                    profile_name: candidate.profile_name.clone(),
                    source_url: candidate.source_url.clone(),
                    platform: candidate.platform.clone(),
                    similarity_score: round4(1.0 - distance),
                    distance: round4(distance),
                    extended: candidate.extended.clone(),
                });
            }
        }

        // Stable: equal similarity keeps candidate input order.
        matches.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(matches)
    }
}
