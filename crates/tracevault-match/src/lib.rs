//! TraceVault matching crate - the identity matching engine.
//!
//! The engine is pure and deterministic: given a query embedding and a
//! candidate set it returns ranked matches above a similarity threshold.
//! Retrieval of the candidate set itself is a collaborator concern behind
//! the CandidateSource trait.

pub mod candidates;
pub mod engine;

pub use candidates::{CandidateSource, StaticCandidateSource};
pub use engine::{Candidate, MatchEngine, RankedMatch};
