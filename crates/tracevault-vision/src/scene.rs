//! Scene classification service trait and mock implementation.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use tracevault_core::error::{Result, TraceVaultError};

/// Service scoring an image against scene categories.
///
/// Returns a category -> confidence mapping with scores in [0, 1]. An empty
/// mapping is a valid success and results in no persisted scene analysis.
#[async_trait]
pub trait SceneClassifier: Send + Sync {
    async fn classify(&self, path: &Path) -> Result<HashMap<String, f64>>;
}

/// Mock scene classifier returning a scripted score mapping.
#[derive(Debug, Default)]
pub struct MockSceneClassifier {
    scores: HashMap<String, f64>,
    fail: bool,
}

impl MockSceneClassifier {
    /// A classifier that returns no scores (empty mapping).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_scores(scores: HashMap<String, f64>) -> Self {
        Self {
            scores,
            fail: false,
        }
    }

    /// A classifier with a plausible three-way split, for tests that only
    /// care about some scores existing.
    pub fn urban_default() -> Self {
        let mut scores = HashMap::new();
        scores.insert("urban street".to_string(), 0.71);
        scores.insert("commercial interior".to_string(), 0.18);
        scores.insert("transportation hub".to_string(), 0.06);
        Self {
            scores,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            scores: HashMap::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl SceneClassifier for MockSceneClassifier {
    async fn classify(&self, path: &Path) -> Result<HashMap<String, f64>> {
        if self.fail {
            return Err(TraceVaultError::Classification(format!(
                "mock classifier failure for {}",
                path.display()
            )));
        }
        Ok(self.scores.clone())
    }
}
