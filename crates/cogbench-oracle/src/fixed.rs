//! Offline backends.

use async_trait::async_trait;

use cogbench_core::error::OracleError;
use cogbench_core::oracle::{OracleQuery, OracleScores, SemanticOracle};

/// Returns the same scores for every pair. Useful for dry runs of the
/// pipeline without a classifier.
pub struct FixedOracle {
    scores: OracleScores,
    version: String,
}

impl FixedOracle {
    pub fn new(entailment: f64, neutral: f64, contradiction: f64) -> Self {
        Self {
            scores: OracleScores::from_probabilities(entailment, neutral, contradiction),
            version: format!("fixed:{entailment}/{neutral}/{contradiction}"),
        }
    }
}

#[async_trait]
impl SemanticOracle for FixedOracle {
    fn model_version(&self) -> &str {
        &self.version
    }

    async fn score(&self, _query: &OracleQuery) -> Result<OracleScores, OracleError> {
        Ok(self.scores)
    }
}

/// Always unavailable: every semantic constraint evaluates to indeterminate.
pub struct DisabledOracle;

#[async_trait]
impl SemanticOracle for DisabledOracle {
    fn model_version(&self) -> &str {
        "disabled"
    }

    async fn score(&self, _query: &OracleQuery) -> Result<OracleScores, OracleError> {
        Err(OracleError::Unavailable("semantic oracle disabled by configuration".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_scores_are_constant() {
        let oracle = FixedOracle::new(0.8, 0.15, 0.05);
        let a = oracle.score(&OracleQuery::new("p", "a")).await.unwrap();
        let b = oracle.score(&OracleQuery::new("q", "b")).await.unwrap();
        assert_eq!(a, b);
        assert!((a.novelty - 0.2).abs() < 1e-9);
        assert_eq!(oracle.model_version(), "fixed:0.8/0.15/0.05");
    }

    #[tokio::test]
    async fn disabled_never_scores() {
        let err = DisabledOracle
            .score_batch(&[OracleQuery::new("p", "h")])
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }
}
