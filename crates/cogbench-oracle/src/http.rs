//! Client for a text-classification inference server running an NLI model.
//!
//! Pairs are posted to `{base_url}/predict` as
//! `{"inputs": [[premise, hypothesis], ...]}`; the server answers with one
//! list of `{label, score}` predictions per pair. Labels are matched by
//! substring, so `ENTAILMENT`, `entailment` and `LABEL_entail` all work.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use cogbench_core::error::OracleError;
use cogbench_core::oracle::{OracleQuery, OracleScores, SemanticOracle};

use crate::error::BackendError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_MODEL: &str = "roberta-large-mnli";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_BATCH: usize = 16;

/// Remote NLI classifier.
pub struct HttpNliOracle {
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
    max_batch: usize,
    client: reqwest::Client,
}

impl HttpNliOracle {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout_secs: u64,
        max_batch: usize,
    ) -> Result<Self> {
        let base = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url.trim_end_matches('/')
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base.to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout_secs,
            max_batch: max_batch.max(1),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn predict(&self, chunk: &[OracleQuery]) -> Result<Vec<OracleScores>, BackendError> {
        let body = PredictRequest {
            inputs: chunk
                .iter()
                .map(|q| [q.premise.as_str(), q.hypothesis.as_str()])
                .collect(),
        };

        let mut request = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                BackendError::NetworkError(format!(
                    "NLI server not reachable at {}. Is it running?",
                    self.base_url
                ))
            } else {
                BackendError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::AuthenticationFailed(body));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::ApiError {
                status,
                message: body,
            });
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedOutput(format!("failed to parse response: {e}")))?;
        let rows = match parsed {
            PredictResponse::Batch(rows) => rows,
            PredictResponse::Single(row) => vec![row],
        };
        if rows.len() != chunk.len() {
            return Err(BackendError::MalformedOutput(format!(
                "expected {} predictions, got {}",
                chunk.len(),
                rows.len()
            )));
        }
        rows.iter().map(|row| scores_from_labels(row)).collect()
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    inputs: Vec<[&'a str; 2]>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    label: String,
    score: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PredictResponse {
    Batch(Vec<Vec<Prediction>>),
    Single(Vec<Prediction>),
}

/// Fold one prediction list into oracle scores.
fn scores_from_labels(predictions: &[Prediction]) -> Result<OracleScores, BackendError> {
    let (mut entailment, mut neutral, mut contradiction) = (None, None, None);
    for p in predictions {
        let label = p.label.to_lowercase();
        if label.contains("entail") {
            entailment = Some(p.score);
        } else if label.contains("neutral") {
            neutral = Some(p.score);
        } else if label.contains("contradict") {
            contradiction = Some(p.score);
        }
    }
    match (entailment, contradiction) {
        (Some(e), Some(c)) => Ok(OracleScores::from_probabilities(
            e,
            neutral.unwrap_or_else(|| (1.0 - e - c).max(0.0)),
            c,
        )),
        _ => {
            let labels: Vec<&str> = predictions.iter().map(|p| p.label.as_str()).collect();
            Err(BackendError::MalformedOutput(format!(
                "missing entailment/contradiction labels in {labels:?}"
            )))
        }
    }
}

#[async_trait]
impl SemanticOracle for HttpNliOracle {
    fn model_version(&self) -> &str {
        &self.model
    }

    async fn score(&self, query: &OracleQuery) -> Result<OracleScores, OracleError> {
        let mut scores = self.score_batch(std::slice::from_ref(query)).await?;
        scores
            .pop()
            .ok_or_else(|| OracleError::InvalidResponse("empty prediction list".into()))
    }

    #[instrument(skip(self, queries), fields(model = %self.model, pairs = queries.len()))]
    async fn score_batch(&self, queries: &[OracleQuery]) -> Result<Vec<OracleScores>, OracleError> {
        let mut scores = Vec::with_capacity(queries.len());
        for chunk in queries.chunks(self.max_batch) {
            debug!(size = chunk.len(), "posting NLI batch");
            scores.extend(self.predict(chunk).await?);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oracle(server: &MockServer, api_key: Option<&str>) -> HttpNliOracle {
        HttpNliOracle::new(
            &server.uri(),
            "roberta-large-mnli",
            api_key.map(String::from),
            5,
            DEFAULT_MAX_BATCH,
        )
        .unwrap()
    }

    fn row(e: f64, n: f64, c: f64) -> serde_json::Value {
        serde_json::json!([
            {"label": "CONTRADICTION", "score": c},
            {"label": "NEUTRAL", "score": n},
            {"label": "ENTAILMENT", "score": e}
        ])
    }

    #[tokio::test]
    async fn maps_labels_case_insensitively() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .and(body_partial_json(serde_json::json!({
                "inputs": [["Cells need energy.", "Mitochondria make ATP."]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([row(0.7, 0.2, 0.1)])))
            .mount(&server)
            .await;

        let scores = oracle(&server, None)
            .score(&OracleQuery::new("Cells need energy.", "Mitochondria make ATP."))
            .await
            .unwrap();
        assert!((scores.entailment - 0.7).abs() < 1e-9);
        assert!((scores.contradiction - 0.1).abs() < 1e-9);
        assert!((scores.novelty - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn batch_keeps_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                row(0.9, 0.05, 0.05),
                row(0.1, 0.1, 0.8)
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let scores = oracle(&server, None)
            .score_batch(&[OracleQuery::new("p", "a"), OracleQuery::new("p", "b")])
            .await
            .unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0].entailment > scores[1].entailment);
        assert!(scores[1].contradiction > 0.5);
    }

    #[tokio::test]
    async fn sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([row(0.5, 0.3, 0.2)])))
            .expect(1)
            .mount(&server)
            .await;

        oracle(&server, Some("secret"))
            .score(&OracleQuery::new("p", "h"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .mount(&server)
            .await;

        let err = oracle(&server, None)
            .score(&OracleQuery::new("p", "h"))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn unauthorized_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = oracle(&server, Some("wrong"))
            .score(&OracleQuery::new("p", "h"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
    }

    #[tokio::test]
    async fn unknown_labels_are_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[
                {"label": "LABEL_0", "score": 0.6},
                {"label": "LABEL_1", "score": 0.4}
            ]])))
            .mount(&server)
            .await;

        let err = oracle(&server, None)
            .score(&OracleQuery::new("p", "h"))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let oracle = HttpNliOracle::new("http://127.0.0.1:9", "m", None, 2, 4).unwrap();
        let err = oracle.score(&OracleQuery::new("p", "h")).await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_) | OracleError::Timeout { .. }));
    }

    #[test]
    fn neutral_defaults_to_remaining_mass() {
        let scores = scores_from_labels(&[
            Prediction {
                label: "entailment".into(),
                score: 0.6,
            },
            Prediction {
                label: "contradiction".into(),
                score: 0.1,
            },
        ])
        .unwrap();
        assert!((scores.novelty - 0.4).abs() < 1e-9);
    }
}
