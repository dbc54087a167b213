//! Evaluation batch persistence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{EvaluationRun, RunAccounting, SkippedQuestion};
use crate::model::Mode;
use crate::results::EvaluationRecord;
use crate::statistics::{compute_metrics_with, MetricsSummary};
use crate::settings::Settings;

/// One evaluated generation file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationBatch {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// When the batch was written.
    pub created_at: DateTime<Utc>,
    /// Generating model of the batch.
    pub model: String,
    pub mode: Mode,
    pub registry_version: String,
    pub oracle_version: String,
    pub accounting: RunAccounting,
    #[serde(default)]
    pub skipped: Vec<SkippedQuestion>,
    pub records: Vec<EvaluationRecord>,
}

impl EvaluationBatch {
    /// Wrap a finished run.
    pub fn from_run(
        model: impl Into<String>,
        mode: Mode,
        registry_version: &str,
        oracle_version: &str,
        run: EvaluationRun,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            model: model.into(),
            mode,
            registry_version: registry_version.to_string(),
            oracle_version: oracle_version.to_string(),
            accounting: run.accounting,
            skipped: run.skipped,
            records: run.records,
        }
    }

    /// Default file name: `<model>_<mode>_eval.json`.
    pub fn file_name(&self) -> String {
        format!("{}_eval.json", file_stem(&self.model, self.mode))
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize evaluation batch")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write evaluation batch to {}", path.display()))?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read evaluation batch from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse evaluation batch: {}", path.display()))
    }

    pub fn metrics(&self, settings: &Settings) -> MetricsSummary {
        compute_metrics_with(&self.records, settings)
    }
}

/// `<model>_<mode>` with path-unsafe characters replaced.
pub fn file_stem(model: &str, mode: Mode) -> String {
    let model: String = model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    format!("{model}_{mode}")
}

/// Where the per-record checkpoint of a batch lives.
pub fn checkpoint_path(dir: &Path, model: &str, mode: Mode) -> PathBuf {
    dir.join(format!("{}.checkpoint.jsonl", file_stem(model, mode)))
}

/// Load batches from files and directories (non-recursive `*_eval.json`
/// or any `*.json` named explicitly).
pub fn load_batches(paths: &[PathBuf]) -> Result<Vec<EvaluationBatch>> {
    let mut batches = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("failed to read directory: {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with("_eval.json"))
                })
                .collect();
            files.sort();
            for file in files {
                batches.push(EvaluationBatch::load_json(&file)?);
            }
        } else {
            batches.push(EvaluationBatch::load_json(path)?);
        }
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::test_support::question;
    use crate::model::CognitiveLevel;
    use crate::results::LoosePolicy;

    fn batch(model: &str) -> EvaluationBatch {
        let q = question(CognitiveLevel::Remember, "What is ATP?", "Energy.");
        let record = EvaluationRecord::new(q, Vec::new(), LoosePolicy::default(), "reg", "oracle");
        let run = EvaluationRun {
            records: vec![record],
            ..EvaluationRun::default()
        };
        EvaluationBatch::from_run(model, Mode::Standard, "reg", "oracle", run)
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let original = batch("llama3:8b");
        assert_eq!(original.file_name(), "llama3_8b_standard_eval.json");
        assert_eq!(
            checkpoint_path(dir.path(), "llama3:8b", Mode::Adversarial),
            dir.path().join("llama3_8b_adversarial.checkpoint.jsonl")
        );
        let path = dir.path().join(original.file_name());
        original.save_json(&path).unwrap();

        let loaded = EvaluationBatch::load_json(&path).unwrap();
        assert_eq!(loaded.run_id, original.run_id);
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.model, "llama3:8b");
    }

    #[test]
    fn loads_directory_of_batches() {
        let dir = tempfile::tempdir().unwrap();
        for model in ["a", "b"] {
            let b = batch(model);
            b.save_json(&dir.path().join(b.file_name())).unwrap();
        }
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        let batches = load_batches(&[dir.path().to_path_buf()]).unwrap();
        let models: Vec<&str> = batches.iter().map(|b| b.model.as_str()).collect();
        assert_eq!(models, vec!["a", "b"]);
    }

    #[test]
    fn load_invalid_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_eval.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(EvaluationBatch::load_json(&path).is_err());
    }
}
