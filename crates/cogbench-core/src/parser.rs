//! JSON loaders for passages and generation batches.
//!
//! Passages come from one JSON array file or a directory tree of them
//! (`<subject>/passages.json`). Generation batches are
//! `{model, mode, generations: [...]}` documents written by the generator.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::engine::{SkipReason, SkippedQuestion};
use crate::error::EvalError;
use crate::model::{CognitiveLevel, Mode, Passage, Provenance, QuestionData};
use crate::passages::PassageStore;

/// Load passages from a file or a directory tree of `*.json` files.
///
/// When a passage has no subject, the name of its parent directory is used.
pub fn load_passages(path: &Path) -> Result<PassageStore> {
    let mut passages = Vec::new();
    if path.is_dir() {
        for file in json_files(path)? {
            passages.extend(parse_passage_file(&file)?);
        }
    } else {
        passages.extend(parse_passage_file(path)?);
    }
    tracing::info!(count = passages.len(), path = %path.display(), "loaded passages");
    PassageStore::new(passages).with_context(|| format!("invalid passage corpus: {}", path.display()))
}

fn parse_passage_file(path: &Path) -> Result<Vec<Passage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read passage file: {}", path.display()))?;
    let mut passages: Vec<Passage> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse passages: {}", path.display()))?;

    let dir_subject = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned());
    for passage in &mut passages {
        if passage.subject.trim().is_empty() {
            if let Some(subject) = &dir_subject {
                passage.subject = subject.clone();
            }
        }
    }
    Ok(passages)
}

/// All `*.json` files under `dir`, sorted for deterministic load order.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            files.extend(json_files(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Header of a generation batch file.
#[derive(Debug, Deserialize)]
struct RawBatch {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    generations: Vec<Value>,
}

/// One generation as written by the generator. Every field is optional
/// so a single bad entry does not reject the file.
#[derive(Debug, Default, Deserialize)]
struct RawGeneration {
    #[serde(default)]
    question_id: Option<String>,
    #[serde(default)]
    passage_id: Option<String>,
    #[serde(default)]
    level: Option<Value>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    vocab_level: Option<Value>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default, alias = "timestamp")]
    generated_at: Option<String>,
}

/// Questions parsed from one generation file.
#[derive(Debug, Clone)]
pub struct GenerationBatch {
    pub model: String,
    pub mode: Mode,
    pub questions: Vec<QuestionData>,
    /// Entries that could not be turned into a question at all.
    pub malformed: Vec<SkippedQuestion>,
}

/// Load a generation batch from disk.
pub fn load_generations(path: &Path) -> Result<GenerationBatch> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read generations file: {}", path.display()))?;
    parse_generations_str(&content)
        .with_context(|| format!("failed to parse generations: {}", path.display()))
}

/// Parse a generation batch from a JSON string.
pub fn parse_generations_str(content: &str) -> Result<GenerationBatch> {
    let raw: RawBatch = serde_json::from_str(content)?;
    let model = raw.model.unwrap_or_else(|| "unknown".to_string());
    let mode = match raw.mode.as_deref() {
        Some(m) => m.parse().map_err(|e: String| anyhow::anyhow!("{e}"))?,
        None => Mode::Standard,
    };

    let mut questions = Vec::with_capacity(raw.generations.len());
    let mut malformed = Vec::new();
    for (index, value) in raw.generations.into_iter().enumerate() {
        match convert(index, value, &model, mode) {
            Ok(question) => questions.push(question),
            Err(error) => {
                tracing::warn!(index, %error, "skipping malformed generation");
                malformed.push(SkippedQuestion::new(index, SkipReason::MalformedInput, &error));
            }
        }
    }

    Ok(GenerationBatch {
        model,
        mode,
        questions,
        malformed,
    })
}

fn convert(index: usize, value: Value, batch_model: &str, batch_mode: Mode) -> Result<QuestionData, EvalError> {
    let raw: RawGeneration = serde_json::from_value(value).map_err(|e| EvalError::MalformedInput {
        question_id: format!("#{index}"),
        reason: e.to_string(),
    })?;

    let passage_id = raw.passage_id.unwrap_or_default();
    let provisional_id = raw
        .question_id
        .clone()
        .unwrap_or_else(|| format!("{passage_id}#{index}"));
    let malformed = |reason: String| EvalError::MalformedInput {
        question_id: provisional_id.clone(),
        reason,
    };

    let level = match &raw.level {
        Some(v) => parse_level(v).ok_or_else(|| malformed(format!("invalid level: {v}")))?,
        None => return Err(malformed("missing level".into())),
    };
    let mode = match raw.mode.as_deref() {
        Some(m) => m.parse().map_err(malformed)?,
        None => batch_mode,
    };
    let vocab_level = match &raw.vocab_level {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_level(v).ok_or_else(|| malformed(format!("invalid vocab_level: {v}")))?),
    };

    let question_id = raw
        .question_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("{passage_id}:L{}:{mode}:{index}", level.number()));

    let question = QuestionData {
        question_id,
        passage_id,
        level,
        mode,
        vocab_level,
        question: raw.question.unwrap_or_default(),
        answer: raw.answer.unwrap_or_default(),
        subject: raw.subject.unwrap_or_default(),
        provenance: Provenance {
            model: raw.model.unwrap_or_else(|| batch_model.to_string()),
            generated_at: raw.generated_at.as_deref().and_then(parse_timestamp),
        },
    };
    question.validate()?;
    Ok(question)
}

fn parse_level(value: &Value) -> Option<CognitiveLevel> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()).and_then(CognitiveLevel::from_number),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(_) => {
            tracing::debug!(timestamp = s, "ignoring unparseable timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r#"{
        "model": "llama3:8b",
        "mode": "standard",
        "generations": [
            {
                "passage_id": "bio-1",
                "subject": "biology",
                "level": 2,
                "question": "Explain why mitochondria matter to a cell?",
                "answer": "They release energy.",
                "timestamp": "2025-03-01T10:15:30.123456"
            },
            {
                "passage_id": "bio-1",
                "level": "L4",
                "mode": "adversarial",
                "vocab_level": 1,
                "question": "Identify how glycolysis relates to the Krebs cycle.",
                "question_id": "custom-7"
            },
            { "passage_id": "bio-1", "question": "No level here?" },
            { "passage_id": "bio-1", "level": 9, "question": "Bad level?" },
            { "passage_id": "bio-1", "level": 3, "mode": "adversarial", "question": "Missing vocab?" }
        ]
    }"#;

    #[test]
    fn parses_valid_generations() {
        let batch = parse_generations_str(BATCH).unwrap();
        assert_eq!(batch.model, "llama3:8b");
        assert_eq!(batch.mode, Mode::Standard);
        assert_eq!(batch.questions.len(), 2);

        let first = &batch.questions[0];
        assert_eq!(first.question_id, "bio-1:L2:standard:0");
        assert_eq!(first.level, CognitiveLevel::Understand);
        assert_eq!(first.model(), "llama3:8b");
        assert!(first.provenance.generated_at.is_some());

        let second = &batch.questions[1];
        assert_eq!(second.question_id, "custom-7");
        assert_eq!(second.mode, Mode::Adversarial);
        assert_eq!(second.vocab_level, Some(CognitiveLevel::Remember));
    }

    #[test]
    fn malformed_entries_are_collected() {
        let batch = parse_generations_str(BATCH).unwrap();
        let indices: Vec<usize> = batch.malformed.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
        assert!(batch
            .malformed
            .iter()
            .all(|s| s.reason == SkipReason::MalformedInput));
        assert!(batch.malformed[2].message.contains("vocab_level"));
    }

    #[test]
    fn timestamps_are_lenient() {
        assert!(parse_timestamp("2025-03-01T10:15:30Z").is_some());
        assert!(parse_timestamp("2025-03-01T10:15:30").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn loads_passage_directory_with_subject_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let bio = dir.path().join("biology");
        std::fs::create_dir(&bio).unwrap();
        std::fs::write(
            bio.join("passages.json"),
            r#"[{"passage_id": "bio-1", "text": "Cells divide.", "key_concepts": ["Cells", "cell"]}]"#,
        )
        .unwrap();
        let chem = dir.path().join("chemistry");
        std::fs::create_dir(&chem).unwrap();
        std::fs::write(
            chem.join("passages.json"),
            r#"[{"passage_id": "chem-1", "subject": "chem", "text": "Atoms bond."}]"#,
        )
        .unwrap();

        let store = load_passages(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.by_id("bio-1").unwrap().subject, "biology");
        assert_eq!(store.by_id("bio-1").unwrap().key_concepts, vec!["cells"]);
        assert_eq!(store.by_id("chem-1").unwrap().subject, "chem");
    }

    #[test]
    fn malformed_passage_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passages.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_passages(&path).is_err());
    }
}
