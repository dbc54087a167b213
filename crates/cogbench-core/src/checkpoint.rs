//! Append-only JSON-lines checkpoint of completed records.
//!
//! Each finished record is written as one line and flushed immediately, so
//! an interrupted run can be resumed without recomputing finished work.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::results::EvaluationRecord;

pub struct Checkpoint {
    path: PathBuf,
    file: Mutex<File>,
}

impl std::fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpoint").field("path", &self.path).finish()
    }
}

impl Checkpoint {
    /// Open (or create) a checkpoint file for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open checkpoint: {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    pub fn append(&self, record: &EvaluationRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)
            .with_context(|| format!("failed to serialize record {}", record.question.question_id))?;
        line.push('\n');
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .with_context(|| format!("failed to write checkpoint: {}", self.path.display()))
    }

    /// Records stored in this checkpoint.
    pub fn records(&self) -> Result<Vec<EvaluationRecord>> {
        load_records(&self.path)
    }
}

/// Read every complete record from a checkpoint file.
///
/// A missing file yields no records. Lines that do not parse (typically a
/// line cut short by an interrupted write) are skipped with a warning.
pub fn load_records(path: &Path) -> Result<Vec<EvaluationRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)
        .with_context(|| format!("failed to open checkpoint: {}", path.display()))?;
    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read checkpoint: {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EvaluationRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(line = n + 1, error = %e, "ignoring unreadable checkpoint line"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::test_support::question;
    use crate::model::CognitiveLevel;
    use crate::results::LoosePolicy;

    fn record(id: &str) -> EvaluationRecord {
        let mut q = question(CognitiveLevel::Remember, "What is ATP?", "Energy currency.");
        q.question_id = id.into();
        EvaluationRecord::new(q, Vec::new(), LoosePolicy::default(), "reg-1", "oracle-1")
    }

    #[test]
    fn appends_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.jsonl");
        let checkpoint = Checkpoint::open(&path).unwrap();
        checkpoint.append(&record("a")).unwrap();
        checkpoint.append(&record("b")).unwrap();

        let reopened = Checkpoint::open(&path).unwrap();
        reopened.append(&record("c")).unwrap();
        let ids: Vec<String> = reopened
            .records()
            .unwrap()
            .into_iter()
            .map(|r| r.question.question_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn truncated_line_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let good = serde_json::to_string(&record("a")).unwrap();
        std::fs::write(&path, format!("{good}\n{{\"question\": {{\"quest")).unwrap();
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_records(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }
}
