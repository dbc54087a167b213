//! Read-only passage corpus.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::error::EvalError;
use crate::model::{Passage, QuestionData};

/// Passages keyed by id, normalized on insert.
#[derive(Debug, Clone, Default)]
pub struct PassageStore {
    passages: BTreeMap<String, Passage>,
}

impl PassageStore {
    /// Build a store. Duplicate passage ids are an error.
    pub fn new(passages: impl IntoIterator<Item = Passage>) -> Result<Self> {
        let mut store = BTreeMap::new();
        for passage in passages {
            let passage = passage.normalized();
            if passage.passage_id.trim().is_empty() {
                bail!("passage without passage_id (title: '{}')", passage.title);
            }
            if store.contains_key(&passage.passage_id) {
                bail!("duplicate passage_id: {}", passage.passage_id);
            }
            store.insert(passage.passage_id.clone(), passage);
        }
        Ok(Self { passages: store })
    }

    /// Look up the passage a question was generated from.
    pub fn get(&self, question: &QuestionData) -> Result<&Passage, EvalError> {
        self.passages
            .get(&question.passage_id)
            .ok_or_else(|| EvalError::PassageNotFound {
                passage_id: question.passage_id.clone(),
                question_id: question.question_id.clone(),
            })
    }

    pub fn by_id(&self, passage_id: &str) -> Option<&Passage> {
        self.passages.get(passage_id)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Passage> {
        self.passages.values()
    }

    /// Distinct subjects, sorted.
    pub fn subjects(&self) -> Vec<&str> {
        let mut subjects: Vec<&str> = self.passages.values().map(|p| p.subject.as_str()).collect();
        subjects.sort_unstable();
        subjects.dedup();
        subjects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::test_support::{passage, question};
    use crate::model::CognitiveLevel;

    #[test]
    fn normalizes_concepts_on_insert() {
        let mut p = passage(&["Mitochondria", "mitochondrion", "Cells", "cell", "the"]);
        p.methods_principles = vec!["Krebs Cycle".into(), "krebs cycle".into()];
        let store = PassageStore::new([p]).unwrap();
        let stored = store.by_id("bio-1").unwrap();
        assert!(!stored.key_concepts.iter().any(|c| c == "the"));
        assert_eq!(stored.key_concepts, vec!["mitochondria", "cells"]);
        assert_eq!(stored.methods_principles, vec!["krebs cycle"]);
    }

    #[test]
    fn classical_plurals_collapse_on_insert() {
        let p = passage(&["hypothesis", "hypotheses", "Nuclei", "nucleus", "species"]);
        let store = PassageStore::new([p]).unwrap();
        assert_eq!(
            store.by_id("bio-1").unwrap().key_concepts,
            vec!["hypothesis", "nuclei", "species"]
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = PassageStore::new([passage(&[]), passage(&[])]).unwrap_err();
        assert!(err.to_string().contains("duplicate passage_id"));
    }

    #[test]
    fn missing_passage_is_reported() {
        let store = PassageStore::new([passage(&[])]).unwrap();
        let mut q = question(CognitiveLevel::Remember, "What is ATP?", "");
        assert!(store.get(&q).is_ok());
        q.passage_id = "chem-9".into();
        match store.get(&q) {
            Err(EvalError::PassageNotFound { passage_id, .. }) => assert_eq!(passage_id, "chem-9"),
            other => panic!("expected PassageNotFound, got {other:?}"),
        }
    }
}
