//! Text matching primitives shared by the lexical constraints.
//!
//! All matching is done on lowercased text with word-boundary regexes, so a
//! concept like "cell" matches "cells" but never "cellular".

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Suffixes accepted after a concept match.
const CONCEPT_SUFFIX: &str = "(?:s|es|ed|ing)?";

/// Suffixes accepted after a marker or verb match.
const MARKER_SUFFIX: &str = "(?:s|es|d|ed|ing)?";

/// Suffixes stripped by [`stem`], tried in order.
const STEM_SUFFIXES: [&str; 17] = [
    "ing", "tion", "sion", "ment", "ness", "ous", "ive", "able", "ible", "ful", "less", "ly", "ed",
    "er", "est", "es", "s",
];

/// Words that never count as a key concept on their own.
pub const CONCEPT_STOP_WORDS: [&str; 32] = [
    "a", "an", "the", "and", "or", "of", "in", "on", "to", "for", "by", "with", "as", "at", "from",
    "is", "are", "was", "were", "be", "it", "its", "this", "that", "these", "those", "which",
    "what", "how", "why", "not", "other",
];

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("valid word regex"))
}

fn alpha_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z]+").expect("valid alpha regex"))
}

fn numeric_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\b\d+(?:\.\d+)?\s?%)|(?:\b\d+\.\d+\b)|(?:\b\d{2,}\b)")
            .expect("valid numeric regex")
    })
}

/// Lowercased `\w+` tokens.
pub fn words(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    word_regex()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Number of `\w+` tokens.
pub fn word_count(text: &str) -> usize {
    word_regex().find_iter(text).count()
}

/// Lowercased alphabetic tokens (digits and underscores dropped).
pub fn alpha_tokens(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    alpha_regex()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Strip the first matching suffix, keeping at least three characters.
pub fn stem(word: &str) -> &str {
    for suffix in STEM_SUFFIXES {
        if word.len() > suffix.len() + 2 && word.ends_with(suffix) {
            return &word[..word.len() - suffix.len()];
        }
    }
    word
}

/// Fraction of distinct stems of `a` that also occur among the stems of `b`.
pub fn stem_overlap<S: AsRef<str>>(a: &[S], b: &[S]) -> f64 {
    let stems_a: HashSet<&str> = a.iter().map(|w| stem(w.as_ref())).collect();
    if stems_a.is_empty() {
        return 0.0;
    }
    let stems_b: HashSet<&str> = b.iter().map(|w| stem(w.as_ref())).collect();
    let shared = stems_a.intersection(&stems_b).count();
    shared as f64 / stems_a.len() as f64
}

/// Fraction of distinct `n`-grams of `a` that appear verbatim in `b`.
///
/// Returns 0.0 when `a` is shorter than `n`.
pub fn ngram_overlap<S: AsRef<str>>(a: &[S], b: &[S], n: usize) -> f64 {
    if n == 0 || a.len() < n {
        return 0.0;
    }
    let grams = |ws: &[S]| -> HashSet<Vec<String>> {
        ws.windows(n)
            .map(|w| w.iter().map(|s| s.as_ref().to_string()).collect())
            .collect()
    };
    let grams_a = grams(a);
    let grams_b = if b.len() >= n { grams(b) } else { HashSet::new() };
    let shared = grams_a.intersection(&grams_b).count();
    shared as f64 / grams_a.len() as f64
}

/// Build the word-boundary pattern for a concept.
pub fn concept_regex(concept: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(&concept.trim().to_lowercase());
    Regex::new(&format!(r"\b{escaped}{CONCEPT_SUFFIX}\b"))
}

/// Concepts from `concepts` that occur in `text`, in list order.
pub fn find_concepts<S: AsRef<str>>(text: &str, concepts: &[S]) -> Result<Vec<String>, regex::Error> {
    let lower = text.to_lowercase();
    let mut found = Vec::new();
    for concept in concepts {
        let concept = concept.as_ref().trim();
        if concept.is_empty() {
            continue;
        }
        if concept_regex(concept)?.is_match(&lower) {
            found.push(concept.to_lowercase());
        }
    }
    Ok(found)
}

/// Drop found concepts that are a substring of another found concept.
///
/// "cell" and "cell cycle" both found counts once, as "cell cycle".
pub fn distinct_concepts(found: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in found {
        let shadowed = found.iter().any(|other| other != c && other.contains(c.as_str()));
        if !shadowed && !out.contains(c) {
            out.push(c.clone());
        }
    }
    out
}

/// Lowercase, trim, and collapse inner whitespace.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Key shared by the singular and plural forms of a phrase.
///
/// Only the last word is folded. The key is a stem, not always a word:
/// "hypothesis" and "hypotheses" both become "hypothes".
pub fn lemma_key(phrase: &str) -> String {
    let normalized = normalize_phrase(phrase);
    let (head, last) = match normalized.rsplit_once(' ') {
        Some((head, last)) => (Some(head), last),
        None => (None, normalized.as_str()),
    };
    let stem = fold_classical(&singularize(last));
    match head {
        Some(head) => format!("{head} {stem}"),
        None => stem,
    }
}

/// Same in both numbers.
const INVARIANT_NOUNS: &[&str] = &[
    "species", "series", "news", "physics", "genetics", "mathematics", "economics", "ethics",
];

fn singularize(word: &str) -> String {
    if word.len() <= 3 || INVARIANT_NOUNS.contains(&word) {
        return word.to_string();
    }
    if word.ends_with("sses") {
        return word[..word.len() - 2].to_string();
    }
    if word.ends_with("ies") && word.len() > 4 {
        return format!("{}y", &word[..word.len() - 3]);
    }
    for tail in ["xes", "zes", "ches", "shes"] {
        if word.ends_with(tail) {
            return word[..word.len() - 2].to_string();
        }
    }
    // analyses, viruses, gases
    if word.ends_with("ses") && word.len() > 4 {
        return word[..word.len() - 2].to_string();
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") && !word.ends_with("is") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Strip Latin and Greek number endings so both forms share a stem:
/// -sis/-ses, -um/-a, -on/-a, -us/-i, -a/-ae. A trailing silent "e" is
/// dropped too, since "-ses" plurals lose it.
fn fold_classical(word: &str) -> String {
    if INVARIANT_NOUNS.contains(&word) {
        return word.to_string();
    }
    for (tail, cut) in [
        ("sis", 2),
        ("xis", 2),
        ("us", 2),
        ("um", 2),
        ("on", 2),
        ("ae", 2),
        ("se", 1),
        ("i", 1),
        ("a", 1),
    ] {
        if word.ends_with(tail) && word.len() >= cut + 2 {
            return word[..word.len() - cut].to_string();
        }
    }
    word.to_string()
}

/// Normalize a concept list: lowercase, drop stop words and blanks, and
/// merge singular/plural variants of the same lemma (first one wins).
pub fn dedup_concepts<S: AsRef<str>>(concepts: &[S]) -> Vec<String> {
    let mut seen_keys = HashSet::new();
    let mut out = Vec::new();
    for concept in concepts {
        let normalized = normalize_phrase(concept.as_ref());
        if normalized.is_empty() || CONCEPT_STOP_WORDS.contains(&normalized.as_str()) {
            continue;
        }
        if seen_keys.insert(lemma_key(&normalized)) {
            out.push(normalized);
        }
    }
    out
}

/// Numbers that make an answer specific: multi-digit integers, decimals,
/// and percentages. A lone single digit does not qualify.
pub fn numeric_specificity(text: &str) -> Vec<String> {
    numeric_regex()
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Keep only the first `max_words` whitespace-separated words.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A compiled list of marker phrases.
///
/// Each marker matches on word boundaries with inflection tolerance, so
/// "compare" matches "compared" and "use" never matches inside "because".
#[derive(Debug, Clone)]
pub struct MarkerSet {
    entries: Vec<(String, Regex)>,
}

impl MarkerSet {
    pub fn new<S: AsRef<str>>(markers: &[S]) -> Result<Self, regex::Error> {
        let mut entries = Vec::with_capacity(markers.len());
        for marker in markers {
            let marker = normalize_phrase(marker.as_ref());
            if marker.is_empty() {
                continue;
            }
            entries.push((marker.clone(), marker_regex(&marker)?));
        }
        Ok(Self { entries })
    }

    /// First marker (in list order) found in `text`.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.entries
            .iter()
            .find(|(_, re)| re.is_match(&lower))
            .map(|(m, _)| m.as_str())
    }

    /// Every marker found in `text`, in list order.
    pub fn all_matches(&self, text: &str) -> Vec<&str> {
        let lower = text.to_lowercase();
        self.entries
            .iter()
            .filter(|(_, re)| re.is_match(&lower))
            .map(|(m, _)| m.as_str())
            .collect()
    }

    pub fn markers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(m, _)| m.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn marker_regex(marker: &str) -> Result<Regex, regex::Error> {
    let starts_word = marker.chars().next().is_some_and(is_word_char);
    let ends_word = marker.chars().last().is_some_and(is_word_char);
    let mut pattern = String::new();
    if starts_word {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(marker));
    if ends_word {
        pattern.push_str(MARKER_SUFFIX);
        pattern.push_str(r"\b");
    }
    Regex::new(&pattern)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_never_matches_cellular() {
        let found = find_concepts("Cellular respiration releases energy.", &["cell"]).unwrap();
        assert!(found.is_empty());
        let found = find_concepts("Two cells divided.", &["cell"]).unwrap();
        assert_eq!(found, vec!["cell"]);
    }

    #[test]
    fn concept_matching_accepts_inflections() {
        let text = "The enzyme catalyzed reactions while binding substrates.";
        let found = find_concepts(text, &["catalyze", "bind", "substrate", "reaction"]).unwrap();
        assert_eq!(found, vec!["bind", "substrate", "reaction"]);
    }

    #[test]
    fn distinct_concepts_drops_contained_phrases() {
        let found = vec!["cell".to_string(), "cell cycle".to_string(), "energy".to_string()];
        assert_eq!(distinct_concepts(&found), vec!["cell cycle", "energy"]);
    }

    #[test]
    fn dedup_merges_plural_variants() {
        let concepts = ["Cell", "cells", "species", "Process", "processes", "enzymes", "enzyme"];
        let deduped = dedup_concepts(&concepts);
        assert_eq!(deduped, vec!["cell", "species", "process", "enzymes"]);
        let keys: HashSet<String> = deduped.iter().map(|c| lemma_key(c)).collect();
        assert_eq!(keys.len(), deduped.len());
    }

    #[test]
    fn lemma_key_rules() {
        assert_eq!(lemma_key("glasses"), "glass");
        assert_eq!(lemma_key("bodies"), "body");
        assert_eq!(lemma_key("boxes"), "box");
        assert_eq!(lemma_key("branches"), "branch");
        assert_eq!(lemma_key("gas"), "gas");
        assert_eq!(lemma_key("gases"), "gas");
        assert_eq!(lemma_key("ions"), "ion");
        assert_eq!(lemma_key("species"), "species");
        assert_eq!(lemma_key("series"), "series");
        assert_eq!(lemma_key("red blood cells"), "red blood cell");
    }

    #[test]
    fn classical_plurals_share_a_key() {
        for (singular, plural) in [
            ("hypothesis", "hypotheses"),
            ("analysis", "analyses"),
            ("axis", "axes"),
            ("bacterium", "bacteria"),
            ("medium", "media"),
            ("mitochondrion", "mitochondria"),
            ("criterion", "criteria"),
            ("phenomenon", "phenomena"),
            ("nucleus", "nuclei"),
            ("stimulus", "stimuli"),
            ("fungus", "fungi"),
            ("larva", "larvae"),
            ("virus", "viruses"),
            ("cause", "causes"),
            ("electron", "electrons"),
        ] {
            assert_eq!(lemma_key(singular), lemma_key(plural), "{singular} / {plural}");
            assert_eq!(dedup_concepts(&[singular, plural]), vec![singular]);
        }
    }

    #[test]
    fn numeric_specificity_rejects_single_digit() {
        assert!(numeric_specificity("It took 1 step.").is_empty());
        assert_eq!(numeric_specificity("Yield rose 23%."), vec!["23%"]);
        assert_eq!(numeric_specificity("pi is about 3.14"), vec!["3.14"]);
        assert_eq!(numeric_specificity("The answer is 42."), vec!["42"]);
    }

    #[test]
    fn marker_set_respects_word_boundaries() {
        let markers = MarkerSet::new(&["use", "in contrast", "first,"]).unwrap();
        assert_eq!(markers.first_match("Because it rained."), None);
        assert_eq!(markers.first_match("They used a pump."), Some("use"));
        assert_eq!(markers.first_match("In contrast, plants..."), Some("in contrast"));
        assert_eq!(markers.all_matches("First, heat it. Use a flask."), vec!["use", "first,"]);
    }

    #[test]
    fn overlap_measures() {
        let a = words("the cell divides into two cells");
        let b = words("a cell divides into two daughter cells");
        let trigram = ngram_overlap(&a, &b, 3);
        assert!((trigram - 0.5).abs() < 1e-9);
        assert_eq!(ngram_overlap(&a[..2], &b, 3), 0.0);
        assert!(stem_overlap(&a, &b) > 0.7);
    }

    #[test]
    fn truncation_keeps_leading_words() {
        assert_eq!(truncate_words("one  two\nthree four", 3), "one two three");
    }
}
