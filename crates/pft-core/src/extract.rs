//! Symptom / red-flag extraction from free text.
//!
//! The reference [`KeywordExtractor`] matches each protocol's keyword lists
//! with word-bounded regexes and skips matches preceded by a negation cue in
//! the same clause ("no fever", "I don't have blood in it"). It is a heuristic;
//! anything implementing [`Extractor`] can replace it.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;

use crate::{
    domain::{RedFlagKind, SymptomKind},
    protocol::{ConditionId, ConditionProtocol, ProtocolRegistry},
};

/// Words looked at before a match when checking for negation.
const NEGATION_WINDOW: usize = 4;

const NEGATIONS: &[&str] = &[
    "no", "not", "without", "never", "none", "nor", "dont", "don't", "doesnt", "doesn't",
    "havent", "haven't", "hasnt", "hasn't", "isnt", "isn't", "arent", "aren't", "denies",
];

/// Structured output of one extraction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    pub symptoms: BTreeSet<SymptomKind>,
    pub red_flags: BTreeSet<RedFlagKind>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty() && self.red_flags.is_empty()
    }

    /// Set union; merging an extraction with itself is a no-op.
    pub fn merge(&mut self, other: Extraction) {
        self.symptoms.extend(other.symptoms);
        self.red_flags.extend(other.red_flags);
    }
}

/// Converts an utterance into protocol symptom / red-flag ids.
///
/// Implementations must be deterministic: the same text and protocol always
/// yield the same extraction.
pub trait Extractor: Send + Sync {
    fn extract(&self, text: &str, protocol: &ConditionProtocol) -> Extraction;
}

struct CompiledProtocol {
    symptoms: Vec<(SymptomKind, Regex)>,
    red_flags: Vec<(RedFlagKind, Regex)>,
}

impl CompiledProtocol {
    fn compile(protocol: &ConditionProtocol) -> Self {
        let symptoms = protocol
            .questions
            .iter()
            .filter_map(|q| Some((SymptomKind::parse(q.id).ok()?, keyword_regex(q.keywords)?)))
            .collect();
        let red_flags = protocol
            .red_flags
            .iter()
            .filter_map(|r| Some((RedFlagKind::parse(r.id).ok()?, keyword_regex(r.keywords)?)))
            .collect();
        Self {
            symptoms,
            red_flags,
        }
    }

    fn run(&self, text: &str) -> Extraction {
        let text = normalize(text);
        let mut out = Extraction::default();
        for (kind, re) in &self.symptoms {
            if affirmed(re, &text) {
                out.symptoms.insert(kind.clone());
            }
        }
        for (kind, re) in &self.red_flags {
            if affirmed(re, &text) {
                out.red_flags.insert(kind.clone());
            }
        }
        out
    }
}

/// Keyword matcher with patterns precompiled per registered condition.
pub struct KeywordExtractor {
    compiled: HashMap<ConditionId, CompiledProtocol>,
}

impl KeywordExtractor {
    pub fn new(registry: &ProtocolRegistry) -> Self {
        let compiled = registry
            .conditions()
            .into_iter()
            .filter_map(|id| {
                let protocol = registry.get(id).ok()?;
                Some((id, CompiledProtocol::compile(&protocol)))
            })
            .collect();
        Self { compiled }
    }
}

impl Extractor for KeywordExtractor {
    fn extract(&self, text: &str, protocol: &ConditionProtocol) -> Extraction {
        match self.compiled.get(&protocol.condition) {
            Some(c) => c.run(text),
            None => CompiledProtocol::compile(protocol).run(text),
        }
    }
}

fn keyword_regex(keywords: &[&str]) -> Option<Regex> {
    if keywords.is_empty() {
        return None;
    }
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(&k.to_lowercase()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b")).ok()
}

fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

/// True if any match of `re` is not negated within its clause.
fn affirmed(re: &Regex, text: &str) -> bool {
    re.find_iter(text)
        .any(|m| !negated_before(&text[..m.start()]))
}

fn negated_before(prefix: &str) -> bool {
    let clause = prefix
        .rsplit(|c: char| matches!(c, '.' | ',' | ';' | '!' | '?'))
        .next()
        .unwrap_or(prefix);
    let clause = clause.rsplit(" but ").next().unwrap_or(clause);

    clause
        .split_whitespace()
        .rev()
        .take(NEGATION_WINDOW)
        .any(|w| NEGATIONS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(id: ConditionId) -> (KeywordExtractor, std::sync::Arc<ConditionProtocol>) {
        let reg = ProtocolRegistry::pharmacy_first();
        (KeywordExtractor::new(&reg), reg.get(id).unwrap())
    }

    fn ids<T: ToString>(set: &BTreeSet<T>) -> Vec<String> {
        set.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn finds_uti_symptoms_and_red_flags() {
        let (ex, uti) = setup(ConditionId::UncomplicatedUti);
        let out = ex.extract(
            "It burns when I pee and I'm going more often. I also have a fever.",
            &uti,
        );
        assert_eq!(ids(&out.symptoms), vec!["burning_pain", "frequency"]);
        assert_eq!(ids(&out.red_flags), vec!["high_temperature"]);
    }

    #[test]
    fn negated_mentions_are_ignored() {
        let (ex, uti) = setup(ConditionId::UncomplicatedUti);
        let out = ex.extract("No fever and I haven't seen any blood, but it burns", &uti);
        assert!(out.red_flags.is_empty(), "{:?}", out.red_flags);
        assert_eq!(ids(&out.symptoms), vec!["burning_pain"]);
    }

    #[test]
    fn curly_apostrophes_are_normalised() {
        let (ex, throat) = setup(ConditionId::AcuteSoreThroat);
        let out = ex.extract("I can\u{2019}t breathe properly", &throat);
        assert_eq!(ids(&out.red_flags), vec!["difficulty_breathing"]);
    }

    #[test]
    fn matches_whole_words_only() {
        let (ex, bite) = setup(ConditionId::InfectedInsectBite);
        // "tick" must not match inside "sticky".
        let out = ex.extract("the plaster is sticky", &bite);
        assert!(out.is_empty());
    }

    #[test]
    fn extraction_is_deterministic_and_idempotent() {
        let (ex, uti) = setup(ConditionId::UncomplicatedUti);
        let text = "cloudy urine, burning, back pain and confusion";
        let once = ex.extract(text, &uti);
        let again = ex.extract(text, &uti);
        assert_eq!(once, again);

        let mut merged = once.clone();
        merged.merge(again);
        assert_eq!(merged, once);
    }

    #[test]
    fn uncompiled_protocols_are_compiled_on_demand() {
        let reg = ProtocolRegistry::pharmacy_first();
        let ex = KeywordExtractor::new(&ProtocolRegistry::default());
        let impetigo = reg.get(ConditionId::Impetigo).unwrap();
        let out = ex.extract("golden crusty sores that are spreading", &impetigo);
        assert_eq!(ids(&out.symptoms), vec!["golden_crusts", "sores", "spreading"]);
    }
}
