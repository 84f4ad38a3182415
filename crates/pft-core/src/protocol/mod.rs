//! Condition protocols for the seven NHS Pharmacy First conditions.
//!
//! Every condition-specific rule lives here as data: symptom questions (with
//! their role and recognition keywords), red-flag rules and the main-symptom
//! threshold. Nothing downstream branches on a [`ConditionId`].

mod conditions;

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{RedFlagKind, SymptomKind},
    errors::Error,
    Result,
};

/// One of the seven Pharmacy First conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionId {
    UncomplicatedUti,
    Shingles,
    AcuteSinusitis,
    AcuteSoreThroat,
    AcuteOtitisMedia,
    Impetigo,
    InfectedInsectBite,
}

impl ConditionId {
    pub const ALL: [ConditionId; 7] = [
        ConditionId::UncomplicatedUti,
        ConditionId::Shingles,
        ConditionId::AcuteSinusitis,
        ConditionId::AcuteSoreThroat,
        ConditionId::AcuteOtitisMedia,
        ConditionId::Impetigo,
        ConditionId::InfectedInsectBite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionId::UncomplicatedUti => "uncomplicated_uti",
            ConditionId::Shingles => "shingles",
            ConditionId::AcuteSinusitis => "acute_sinusitis",
            ConditionId::AcuteSoreThroat => "acute_sore_throat",
            ConditionId::AcuteOtitisMedia => "acute_otitis_media",
            ConditionId::Impetigo => "impetigo",
            ConditionId::InfectedInsectBite => "infected_insect_bite",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ConditionId::UncomplicatedUti => "uncomplicated urinary tract infection",
            ConditionId::Shingles => "shingles",
            ConditionId::AcuteSinusitis => "sinusitis",
            ConditionId::AcuteSoreThroat => "sore throat",
            ConditionId::AcuteOtitisMedia => "ear infection",
            ConditionId::Impetigo => "impetigo",
            ConditionId::InfectedInsectBite => "infected insect bite",
        }
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let id = match key.as_str() {
            "uncomplicated_uti" | "uti" | "urinary_tract_infection" => ConditionId::UncomplicatedUti,
            "shingles" | "herpes_zoster" => ConditionId::Shingles,
            "acute_sinusitis" | "sinusitis" => ConditionId::AcuteSinusitis,
            "acute_sore_throat" | "sore_throat" | "pharyngitis" => ConditionId::AcuteSoreThroat,
            "acute_otitis_media" | "otitis_media" | "earache" | "ear_infection" => {
                ConditionId::AcuteOtitisMedia
            }
            "impetigo" => ConditionId::Impetigo,
            "infected_insect_bite" | "infected_insect_bites" | "insect_bite" => {
                ConditionId::InfectedInsectBite
            }
            _ => return Err(Error::UnknownCondition(s.to_string())),
        };
        Ok(id)
    }
}

/// Whether a symptom counts toward the treatment threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomRole {
    Main,
    Supporting,
}

#[derive(Clone, Debug)]
pub struct SymptomQuestion {
    pub id: &'static str,
    /// Short phrase used when listing symptoms to the patient.
    pub prompt: &'static str,
    pub role: SymptomRole,
    /// Phrases the reference extractor recognises for this symptom.
    pub keywords: &'static [&'static str],
}

/// When a red-flag rule fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedFlagPredicate {
    /// The red flag itself was reported.
    Reported,
    /// Reported, or any of these symptoms was recorded.
    AnySymptom(&'static [&'static str]),
}

#[derive(Clone, Debug)]
pub struct RedFlagRule {
    pub id: &'static str,
    pub prompt: &'static str,
    pub keywords: &'static [&'static str],
    pub predicate: RedFlagPredicate,
}

/// What the patient has told us so far, as seen by red-flag predicates.
#[derive(Clone, Copy, Debug)]
pub struct Answers<'a> {
    pub symptoms: &'a BTreeSet<SymptomKind>,
    pub red_flags: &'a BTreeSet<RedFlagKind>,
}

impl RedFlagRule {
    pub fn evaluate(&self, answers: &Answers<'_>) -> bool {
        let reported = answers.red_flags.iter().any(|f| f.as_str() == self.id);
        match &self.predicate {
            RedFlagPredicate::Reported => reported,
            RedFlagPredicate::AnySymptom(ids) => {
                reported
                    || answers
                        .symptoms
                        .iter()
                        .any(|s| ids.contains(&s.as_str()))
            }
        }
    }
}

/// Inclusive age bounds in whole years. `None` means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl AgeRange {
    pub fn contains(&self, age: u32) -> bool {
        self.min.map_or(true, |m| age >= m) && self.max.map_or(true, |m| age <= m)
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => write!(f, "{lo}-{hi}"),
            (Some(lo), None) => write!(f, "{lo}+"),
            (None, Some(hi)) => write!(f, "up to {hi}"),
            (None, None) => f.write_str("any age"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConditionProtocol {
    pub condition: ConditionId,
    pub questions: Vec<SymptomQuestion>,
    pub red_flags: Vec<RedFlagRule>,
    pub main_symptom_threshold: usize,
    pub eligible_age: AgeRange,
}

impl ConditionProtocol {
    pub fn question(&self, symptom_id: &str) -> Option<&SymptomQuestion> {
        self.questions.iter().find(|q| q.id == symptom_id)
    }

    pub fn red_flag(&self, red_flag_id: &str) -> Option<&RedFlagRule> {
        self.red_flags.iter().find(|r| r.id == red_flag_id)
    }

    pub fn is_main_symptom(&self, symptom: &SymptomKind) -> bool {
        self.question(symptom.as_str())
            .is_some_and(|q| q.role == SymptomRole::Main)
    }

    pub fn main_symptom_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| q.role == SymptomRole::Main)
            .count()
    }

    /// Red flags whose predicate holds over `answers`, in protocol order.
    pub fn triggered_red_flags(&self, answers: &Answers<'_>) -> Vec<&RedFlagRule> {
        self.red_flags
            .iter()
            .filter(|rule| rule.evaluate(answers))
            .collect()
    }

    /// Structural checks for protocols registered at runtime.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(Error::Config(format!(
                "protocol {}: {reason}",
                self.condition
            )))
        };

        let mut seen = HashSet::new();
        for q in &self.questions {
            if SymptomKind::parse(q.id).map(|k| k.as_str() != q.id).unwrap_or(true) {
                return fail(format!("symptom id {:?} is not canonical", q.id));
            }
            if !seen.insert(q.id) {
                return fail(format!("duplicate symptom id {:?}", q.id));
            }
        }

        let mut seen_flags = HashSet::new();
        for rule in &self.red_flags {
            if RedFlagKind::parse(rule.id).map(|k| k.as_str() != rule.id).unwrap_or(true) {
                return fail(format!("red flag id {:?} is not canonical", rule.id));
            }
            if !seen_flags.insert(rule.id) {
                return fail(format!("duplicate red flag id {:?}", rule.id));
            }
            if let RedFlagPredicate::AnySymptom(ids) = &rule.predicate {
                if let Some(missing) = ids.iter().find(|id| self.question(id).is_none()) {
                    return fail(format!(
                        "red flag {:?} refers to unknown symptom {missing:?}",
                        rule.id
                    ));
                }
            }
        }

        let mains = self.main_symptom_count();
        if self.main_symptom_threshold == 0 || self.main_symptom_threshold > mains {
            return fail(format!(
                "threshold {} outside 1..={mains}",
                self.main_symptom_threshold
            ));
        }
        Ok(())
    }
}

/// Immutable lookup table of condition protocols.
#[derive(Clone, Debug, Default)]
pub struct ProtocolRegistry {
    protocols: HashMap<ConditionId, Arc<ConditionProtocol>>,
}

impl ProtocolRegistry {
    /// All seven Pharmacy First conditions.
    pub fn pharmacy_first() -> Self {
        let mut protocols = HashMap::new();
        for protocol in conditions::all() {
            protocols.insert(protocol.condition, Arc::new(protocol));
        }
        Self { protocols }
    }

    pub fn register(&mut self, protocol: ConditionProtocol) -> Result<()> {
        protocol.validate()?;
        self.protocols
            .insert(protocol.condition, Arc::new(protocol));
        Ok(())
    }

    /// Look up a protocol by identifier or alias.
    pub fn lookup(&self, condition_id: &str) -> Result<Arc<ConditionProtocol>> {
        let id = condition_id.parse::<ConditionId>()?;
        self.get(id)
    }

    pub fn get(&self, id: ConditionId) -> Result<Arc<ConditionProtocol>> {
        self.protocols
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::UnknownCondition(id.as_str().to_string()))
    }

    pub fn conditions(&self) -> Vec<ConditionId> {
        let mut ids: Vec<_> = self.protocols.keys().copied().collect();
        ids.sort();
        ids
    }
}
