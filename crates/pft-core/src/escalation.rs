//! Escalation policy: structured answers → treat / escalate / refer.
//!
//! Pure and condition-agnostic. Red flags are checked first and always win;
//! anything short of a clear presentation escalates.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{RedFlagKind, SymptomKind},
    protocol::{Answers, ConditionProtocol},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    /// Pharmacist-led treatment under the condition's protocol.
    Treat,
    /// Hand over to a pharmacist now.
    Escalate,
    /// Outside the service's eligibility; refer to a GP.
    Refer,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationResult {
    pub suitable_for_treatment: bool,
    /// Red flags present, reported or derived from symptoms.
    pub red_flags: BTreeSet<RedFlagKind>,
    pub recommendation: Recommendation,
    pub reasoning: String,
}

impl EscalationResult {
    fn escalate(red_flags: BTreeSet<RedFlagKind>, reasoning: String) -> Self {
        Self {
            suitable_for_treatment: false,
            red_flags,
            recommendation: Recommendation::Escalate,
            reasoning,
        }
    }
}

pub fn assess(
    protocol: &ConditionProtocol,
    symptoms: &BTreeSet<SymptomKind>,
    red_flags: &BTreeSet<RedFlagKind>,
) -> EscalationResult {
    assess_for_patient(protocol, symptoms, red_flags, None)
}

/// [`assess`] with an eligibility check on the patient's age, when known.
pub fn assess_for_patient(
    protocol: &ConditionProtocol,
    symptoms: &BTreeSet<SymptomKind>,
    red_flags: &BTreeSet<RedFlagKind>,
    age_years: Option<u32>,
) -> EscalationResult {
    let answers = Answers {
        symptoms,
        red_flags,
    };

    // Reported flags the protocol has no rule for still count.
    let mut present: BTreeSet<RedFlagKind> = red_flags.clone();
    let mut descriptions: Vec<String> = Vec::new();
    for rule in protocol.triggered_red_flags(&answers) {
        if let Ok(kind) = RedFlagKind::parse(rule.id) {
            present.insert(kind);
        }
    }
    for kind in &present {
        match protocol.red_flag(kind.as_str()) {
            Some(rule) => descriptions.push(format!("{} ({})", kind, rule.prompt)),
            None => descriptions.push(kind.to_string()),
        }
    }
    if !present.is_empty() {
        let reasoning = format!("red flags present: {}", descriptions.join("; "));
        return EscalationResult::escalate(present, reasoning);
    }

    if let Some(age) = age_years {
        if !protocol.eligible_age.contains(age) {
            return EscalationResult {
                suitable_for_treatment: false,
                red_flags: BTreeSet::new(),
                recommendation: Recommendation::Refer,
                reasoning: format!(
                    "patient age {age} is outside the {} pathway ({})",
                    protocol.condition.display_name(),
                    protocol.eligible_age
                ),
            };
        }
    }

    let main_present: Vec<&str> = symptoms
        .iter()
        .filter(|s| protocol.is_main_symptom(s))
        .map(SymptomKind::as_str)
        .collect();

    if main_present.len() >= protocol.main_symptom_threshold {
        return EscalationResult {
            suitable_for_treatment: true,
            red_flags: BTreeSet::new(),
            recommendation: Recommendation::Treat,
            reasoning: format!(
                "{} of {} main symptoms present ({}), threshold {}",
                main_present.len(),
                protocol.main_symptom_count(),
                main_present.join(", "),
                protocol.main_symptom_threshold
            ),
        };
    }

    EscalationResult::escalate(
        BTreeSet::new(),
        format!(
            "insufficient or unclear symptoms: {} of {} main symptoms present, threshold {}",
            main_present.len(),
            protocol.main_symptom_count(),
            protocol.main_symptom_threshold
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConditionId, ProtocolRegistry};

    fn uti() -> std::sync::Arc<ConditionProtocol> {
        ProtocolRegistry::pharmacy_first()
            .get(ConditionId::UncomplicatedUti)
            .unwrap()
    }

    fn symptoms(ids: &[&str]) -> BTreeSet<SymptomKind> {
        ids.iter().map(|s| SymptomKind::parse(s).unwrap()).collect()
    }

    fn flags(ids: &[&str]) -> BTreeSet<RedFlagKind> {
        ids.iter().map(|s| RedFlagKind::parse(s).unwrap()).collect()
    }

    #[test]
    fn red_flags_dominate_any_symptom_set() {
        let p = uti();
        let all_main = symptoms(&["burning_pain", "frequency", "nocturia", "cloudy_urine"]);
        for s in [BTreeSet::new(), symptoms(&["burning_pain"]), all_main] {
            let r = assess(&p, &s, &flags(&["high_temperature"]));
            assert_eq!(r.recommendation, Recommendation::Escalate);
            assert!(!r.suitable_for_treatment);
            assert!(r.red_flags.contains(&RedFlagKind::parse("high_temperature").unwrap()));
            assert!(r.reasoning.contains("high_temperature"));
        }
    }

    #[test]
    fn unknown_reported_flags_still_escalate() {
        let p = uti();
        let r = assess(
            &p,
            &symptoms(&["burning_pain", "frequency"]),
            &flags(&["chest_pain"]),
        );
        assert_eq!(r.recommendation, Recommendation::Escalate);
        assert_eq!(r.red_flags, flags(&["chest_pain"]));
    }

    #[test]
    fn every_red_flag_is_listed_in_reasoning() {
        let r = assess(&uti(), &BTreeSet::new(), &flags(&["loin_pain", "visible_blood"]));
        assert!(r.reasoning.contains("loin_pain"));
        assert!(r.reasoning.contains("visible_blood"));
    }

    #[test]
    fn threshold_met_recommends_treatment() {
        let r = assess(&uti(), &symptoms(&["burning_pain", "frequency"]), &BTreeSet::new());
        assert_eq!(r.recommendation, Recommendation::Treat);
        assert!(r.suitable_for_treatment);
        assert!(r.red_flags.is_empty());
    }

    #[test]
    fn supporting_symptoms_do_not_count_toward_threshold() {
        let r = assess(
            &uti(),
            &symptoms(&["burning_pain", "urgency", "lower_tummy_pain"]),
            &BTreeSet::new(),
        );
        assert_eq!(r.recommendation, Recommendation::Escalate);
    }

    #[test]
    fn ambiguous_presentation_escalates() {
        // One of four main symptoms, threshold two.
        let r = assess(&uti(), &symptoms(&["cloudy_urine"]), &BTreeSet::new());
        assert_eq!(r.recommendation, Recommendation::Escalate);
        assert!(!r.suitable_for_treatment);
        assert!(r.reasoning.starts_with("insufficient or unclear symptoms"));
    }

    #[test]
    fn derived_red_flag_escalates() {
        let shingles = ProtocolRegistry::pharmacy_first()
            .get(ConditionId::Shingles)
            .unwrap();
        let r = assess(
            &shingles,
            &symptoms(&["painful_rash", "one_sided_band", "rash_near_eye"]),
            &BTreeSet::new(),
        );
        assert_eq!(r.recommendation, Recommendation::Escalate);
        assert_eq!(r.red_flags, flags(&["eye_involvement"]));
    }

    #[test]
    fn age_outside_pathway_refers() {
        let s = symptoms(&["burning_pain", "frequency"]);
        let r = assess_for_patient(&uti(), &s, &BTreeSet::new(), Some(70));
        assert_eq!(r.recommendation, Recommendation::Refer);
        assert!(!r.suitable_for_treatment);

        let r = assess_for_patient(&uti(), &s, &BTreeSet::new(), Some(30));
        assert_eq!(r.recommendation, Recommendation::Treat);
    }

    #[test]
    fn red_flags_win_over_eligibility() {
        let r = assess_for_patient(
            &uti(),
            &BTreeSet::new(),
            &flags(&["confusion"]),
            Some(90),
        );
        assert_eq!(r.recommendation, Recommendation::Escalate);
    }
}
