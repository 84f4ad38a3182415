use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        DeliveryOption, FollowUpOption, LanguageCode, PatientRef, RedFlagKind, SessionId,
        SymptomKind,
    },
    escalation::EscalationResult,
    protocol::ConditionId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Initial,
    IdentityVerification,
    SymptomAssessment,
    RedFlagCheck,
    FollowUpSelection,
    DeliveryOptions,
    Confirmation,
    Completed,
    Escalated,
}

impl State {
    pub const ALL: [State; 9] = [
        State::Initial,
        State::IdentityVerification,
        State::SymptomAssessment,
        State::RedFlagCheck,
        State::FollowUpSelection,
        State::DeliveryOptions,
        State::Confirmation,
        State::Completed,
        State::Escalated,
    ];

    /// `Completed` and `Escalated` absorb every event.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Escalated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Initial => "INITIAL",
            State::IdentityVerification => "IDENTITY_VERIFICATION",
            State::SymptomAssessment => "SYMPTOM_ASSESSMENT",
            State::RedFlagCheck => "RED_FLAG_CHECK",
            State::FollowUpSelection => "FOLLOW_UP_SELECTION",
            State::DeliveryOptions => "DELIVERY_OPTIONS",
            State::Confirmation => "CONFIRMATION",
            State::Completed => "COMPLETED",
            State::Escalated => "ESCALATED",
        }
    }

    pub fn parse(raw: &str) -> Option<State> {
        let key = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        State::ALL.into_iter().find(|s| s.as_str() == key)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one patient's triage attempt.
///
/// Handed out as a read-only snapshot; only `TriageMachine::process_event`
/// mutates the live copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriageSession {
    pub session_id: SessionId,
    pub condition: ConditionId,
    pub state: State,
    pub symptoms: BTreeSet<SymptomKind>,
    pub red_flags: BTreeSet<RedFlagKind>,
    pub follow_up_option: Option<FollowUpOption>,
    pub delivery_option: Option<DeliveryOption>,
    pub language: Option<LanguageCode>,
    pub patient_ref: Option<PatientRef>,
    pub patient_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub identity_attempts: u32,
    /// States entered so far; rewinds may only target these.
    pub visited: BTreeSet<State>,
    pub assessment: Option<EscalationResult>,
    /// Non-authoritative annotations.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TriageSession {
    pub fn new(session_id: SessionId, condition: ConditionId) -> Self {
        Self {
            session_id,
            condition,
            state: State::Initial,
            symptoms: BTreeSet::new(),
            red_flags: BTreeSet::new(),
            follow_up_option: None,
            delivery_option: None,
            language: None,
            patient_ref: None,
            patient_name: None,
            date_of_birth: None,
            identity_attempts: 0,
            visited: BTreeSet::from([State::Initial]),
            assessment: None,
            metadata: BTreeMap::new(),
        }
    }
}
