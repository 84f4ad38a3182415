use std::{collections::BTreeSet, sync::Arc};

use chrono::{Local, NaiveDate};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    domain::{DeliveryOption, RedFlagKind, SessionId},
    errors::Error,
    escalation::{assess_for_patient, EscalationResult},
    protocol::{Answers, ConditionProtocol},
    Result,
};

use super::{
    event::TriageEvent,
    prompts,
    state::{State, TriageSession},
    transition::{self, Target},
};

/// Outcome of one `process_event` call.
#[derive(Clone, Debug)]
pub struct Transition {
    pub from: State,
    pub to: State,
    /// False when the event had no row for `from` (or `from` was terminal).
    pub changed: bool,
    pub session: TriageSession,
}

/// One session's triage state machine.
///
/// Not shared: the orchestrator owns it and delivers events one at a time.
pub struct TriageMachine {
    protocol: Arc<ConditionProtocol>,
    session: TriageSession,
    /// Reference date for age calculations.
    as_of: NaiveDate,
}

impl TriageMachine {
    pub fn new(session_id: SessionId, protocol: Arc<ConditionProtocol>) -> Self {
        Self::with_reference_date(session_id, protocol, Local::now().date_naive())
    }

    pub fn with_reference_date(
        session_id: SessionId,
        protocol: Arc<ConditionProtocol>,
        as_of: NaiveDate,
    ) -> Self {
        let session = TriageSession::new(session_id, protocol.condition);
        Self {
            protocol,
            session,
            as_of,
        }
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn context(&self) -> &TriageSession {
        &self.session
    }

    pub fn protocol(&self) -> &ConditionProtocol {
        &self.protocol
    }

    pub fn is_complete(&self) -> bool {
        self.session.state.is_terminal()
    }

    pub fn needs_pharmacist_review(&self) -> bool {
        self.session.state == State::Escalated
            || !self.session.red_flags.is_empty()
            || self.session.state == State::Confirmation
    }

    pub fn next_prompt(&self) -> Option<String> {
        prompts::next_prompt(&self.session, &self.protocol)
    }

    pub fn age_years(&self) -> Option<u32> {
        self.session
            .date_of_birth
            .and_then(|dob| self.as_of.years_since(dob))
    }

    /// The stored assessment, or one computed from the current answers.
    pub fn assessment(&self) -> EscalationResult {
        self.session
            .assessment
            .clone()
            .unwrap_or_else(|| self.assess_now())
    }

    pub fn process_event(&mut self, event: TriageEvent) -> Result<Transition> {
        let from = self.session.state;

        if from.is_terminal() {
            debug!(session = %self.session.session_id, state = %from, event = ?event.kind(), "terminal state ignores event");
            return Ok(self.unchanged(from));
        }

        let Some(target) = transition::lookup(from, event.kind()) else {
            warn!(session = %self.session.session_id, state = %from, event = ?event.kind(), "unreachable transition; event ignored");
            return Ok(self.unchanged(from));
        };

        if let Err(err) = self.validate(&event) {
            warn!(session = %self.session.session_id, state = %from, error = %err, "event rejected");
            return Err(err);
        }

        let mut to = match (target, &event) {
            (Target::To(s), _) => s,
            (Target::Requested, TriageEvent::ChangeRequested(t)) => t.state(),
            (Target::Requested, _) => from,
        };

        self.apply(event);

        // Red flags dominate whatever the table said.
        self.absorb_derived_red_flags();
        if !self.session.red_flags.is_empty() {
            to = State::Escalated;
        }

        self.session.state = to;
        self.session.visited.insert(to);

        if to.is_terminal() || (from == State::RedFlagCheck && to == State::FollowUpSelection) {
            self.session.assessment = Some(self.assess_now());
        }
        if to == State::Escalated {
            self.session
                .metadata
                .insert("escalated_from".to_string(), json!(from.as_str()));
        }

        if to.is_terminal() {
            info!(session = %self.session.session_id, from = %from, to = %to, "triage finished");
        } else {
            debug!(session = %self.session.session_id, from = %from, to = %to, "transition");
        }

        Ok(Transition {
            from,
            to,
            changed: true,
            session: self.session.clone(),
        })
    }

    fn unchanged(&self, state: State) -> Transition {
        Transition {
            from: state,
            to: state,
            changed: false,
            session: self.session.clone(),
        }
    }

    /// Checks that need the session; payload shape was checked at construction.
    fn validate(&self, event: &TriageEvent) -> Result<()> {
        match event {
            TriageEvent::SymptomRecorded(kind) if self.protocol.question(kind.as_str()).is_none() => {
                Err(Error::validation(
                    "symptom_kind",
                    format!(
                        "{kind} is not a symptom of {}",
                        self.protocol.condition.display_name()
                    ),
                ))
            }
            TriageEvent::ChangeRequested(target) if !self.session.visited.contains(&target.state()) => {
                Err(Error::validation(
                    "target_state",
                    format!("{} was never visited", target.state()),
                ))
            }
            TriageEvent::IdentityVerified(identity) if identity.date_of_birth() > self.as_of => {
                Err(Error::validation(
                    "date_of_birth",
                    format!("{} is in the future", identity.date_of_birth()),
                ))
            }
            TriageEvent::ChangeRequested(target) if target.state() == self.session.state => {
                Err(Error::validation(
                    "target_state",
                    format!("already in {}", target.state()),
                ))
            }
            _ => Ok(()),
        }
    }

    fn apply(&mut self, event: TriageEvent) {
        let s = &mut self.session;
        match event {
            TriageEvent::IdentityVerified(identity) => {
                s.patient_name = Some(identity.name().to_string());
                s.date_of_birth = Some(identity.date_of_birth());
                s.patient_ref = identity.patient_ref().cloned();
            }
            TriageEvent::IdentityFailed => {
                s.identity_attempts += 1;
            }
            TriageEvent::SymptomRecorded(kind) => {
                s.symptoms.insert(kind);
            }
            TriageEvent::RedFlagDetected(kind) => {
                s.red_flags.insert(kind);
            }
            TriageEvent::FollowUpSelected(option) => {
                s.follow_up_option = Some(option);
            }
            TriageEvent::DeliverySelected(option) => {
                s.delivery_option = Some(option);
            }
            TriageEvent::PickupSelected => {
                s.delivery_option = Some(DeliveryOption::Pickup);
            }
            TriageEvent::ChangeRequested(target) => {
                let target = target.state();
                // States after the target have to be passed through again.
                s.visited.retain(|v| *v <= target);
                if target <= State::DeliveryOptions {
                    s.delivery_option = None;
                }
                if target <= State::FollowUpSelection {
                    s.follow_up_option = None;
                }
                if target <= State::RedFlagCheck {
                    s.assessment = None;
                }
                if target == State::IdentityVerification {
                    s.patient_name = None;
                    s.date_of_birth = None;
                    s.patient_ref = None;
                    s.identity_attempts = 0;
                }
                let changes = s
                    .metadata
                    .get("change_requests")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                s.metadata
                    .insert("change_requests".to_string(), json!(changes + 1));
            }
            TriageEvent::LanguageDetected(code) => {
                s.language = Some(code);
            }
            TriageEvent::StartTriage
            | TriageEvent::SymptomsComplete
            | TriageEvent::NoRedFlags
            | TriageEvent::Confirmed => {}
        }
    }

    /// Adds red flags the protocol derives from recorded symptoms.
    fn absorb_derived_red_flags(&mut self) {
        let derived: BTreeSet<RedFlagKind> = {
            let answers = Answers {
                symptoms: &self.session.symptoms,
                red_flags: &self.session.red_flags,
            };
            self.protocol
                .triggered_red_flags(&answers)
                .into_iter()
                .filter_map(|rule| RedFlagKind::parse(rule.id).ok())
                .collect()
        };
        self.session.red_flags.extend(derived);
    }

    fn assess_now(&self) -> EscalationResult {
        assess_for_patient(
            &self.protocol,
            &self.session.symptoms,
            &self.session.red_flags,
            self.age_years(),
        )
    }
}
