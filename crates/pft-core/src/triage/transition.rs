//! The transition table: (state, event kind) → target.
//!
//! Pairs absent from the table leave the session unchanged. Terminal states
//! have no rows. A red flag escalates from every non-terminal state.

use std::collections::BTreeSet;

use super::{event::EventKind, state::State};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    To(State),
    /// The state named by a `ChangeRequested` payload.
    Requested,
}

#[derive(Clone, Copy, Debug)]
pub struct Rule {
    pub from: State,
    pub on: EventKind,
    pub to: Target,
}

const fn rule(from: State, on: EventKind, to: State) -> Rule {
    Rule {
        from,
        on,
        to: Target::To(to),
    }
}

use EventKind as E;
use State as S;

pub static TABLE: &[Rule] = &[
    rule(S::Initial, E::StartTriage, S::IdentityVerification),
    rule(S::IdentityVerification, E::IdentityVerified, S::SymptomAssessment),
    rule(S::IdentityVerification, E::IdentityFailed, S::IdentityVerification),
    rule(S::SymptomAssessment, E::SymptomRecorded, S::SymptomAssessment),
    rule(S::SymptomAssessment, E::SymptomsComplete, S::RedFlagCheck),
    rule(S::RedFlagCheck, E::NoRedFlags, S::FollowUpSelection),
    rule(
        S::FollowUpSelection,
        E::FollowUpSelected { text_message: true },
        S::DeliveryOptions,
    ),
    rule(
        S::FollowUpSelection,
        E::FollowUpSelected {
            text_message: false,
        },
        S::Confirmation,
    ),
    rule(S::DeliveryOptions, E::DeliverySelected, S::Confirmation),
    rule(S::DeliveryOptions, E::PickupSelected, S::Confirmation),
    rule(S::Confirmation, E::Confirmed, S::Completed),
    Rule {
        from: S::Confirmation,
        on: E::ChangeRequested,
        to: Target::Requested,
    },
    // Red flags.
    rule(S::Initial, E::RedFlagDetected, S::Escalated),
    rule(S::IdentityVerification, E::RedFlagDetected, S::Escalated),
    rule(S::SymptomAssessment, E::RedFlagDetected, S::Escalated),
    rule(S::RedFlagCheck, E::RedFlagDetected, S::Escalated),
    rule(S::FollowUpSelection, E::RedFlagDetected, S::Escalated),
    rule(S::DeliveryOptions, E::RedFlagDetected, S::Escalated),
    rule(S::Confirmation, E::RedFlagDetected, S::Escalated),
    // Language can be detected at any point before the end.
    rule(S::Initial, E::LanguageDetected, S::Initial),
    rule(S::IdentityVerification, E::LanguageDetected, S::IdentityVerification),
    rule(S::SymptomAssessment, E::LanguageDetected, S::SymptomAssessment),
    rule(S::RedFlagCheck, E::LanguageDetected, S::RedFlagCheck),
    rule(S::FollowUpSelection, E::LanguageDetected, S::FollowUpSelection),
    rule(S::DeliveryOptions, E::LanguageDetected, S::DeliveryOptions),
    rule(S::Confirmation, E::LanguageDetected, S::Confirmation),
];

pub fn lookup(from: State, on: EventKind) -> Option<Target> {
    TABLE
        .iter()
        .find(|r| r.from == from && r.on == on)
        .map(|r| r.to)
}

/// Events with a row for `from`.
pub fn accepted_events(from: State) -> Vec<EventKind> {
    TABLE
        .iter()
        .filter(|r| r.from == from)
        .map(|r| r.on)
        .collect()
}

/// States reachable from `from` following table rows, where a
/// `Requested` target may be any state already on the path.
pub fn reachable_from(from: State) -> BTreeSet<State> {
    let mut seen = BTreeSet::from([from]);
    let mut stack = vec![from];
    while let Some(s) = stack.pop() {
        for r in TABLE.iter().filter(|r| r.from == s) {
            let next = match r.to {
                Target::To(t) => vec![t],
                Target::Requested => seen.iter().copied().filter(|t| !t.is_terminal()).collect(),
            };
            for t in next {
                if seen.insert(t) {
                    stack.push(t);
                }
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_duplicate_rows() {
        for (i, a) in TABLE.iter().enumerate() {
            for b in &TABLE[i + 1..] {
                assert!(
                    !(a.from == b.from && a.on == b.on),
                    "duplicate row for {:?} on {:?}",
                    a.from,
                    a.on
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_rows() {
        for s in State::ALL.into_iter().filter(|s| s.is_terminal()) {
            for e in EventKind::ALL {
                assert_eq!(lookup(s, e), None, "{s} should absorb {e:?}");
            }
        }
    }

    #[test]
    fn every_state_is_reachable_from_initial() {
        let reachable = reachable_from(State::Initial);
        assert_eq!(reachable, State::ALL.into_iter().collect());
    }

    #[test]
    fn every_non_terminal_state_can_reach_a_terminal_state() {
        for s in State::ALL.into_iter().filter(|s| !s.is_terminal()) {
            let r = reachable_from(s);
            assert!(r.contains(&State::Escalated), "{s} cannot escalate");
            assert!(r.contains(&State::Completed), "{s} cannot complete");
        }
    }

    #[test]
    fn red_flags_escalate_from_every_non_terminal_state() {
        for s in State::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert_eq!(
                lookup(s, EventKind::RedFlagDetected),
                Some(Target::To(State::Escalated))
            );
        }
    }

    #[test]
    fn follow_up_branches_on_text_message() {
        assert_eq!(
            lookup(
                State::FollowUpSelection,
                EventKind::FollowUpSelected { text_message: true }
            ),
            Some(Target::To(State::DeliveryOptions))
        );
        assert_eq!(
            lookup(
                State::FollowUpSelection,
                EventKind::FollowUpSelected {
                    text_message: false
                }
            ),
            Some(Target::To(State::Confirmation))
        );
    }

    #[test]
    fn exhaustive_table_shape() {
        // Count of defined (state, event) pairs; catches accidental edits.
        let defined = State::ALL
            .into_iter()
            .flat_map(|s| EventKind::ALL.into_iter().map(move |e| (s, e)))
            .filter(|(s, e)| lookup(*s, *e).is_some())
            .count();
        assert_eq!(defined, TABLE.len());
        assert_eq!(accepted_events(State::Confirmation).len(), 4);
    }
}
