//! Inbound triage events.
//!
//! Payload types have private fields, so every event carrying data goes
//! through a validating constructor. `from_json` accepts the wire form used by
//! orchestrators (`{"type": "SYMPTOM_RECORDED", "symptom_kind": "frequency"}`).

use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::{
    domain::{DeliveryOption, FollowUpOption, LanguageCode, PatientRef, RedFlagKind, SymptomKind},
    errors::Error,
    Result,
};

use super::state::State;

const MAX_NAME_LEN: usize = 120;
const EARLIEST_BIRTH_YEAR: i32 = 1900;

/// Verified patient identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    name: String,
    date_of_birth: NaiveDate,
    patient_ref: Option<PatientRef>,
}

impl Identity {
    pub fn new(name: &str, date_of_birth: &str, patient_ref: Option<&str>) -> Result<Self> {
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(Error::validation("name", "too long"));
        }
        if !name.chars().any(char::is_alphabetic) {
            return Err(Error::validation("name", format!("{name:?} contains no letters")));
        }

        let date_of_birth = parse_date_of_birth(date_of_birth)?;

        let patient_ref = match patient_ref.map(str::trim) {
            Some("") => return Err(Error::validation("patient_ref", "must not be blank")),
            Some(r) => Some(PatientRef(r.to_string())),
            None => None,
        };

        Ok(Self {
            name,
            date_of_birth,
            patient_ref,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date_of_birth(&self) -> NaiveDate {
        self.date_of_birth
    }

    pub fn patient_ref(&self) -> Option<&PatientRef> {
        self.patient_ref.as_ref()
    }
}

/// `YYYY-MM-DD` or `DD/MM/YYYY`.
pub fn parse_date_of_birth(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::validation("date_of_birth", "must not be empty"));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .map_err(|_| {
            Error::validation(
                "date_of_birth",
                format!("expected YYYY-MM-DD or DD/MM/YYYY, got {raw:?}"),
            )
        })?;
    if chrono::Datelike::year(&date) < EARLIEST_BIRTH_YEAR {
        return Err(Error::validation(
            "date_of_birth",
            format!("implausible year in {raw:?}"),
        ));
    }
    if date > Local::now().date_naive() {
        return Err(Error::validation(
            "date_of_birth",
            format!("{raw:?} is in the future"),
        ));
    }
    Ok(date)
}

/// A state the patient may ask to go back to from confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeTarget(State);

impl ChangeTarget {
    pub fn new(state: State) -> Result<Self> {
        if state.is_terminal() || state == State::Initial {
            return Err(Error::validation(
                "target_state",
                format!("cannot return to {state}"),
            ));
        }
        Ok(Self(state))
    }

    pub fn state(self) -> State {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriageEvent {
    StartTriage,
    IdentityVerified(Identity),
    IdentityFailed,
    SymptomRecorded(SymptomKind),
    SymptomsComplete,
    RedFlagDetected(RedFlagKind),
    NoRedFlags,
    FollowUpSelected(FollowUpOption),
    DeliverySelected(DeliveryOption),
    PickupSelected,
    Confirmed,
    ChangeRequested(ChangeTarget),
    LanguageDetected(LanguageCode),
}

/// Payload-free event discriminant used as the transition-table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    StartTriage,
    IdentityVerified,
    IdentityFailed,
    SymptomRecorded,
    SymptomsComplete,
    RedFlagDetected,
    NoRedFlags,
    /// Follow-up choice; text messages branch to delivery options.
    FollowUpSelected { text_message: bool },
    DeliverySelected,
    PickupSelected,
    Confirmed,
    ChangeRequested,
    LanguageDetected,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::StartTriage,
        EventKind::IdentityVerified,
        EventKind::IdentityFailed,
        EventKind::SymptomRecorded,
        EventKind::SymptomsComplete,
        EventKind::RedFlagDetected,
        EventKind::NoRedFlags,
        EventKind::FollowUpSelected { text_message: true },
        EventKind::FollowUpSelected {
            text_message: false,
        },
        EventKind::DeliverySelected,
        EventKind::PickupSelected,
        EventKind::Confirmed,
        EventKind::ChangeRequested,
        EventKind::LanguageDetected,
    ];
}

impl TriageEvent {
    pub fn identity_verified(
        name: &str,
        date_of_birth: &str,
        patient_ref: Option<&str>,
    ) -> Result<Self> {
        Identity::new(name, date_of_birth, patient_ref).map(TriageEvent::IdentityVerified)
    }

    pub fn symptom_recorded(symptom_kind: &str) -> Result<Self> {
        SymptomKind::parse(symptom_kind).map(TriageEvent::SymptomRecorded)
    }

    pub fn red_flag_detected(red_flag_kind: &str) -> Result<Self> {
        RedFlagKind::parse(red_flag_kind).map(TriageEvent::RedFlagDetected)
    }

    pub fn change_requested(target: State) -> Result<Self> {
        ChangeTarget::new(target).map(TriageEvent::ChangeRequested)
    }

    pub fn language_detected(code: &str) -> Result<Self> {
        LanguageCode::parse(code).map(TriageEvent::LanguageDetected)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            TriageEvent::StartTriage => EventKind::StartTriage,
            TriageEvent::IdentityVerified(_) => EventKind::IdentityVerified,
            TriageEvent::IdentityFailed => EventKind::IdentityFailed,
            TriageEvent::SymptomRecorded(_) => EventKind::SymptomRecorded,
            TriageEvent::SymptomsComplete => EventKind::SymptomsComplete,
            TriageEvent::RedFlagDetected(_) => EventKind::RedFlagDetected,
            TriageEvent::NoRedFlags => EventKind::NoRedFlags,
            TriageEvent::FollowUpSelected(option) => EventKind::FollowUpSelected {
                text_message: *option == FollowUpOption::TextMessage,
            },
            TriageEvent::DeliverySelected(_) => EventKind::DeliverySelected,
            TriageEvent::PickupSelected => EventKind::PickupSelected,
            TriageEvent::Confirmed => EventKind::Confirmed,
            TriageEvent::ChangeRequested(_) => EventKind::ChangeRequested,
            TriageEvent::LanguageDetected(_) => EventKind::LanguageDetected,
        }
    }

    /// Parse and validate the JSON wire form.
    pub fn from_json(raw: &str) -> Result<Self> {
        let wire: WireEvent = serde_json::from_str(raw)
            .map_err(|e| Error::validation("event", format!("malformed event: {e}")))?;
        TriageEvent::try_from(wire)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireEvent {
    StartTriage,
    IdentityVerified {
        name: Option<String>,
        #[serde(alias = "dob", alias = "dateOfBirth")]
        date_of_birth: Option<String>,
        #[serde(alias = "patientRef")]
        patient_ref: Option<String>,
    },
    IdentityFailed,
    SymptomRecorded {
        #[serde(alias = "symptomKind")]
        symptom_kind: Option<String>,
    },
    SymptomsComplete,
    RedFlagDetected {
        #[serde(alias = "redFlagKind")]
        red_flag_kind: Option<String>,
    },
    NoRedFlags,
    FollowUpSelected {
        option: Option<FollowUpOption>,
    },
    DeliverySelected {
        option: Option<DeliveryOption>,
    },
    PickupSelected,
    Confirmed,
    ChangeRequested {
        #[serde(alias = "targetState", alias = "target")]
        target_state: Option<String>,
    },
    LanguageDetected {
        #[serde(alias = "language")]
        code: Option<String>,
    },
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
    value.ok_or_else(|| Error::validation(field, "missing"))
}

impl TryFrom<WireEvent> for TriageEvent {
    type Error = Error;

    fn try_from(wire: WireEvent) -> Result<Self> {
        let event = match wire {
            WireEvent::StartTriage => TriageEvent::StartTriage,
            WireEvent::IdentityVerified {
                name,
                date_of_birth,
                patient_ref,
            } => TriageEvent::identity_verified(
                &required(name, "name")?,
                &required(date_of_birth, "date_of_birth")?,
                patient_ref.as_deref(),
            )?,
            WireEvent::IdentityFailed => TriageEvent::IdentityFailed,
            WireEvent::SymptomRecorded { symptom_kind } => {
                TriageEvent::symptom_recorded(&required(symptom_kind, "symptom_kind")?)?
            }
            WireEvent::SymptomsComplete => TriageEvent::SymptomsComplete,
            WireEvent::RedFlagDetected { red_flag_kind } => {
                TriageEvent::red_flag_detected(&required(red_flag_kind, "red_flag_kind")?)?
            }
            WireEvent::NoRedFlags => TriageEvent::NoRedFlags,
            WireEvent::FollowUpSelected { option } => TriageEvent::FollowUpSelected(
                option.ok_or_else(|| Error::validation("option", "missing"))?,
            ),
            WireEvent::DeliverySelected { option } => TriageEvent::DeliverySelected(
                option.ok_or_else(|| Error::validation("option", "missing"))?,
            ),
            WireEvent::PickupSelected => TriageEvent::PickupSelected,
            WireEvent::Confirmed => TriageEvent::Confirmed,
            WireEvent::ChangeRequested { target_state } => {
                let raw = required(target_state, "target_state")?;
                let state = State::parse(&raw).ok_or_else(|| {
                    Error::validation("target_state", format!("unknown state {raw:?}"))
                })?;
                TriageEvent::change_requested(state)?
            }
            WireEvent::LanguageDetected { code } => {
                TriageEvent::language_detected(&required(code, "code")?)?
            }
        };
        Ok(event)
    }
}
