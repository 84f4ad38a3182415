//! Utterance → events, given where the conversation is.
//!
//! Symptom and red-flag recognition is delegated to an [`Extractor`]; this
//! module only handles the conversational parts (identity, choices, yes/no).

use std::{
    collections::BTreeSet,
    sync::{Arc, LazyLock},
};

use regex::Regex;

use crate::{
    domain::{DeliveryOption, FollowUpOption, LanguageCode},
    extract::Extractor,
    protocol::ConditionProtocol,
    triage::{State, TriageEvent, TriageSession},
};

/// Red flag recorded when the patient says "yes" without naming one.
pub const UNSPECIFIED_RED_FLAG: &str = "unspecified_red_flag";

const MAX_NAME_WORDS: usize = 4;

static NAME_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:my name is|my name's|name is|i'm|i am|this is|it's)\s+")
        .expect("static regex")
});

static DATE_OF_BIRTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})\b").expect("static regex")
});

static SYMPTOMS_DONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:that's all|thats all|that is all|that's it|that's everything|nothing else|no more|done|finished)\b",
    )
    .expect("static regex")
});

/// A whole-answer denial: "no", "none of those", "no, I don't".
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\W*(?:no|nope|none|neither|nothing|not really|none of (?:those|these|them|the above))\b\W*(?:$|[,.!;]|i don't\b|i do not\b|i haven't\b)",
    )
    .expect("static regex")
});

static UNCERTAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:don't know|do not know|dunno|not sure|unsure|no idea|can't remember|cannot remember|can't say|maybe|possibly|might)\b",
    )
    .expect("static regex")
});

static AFFIRMATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\W*(?:(?:actually|well|oh|um|erm)\W+)?(?:yes|yeah|yep|yup|correct|confirm|that's right|sure|ok|okay|s[ií])\b",
    )
    .expect("static regex")
});

static CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:change|edit|go back|instead|different|switch)\b").expect("static regex")
});

static CORRECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:wrong|actually|incorrect|not right)\b").expect("static regex")
});

static SPANISH_CUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:hola|tengo|dolor|gracias|por favor|buenos|buenas|me llamo|fiebre|orina)\b")
        .expect("static regex")
});

static NAME_STOP_WORDS: &[&str] = &[
    "and", "born", "my", "i", "dob", "date", "birthday", "from", "not", "on", "the", "calling",
];

/// Partial identity collected across turns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityHints {
    pub name: Option<String>,
    pub date_of_birth: Option<String>,
}

pub struct Interpreter {
    extractor: Arc<dyn Extractor>,
    default_language: LanguageCode,
}

impl Interpreter {
    pub fn new(extractor: Arc<dyn Extractor>, default_language: LanguageCode) -> Self {
        Self {
            extractor,
            default_language,
        }
    }

    /// Events to deliver, in order, for one utterance.
    pub fn interpret(
        &self,
        text: &str,
        session: &TriageSession,
        protocol: &ConditionProtocol,
        hints: &mut IdentityHints,
    ) -> Vec<TriageEvent> {
        if session.state.is_terminal() {
            return Vec::new();
        }

        let mut events = Vec::new();
        let current_lang = session.language.as_ref().unwrap_or(&self.default_language);
        if let Some(lang) = detect_language(text) {
            if lang != current_lang.as_str() {
                events.extend(TriageEvent::language_detected(lang).ok());
            }
        }

        match session.state {
            State::Initial => events.push(TriageEvent::StartTriage),
            State::IdentityVerification => events.push(identity_event(text, hints)),
            State::SymptomAssessment => {
                let found = self.extractor.extract(text, protocol);
                events.extend(
                    found
                        .symptoms
                        .iter()
                        .filter(|s| !session.symptoms.contains(*s))
                        .filter_map(|s| TriageEvent::symptom_recorded(s.as_str()).ok()),
                );
                events.extend(
                    found
                        .red_flags
                        .iter()
                        .filter_map(|r| TriageEvent::red_flag_detected(r.as_str()).ok()),
                );
                let bare_no =
                    found.is_empty() && !UNCERTAIN.is_match(text) && NEGATIVE.is_match(text);
                if SYMPTOMS_DONE.is_match(text) || bare_no {
                    events.push(TriageEvent::SymptomsComplete);
                }
            }
            State::RedFlagCheck => {
                let found = self.extractor.extract(text, protocol);
                if !found.red_flags.is_empty() {
                    events.extend(
                        found
                            .red_flags
                            .iter()
                            .filter_map(|r| TriageEvent::red_flag_detected(r.as_str()).ok()),
                    );
                } else if UNCERTAIN.is_match(text) || AFFIRMATIVE.is_match(text) {
                    // Unsure or a bare "yes": treat as present.
                    events.extend(TriageEvent::red_flag_detected(UNSPECIFIED_RED_FLAG).ok());
                } else if NEGATIVE.is_match(text) {
                    events.push(TriageEvent::NoRedFlags);
                }
            }
            State::FollowUpSelection => {
                events.extend(parse_follow_up(text).map(TriageEvent::FollowUpSelected));
            }
            State::DeliveryOptions => match parse_delivery(text) {
                Some(DeliveryOption::Pickup) => events.push(TriageEvent::PickupSelected),
                Some(option) => events.push(TriageEvent::DeliverySelected(option)),
                None => {}
            },
            State::Confirmation => {
                let affirmed = AFFIRMATIVE.is_match(text);
                if CHANGE.is_match(text) || (!affirmed && CORRECTION.is_match(text)) {
                    let target = change_target(text, &session.visited);
                    events.extend(TriageEvent::change_requested(target).ok());
                } else if affirmed {
                    events.push(TriageEvent::Confirmed);
                }
            }
            State::Completed | State::Escalated => {}
        }
        events
    }
}

fn identity_event(text: &str, hints: &mut IdentityHints) -> TriageEvent {
    if let Some(m) = DATE_OF_BIRTH.find(text) {
        hints.date_of_birth = Some(m.as_str().to_string());
    }
    if let Some(name) = extract_name(text) {
        hints.name = Some(name);
    }

    let (Some(name), Some(dob)) = (&hints.name, &hints.date_of_birth) else {
        return TriageEvent::IdentityFailed;
    };
    match TriageEvent::identity_verified(name, dob, None) {
        Ok(event) => {
            *hints = IdentityHints::default();
            event
        }
        Err(_) => {
            // Keep the name; the date was unusable.
            hints.date_of_birth = None;
            TriageEvent::IdentityFailed
        }
    }
}

/// Name after a cue ("my name is ..."), or a bare 2-4 word name.
fn extract_name(text: &str) -> Option<String> {
    let (rest, cued) = match NAME_CUE.find(text) {
        Some(m) => (&text[m.end()..], true),
        None => (text, false),
    };

    let mut words = Vec::new();
    for raw in rest.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphabetic() && c != '\'' && c != '-');
        let ends_clause = raw.ends_with([',', '.', ';', '!', '?']);
        if word.is_empty()
            || raw.chars().any(|c| c.is_ascii_digit())
            || NAME_STOP_WORDS.contains(&word.to_lowercase().as_str())
        {
            break;
        }
        words.push(word);
        if ends_clause || words.len() == MAX_NAME_WORDS {
            break;
        }
    }

    if words.is_empty() || (!cued && words.len() < 2) {
        return None;
    }
    if !cued {
        // Without a cue, only accept an utterance that is nothing but a name.
        let leftover = DATE_OF_BIRTH.replace_all(text, "");
        let leftover_words = leftover
            .split_whitespace()
            .filter(|w| w.chars().any(char::is_alphabetic))
            .count();
        if leftover_words != words.len() {
            return None;
        }
    }
    Some(words.join(" "))
}

fn parse_follow_up(text: &str) -> Option<FollowUpOption> {
    let t = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| contains_word(&t, n));
    if has(&["text", "sms", "message", "whatsapp", "mensaje"]) {
        Some(FollowUpOption::TextMessage)
    } else if has(&["in person", "visit", "come in", "face to face", "en persona"]) {
        Some(FollowUpOption::InPerson)
    } else if has(&["phone", "call", "ring", "llamada"]) {
        Some(FollowUpOption::PhoneCall)
    } else {
        None
    }
}

fn parse_delivery(text: &str) -> Option<DeliveryOption> {
    let t = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| contains_word(&t, n));
    if has(&["same day", "same-day", "today", "mismo día"]) {
        Some(DeliveryOption::SameDay)
    } else if has(&["next day", "next-day", "tomorrow", "día siguiente"]) {
        Some(DeliveryOption::NextDay)
    } else if has(&["standard", "normal", "post", "estándar"]) {
        Some(DeliveryOption::Standard)
    } else if has(&["pickup", "pick up", "collect", "pharmacy", "recoger"]) {
        Some(DeliveryOption::Pickup)
    } else {
        None
    }
}

fn change_target(text: &str, visited: &BTreeSet<State>) -> State {
    let t = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| t.contains(n));
    let wanted = if has(&["deliver", "pickup", "pick up", "collect"]) {
        State::DeliveryOptions
    } else if has(&["symptom"]) {
        State::SymptomAssessment
    } else if has(&["name", "birth", "details"]) {
        State::IdentityVerification
    } else {
        State::FollowUpSelection
    };
    if visited.contains(&wanted) {
        wanted
    } else {
        State::FollowUpSelection
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Very small detector: Arabic-script text is taken as Urdu, Spanish by cue words.
fn detect_language(text: &str) -> Option<&'static str> {
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let arabic = text
        .chars()
        .filter(|c| ('\u{0600}'..='\u{06FF}').contains(c))
        .count();
    if letters > 0 && arabic * 2 > letters {
        return Some("ur");
    }
    if SPANISH_CUES.is_match(text) {
        return Some("es");
    }
    None
}
