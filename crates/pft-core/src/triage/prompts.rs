//! What the assistant says next.
//!
//! English and Spanish for every generic prompt; other languages fall back to
//! English. Symptom and red-flag phrases come from the protocol and are
//! English-only.

use crate::{
    domain::{DeliveryOption, FollowUpOption},
    escalation::Recommendation,
    protocol::ConditionProtocol,
};

use super::state::{State, TriageSession};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Key {
    Greeting,
    Identity,
    IdentityRetry,
    Symptoms,
    RedFlags,
    FollowUp,
    Delivery,
    Confirm,
    Escalated,
    CompletedTreat,
    CompletedReview,
    CompletedRefer,
    Booking,
}

/// Values the closing messages interpolate.
#[derive(Clone, Debug)]
pub struct PromptSettings {
    pub emergency_number: String,
    pub booking_url: Option<String>,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            emergency_number: "111".to_string(),
            booking_url: None,
        }
    }
}

fn text(key: Key, lang: &str) -> &'static str {
    match (key, lang) {
        (Key::Greeting, "es") => "Hola, soy el asistente de Pharmacy First. Le haré algunas preguntas sobre su {condition}.",
        (Key::Greeting, "ur") => "سلام! میں فارمیسی فرسٹ اسسٹنٹ ہوں۔",
        (Key::Greeting, _) => "Hi, I'm the Pharmacy First assistant. I'll ask you a few questions about your {condition}.",

        (Key::Identity, "es") => "¿Cuál es su nombre completo y su fecha de nacimiento?",
        (Key::Identity, _) => "What's your full name and date of birth?",

        (Key::IdentityRetry, "es") => "No he entendido sus datos. ¿Puede decirme su nombre completo y su fecha de nacimiento, por ejemplo 1990-01-31?",
        (Key::IdentityRetry, _) => "I didn't catch that. Could you tell me your full name and date of birth, for example 1990-01-31?",

        (Key::Symptoms, "es") => "¿Tiene alguno de los siguientes síntomas: {list}? Diga \"eso es todo\" cuando termine.",
        (Key::Symptoms, _) => "Can you tell me if you have any of the following: {list}? Say \"that's all\" when you've finished.",

        (Key::RedFlags, "es") => "Antes de continuar, ¿tiene alguno de estos: {list}?",
        (Key::RedFlags, _) => "Before we continue, do you have any of these: {list}?",

        (Key::FollowUp, "es") => "¿Cómo prefiere que le contacte el farmacéutico: por llamada, en persona o por mensaje de texto?",
        (Key::FollowUp, _) => "How would you like the pharmacist to follow up: a phone call, in person, or by text message?",

        (Key::Delivery, "es") => "¿Prefiere recoger su medicamento en la farmacia, o envío estándar, al día siguiente o el mismo día?",
        (Key::Delivery, _) => "Would you like to collect your medicine from the pharmacy, or have it delivered standard, next day or same day?",

        (Key::Confirm, "es") => "Para confirmar: {summary}. ¿Es correcto? Diga sí para confirmar o dígame qué quiere cambiar.",
        (Key::Confirm, _) => "To confirm: {summary}. Is that right? Say yes to confirm, or tell me what you'd like to change.",

        (Key::Escalated, "es") => "Por lo que me ha contado, un farmacéutico necesita revisar su caso. Si se encuentra muy mal, llame al {number} ahora.",
        (Key::Escalated, _) => "Based on what you've told me, a pharmacist needs to review this. If you feel very unwell, please call {number} now.",

        (Key::CompletedTreat, "es") => "Gracias{name}. Un farmacéutico preparará su tratamiento.",
        (Key::CompletedTreat, _) => "Thanks{name}. A pharmacist will prepare your treatment.",

        (Key::CompletedReview, "es") => "Gracias{name}. Un farmacéutico revisará sus respuestas y se pondrá en contacto con usted.",
        (Key::CompletedReview, _) => "Thanks{name}. A pharmacist will review your answers and get in touch.",

        (Key::CompletedRefer, "es") => "Gracias{name}. Este servicio no puede tratar esta afección en su caso; por favor contacte con su médico de cabecera.",
        (Key::CompletedRefer, _) => "Thanks{name}. This service can't treat this for you; please contact your GP.",

        (Key::Booking, "es") => "Más información sobre Pharmacy First: {url}",
        (Key::Booking, _) => "You can find out more about Pharmacy First here: {url}",
    }
}

fn lang(session: &TriageSession) -> &str {
    session.language.as_ref().map_or("en", |l| l.as_str())
}

fn join_phrases(phrases: &[&str]) -> String {
    match phrases {
        [] => String::new(),
        [one] => (*one).to_string(),
        [init @ .., last] => format!("{}, or {last}", init.join(", ")),
    }
}

fn follow_up_phrase(option: FollowUpOption) -> &'static str {
    match option {
        FollowUpOption::PhoneCall => "follow-up by phone call",
        FollowUpOption::InPerson => "follow-up in person",
        FollowUpOption::TextMessage => "follow-up by text message",
    }
}

fn delivery_phrase(option: DeliveryOption) -> &'static str {
    match option {
        DeliveryOption::Pickup => "collected from the pharmacy",
        DeliveryOption::Standard => "standard delivery",
        DeliveryOption::NextDay => "next-day delivery",
        DeliveryOption::SameDay => "same-day delivery",
    }
}

fn summary(session: &TriageSession) -> String {
    let mut parts = Vec::new();
    if let Some(name) = &session.patient_name {
        parts.push(name.clone());
    }
    if let Some(f) = session.follow_up_option {
        parts.push(follow_up_phrase(f).to_string());
    }
    if let Some(d) = session.delivery_option {
        parts.push(delivery_phrase(d).to_string());
    }
    parts.join(", ")
}

/// The prompt for the session's current state; `None` once terminal.
pub fn next_prompt(session: &TriageSession, protocol: &ConditionProtocol) -> Option<String> {
    let lang = lang(session);
    let prompt = match session.state {
        State::Initial => format!(
            "{} {}",
            text(Key::Greeting, lang).replace("{condition}", protocol.condition.display_name()),
            text(Key::Identity, lang)
        ),
        State::IdentityVerification if session.identity_attempts > 0 => {
            text(Key::IdentityRetry, lang).to_string()
        }
        State::IdentityVerification => text(Key::Identity, lang).to_string(),
        State::SymptomAssessment => {
            let phrases: Vec<&str> = protocol.questions.iter().map(|q| q.prompt).collect();
            text(Key::Symptoms, lang).replace("{list}", &join_phrases(&phrases))
        }
        State::RedFlagCheck => {
            let phrases: Vec<&str> = protocol.red_flags.iter().map(|r| r.prompt).collect();
            text(Key::RedFlags, lang).replace("{list}", &join_phrases(&phrases))
        }
        State::FollowUpSelection => text(Key::FollowUp, lang).to_string(),
        State::DeliveryOptions => text(Key::Delivery, lang).to_string(),
        State::Confirmation => text(Key::Confirm, lang).replace("{summary}", &summary(session)),
        State::Completed | State::Escalated => return None,
    };
    Some(prompt)
}

/// What to tell the patient once the session is terminal.
pub fn closing_message(session: &TriageSession, settings: &PromptSettings) -> Option<String> {
    let lang = lang(session);
    let name = session
        .patient_name
        .as_deref()
        .map(|n| format!(", {n}"))
        .unwrap_or_default();

    let mut message = match session.state {
        State::Escalated => {
            return Some(text(Key::Escalated, lang).replace("{number}", &settings.emergency_number))
        }
        State::Completed => {
            let key = match session.assessment.as_ref().map(|a| a.recommendation) {
                Some(Recommendation::Treat) => Key::CompletedTreat,
                Some(Recommendation::Refer) => Key::CompletedRefer,
                Some(Recommendation::Escalate) | None => Key::CompletedReview,
            };
            text(key, lang).replace("{name}", &name)
        }
        _ => return None,
    };

    if let Some(url) = &settings.booking_url {
        message.push(' ');
        message.push_str(&text(Key::Booking, lang).replace("{url}", url));
    }
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{LanguageCode, SessionId},
        escalation::assess,
        protocol::{ConditionId, ProtocolRegistry},
    };

    fn session(state: State) -> (TriageSession, std::sync::Arc<ConditionProtocol>) {
        let p = ProtocolRegistry::pharmacy_first()
            .get(ConditionId::UncomplicatedUti)
            .unwrap();
        let mut s = TriageSession::new(SessionId::from("s"), p.condition);
        s.state = state;
        (s, p)
    }

    #[test]
    fn every_non_terminal_state_has_a_prompt() {
        for state in State::ALL {
            let (s, p) = session(state);
            assert_eq!(next_prompt(&s, &p).is_some(), !state.is_terminal(), "{state}");
        }
    }

    #[test]
    fn symptom_prompt_lists_protocol_questions() {
        let (s, p) = session(State::SymptomAssessment);
        let prompt = next_prompt(&s, &p).unwrap();
        assert!(prompt.contains("pain or burning when you pass urine"));
        assert!(prompt.contains(", or pain low down in your tummy?"));
    }

    #[test]
    fn identity_retry_prompt_differs() {
        let (mut s, p) = session(State::IdentityVerification);
        let first = next_prompt(&s, &p).unwrap();
        s.identity_attempts = 1;
        let retry = next_prompt(&s, &p).unwrap();
        assert_ne!(first, retry);
        assert!(retry.starts_with("I didn't catch that"));
    }

    #[test]
    fn prompts_are_localised_with_english_fallback() {
        let (mut s, p) = session(State::FollowUpSelection);
        s.language = Some(LanguageCode::parse("es").unwrap());
        assert!(next_prompt(&s, &p).unwrap().starts_with("¿Cómo"));

        s.language = Some(LanguageCode::parse("pl").unwrap());
        assert!(next_prompt(&s, &p).unwrap().starts_with("How would you like"));
    }

    #[test]
    fn confirmation_summarises_choices() {
        let (mut s, p) = session(State::Confirmation);
        s.patient_name = Some("Jane Doe".to_string());
        s.follow_up_option = Some(FollowUpOption::TextMessage);
        s.delivery_option = Some(DeliveryOption::Pickup);
        let prompt = next_prompt(&s, &p).unwrap();
        assert!(prompt.contains("Jane Doe, follow-up by text message, collected from the pharmacy"));
    }

    #[test]
    fn closing_messages_follow_the_outcome() {
        let settings = PromptSettings {
            emergency_number: "111".to_string(),
            booking_url: Some("https://example.org/pf".to_string()),
        };

        let (s, _) = session(State::Escalated);
        let msg = closing_message(&s, &settings).unwrap();
        assert!(msg.contains("call 111"));

        let (mut s, p) = session(State::Completed);
        s.symptoms = ["burning_pain", "frequency"]
            .iter()
            .map(|k| crate::domain::SymptomKind::parse(k).unwrap())
            .collect();
        s.assessment = Some(assess(&p, &s.symptoms, &s.red_flags));
        s.patient_name = Some("Jane".to_string());
        let msg = closing_message(&s, &settings).unwrap();
        assert!(msg.starts_with("Thanks, Jane. A pharmacist will prepare"));
        assert!(msg.ends_with("https://example.org/pf"));

        let (s, _) = session(State::Confirmation);
        assert!(closing_message(&s, &settings).is_none());
    }
}
