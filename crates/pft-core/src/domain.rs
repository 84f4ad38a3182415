use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

const MAX_SLUG_LEN: usize = 64;

/// Orchestrator-assigned session id (call sid, chat id, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_string())
    }
}

/// Opaque patient reference issued by an external record system.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatientRef(pub String);

/// Symptom identifier as used by condition protocols (`burning_pain`, `frequency`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymptomKind(String);

impl SymptomKind {
    pub fn parse(raw: &str) -> Result<Self> {
        normalize_slug(raw)
            .map(SymptomKind)
            .ok_or_else(|| Error::validation("symptom_kind", format!("not a symptom id: {raw:?}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymptomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Red-flag identifier (`high_temperature`, `visible_blood`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedFlagKind(String);

impl RedFlagKind {
    pub fn parse(raw: &str) -> Result<Self> {
        normalize_slug(raw)
            .map(RedFlagKind)
            .ok_or_else(|| Error::validation("red_flag_kind", format!("not a red flag id: {raw:?}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RedFlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 639 language code, lowercased (`en`, `ur`, `es`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn parse(raw: &str) -> Result<Self> {
        let code = raw.trim().to_ascii_lowercase();
        let ok = (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_lowercase());
        if !ok {
            return Err(Error::validation(
                "language",
                format!("expected a 2-3 letter code, got {raw:?}"),
            ));
        }
        Ok(LanguageCode(code))
    }

    pub fn english() -> Self {
        LanguageCode("en".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the patient wants the pharmacy to follow up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FollowUpOption {
    PhoneCall,
    InPerson,
    TextMessage,
}

/// How medication reaches the patient when follow-up is by text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOption {
    Pickup,
    Standard,
    NextDay,
    SameDay,
}

/// Lowercase, trim and collapse separators into `_`. `None` if nothing usable remains.
fn normalize_slug(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            'a'..='z' | '0'..='9' => out.push(c),
            'A'..='Z' => out.push(c.to_ascii_lowercase()),
            ' ' | '-' | '_' => {
                if !out.is_empty() && !out.ends_with('_') {
                    out.push('_');
                }
            }
            _ => return None,
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() || out.len() > MAX_SLUG_LEN {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symptom_ids_are_normalised() {
        let a = SymptomKind::parse("Burning Pain").unwrap();
        let b = SymptomKind::parse("burning-pain").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "burning_pain");
    }

    #[test]
    fn symptom_ids_reject_garbage() {
        assert!(SymptomKind::parse("").is_err());
        assert!(SymptomKind::parse("   ").is_err());
        assert!(SymptomKind::parse("pain; drop table").is_err());
        assert!(RedFlagKind::parse(&"x".repeat(MAX_SLUG_LEN + 1)).is_err());
    }

    #[test]
    fn language_codes_are_short_ascii() {
        assert_eq!(LanguageCode::parse(" ES ").unwrap().as_str(), "es");
        assert!(LanguageCode::parse("english").is_err());
        assert!(LanguageCode::parse("e1").is_err());
    }

    #[test]
    fn options_serialise_in_wire_case() {
        let v = serde_json::to_string(&FollowUpOption::TextMessage).unwrap();
        assert_eq!(v, "\"TEXT_MESSAGE\"");
        let d: DeliveryOption = serde_json::from_str("\"SAME_DAY\"").unwrap();
        assert_eq!(d, DeliveryOption::SameDay);
    }
}
