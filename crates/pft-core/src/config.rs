use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::LanguageCode, errors::Error, protocol::ConditionId, Result};

pub const NHS_PHARMACY_FIRST_URL: &str =
    "https://www.nhs.uk/nhs-services/prescriptions-and-pharmacies/pharmacy-first/";

const DEFAULT_SUPPORTED_LANGUAGES: &str = "en,ur,es,fr,de,it,pt,ar,hi,bn,pa,pl,ro";

/// Typed configuration for the triage service.
#[derive(Clone, Debug)]
pub struct Config {
    // Conversation
    pub default_condition: ConditionId,
    pub default_language: LanguageCode,
    pub supported_languages: Vec<LanguageCode>,

    // Outputs
    pub consultation_log_path: PathBuf,
    pub notification_log_path: PathBuf,

    // Patient-facing text
    pub booking_url: Option<String>,
    pub emergency_number: String,

    // Session lifecycle
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default_condition = get("PFT_DEFAULT_CONDITION")
            .and_then(non_empty)
            .unwrap_or_else(|| ConditionId::UncomplicatedUti.as_str().to_string());
        let default_condition = default_condition.parse::<ConditionId>().map_err(|_| {
            Error::Config(format!(
                "PFT_DEFAULT_CONDITION: unknown condition '{default_condition}'"
            ))
        })?;

        let default_language = get("PFT_DEFAULT_LANGUAGE")
            .and_then(|s| LanguageCode::parse(&s).ok())
            .unwrap_or_else(LanguageCode::english);

        let supported_languages = parse_csv_languages(
            get("PFT_SUPPORTED_LANGUAGES").or_else(|| Some(DEFAULT_SUPPORTED_LANGUAGES.to_string())),
        );
        if supported_languages.is_empty() {
            return Err(Error::Config(
                "PFT_SUPPORTED_LANGUAGES must name at least one language".to_string(),
            ));
        }

        let consultation_log_path = get("PFT_CONSULTATION_LOG")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp/pharmacy-first-consultations.jsonl"));
        let notification_log_path = get("PFT_NOTIFICATION_LOG")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp/pharmacy-first-notifications.jsonl"));

        // Empty string disables the link.
        let booking_url = match get("PFT_BOOKING_URL") {
            Some(v) => non_empty(v),
            None => Some(NHS_PHARMACY_FIRST_URL.to_string()),
        };
        let emergency_number = get("PFT_EMERGENCY_NUMBER")
            .and_then(non_empty)
            .unwrap_or_else(|| "111".to_string());

        let idle_timeout = Duration::from_secs(
            parse_u64(get("PFT_IDLE_TIMEOUT_SECS"))
                .filter(|s| *s > 0)
                .unwrap_or(900),
        );
        let sweep_interval = Duration::from_secs(
            parse_u64(get("PFT_SWEEP_INTERVAL_SECS"))
                .filter(|s| *s > 0)
                .unwrap_or(60),
        );

        Ok(Self {
            default_condition,
            default_language,
            supported_languages,
            consultation_log_path,
            notification_log_path,
            booking_url,
            emergency_number,
            idle_timeout,
            sweep_interval,
        })
    }

    pub fn supports_language(&self, code: &LanguageCode) -> bool {
        self.supported_languages.contains(code)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Copies `.env` entries into the process environment. Variables that are
/// already set win.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in contents.lines().filter_map(parse_dotenv_line) {
        if env::var_os(key).is_none() {
            env::set_var(key, value);
        }
    }
}

/// `KEY=value`, `export KEY=value`, with optional matching quotes around the
/// value. Blank lines and `#` comments yield `None`.
fn parse_dotenv_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }

    let value = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q)?.strip_suffix(*q));
    Some((key, unquoted.unwrap_or(value)))
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv_languages(v: Option<String>) -> Vec<LanguageCode> {
    let mut out: Vec<LanguageCode> = Vec::new();
    for code in v
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| LanguageCode::parse(s).ok())
    {
        if !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
