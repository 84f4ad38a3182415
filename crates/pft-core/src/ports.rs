//! Collaborator ports implemented outside the core.
//!
//! The triage path itself never awaits these; the orchestrator calls them once
//! a session reaches a terminal state (or is abandoned).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    domain::SessionId, escalation::EscalationResult, protocol::ConditionId,
    triage::TriageSession, Result,
};

/// Identifier of a persisted consultation record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsultationId(pub String);

impl fmt::Display for ConsultationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acknowledgement from a notification channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAck {
    pub reference: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Patient,
    Assistant,
}

/// One line of the conversation, in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn patient(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Patient,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }
}

/// Persists finalized sessions together with their transcript.
#[async_trait]
pub trait ConsultationSink: Send + Sync {
    async fn persist(
        &self,
        condition: ConditionId,
        session: &TriageSession,
        result: &EscalationResult,
        transcript: &[Turn],
    ) -> Result<ConsultationId>;
}

/// Routes a session to a human pharmacist.
#[async_trait]
pub trait PharmacistNotifier: Send + Sync {
    async fn notify(&self, session_id: &SessionId, reason: &str) -> Result<NotificationAck>;
}
