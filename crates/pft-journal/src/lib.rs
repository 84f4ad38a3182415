//! JSON-lines adapters for the consultation and notification ports.
//!
//! Each record is one line appended to a file. Appends go through a per-file
//! async mutex so concurrent sessions never interleave partial lines.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pft_core::{
    domain::SessionId,
    escalation::EscalationResult,
    ports::{ConsultationId, ConsultationSink, NotificationAck, PharmacistNotifier, Turn},
    protocol::ConditionId,
    triage::TriageSession,
    Result,
};
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::{info, warn};
use uuid::Uuid;

const MAX_REASON_LEN: usize = 500;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsultationRecord {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub condition: ConditionId,
    pub session: TriageSession,
    pub result: EscalationResult,
    #[serde(default)]
    pub transcript: Vec<Turn>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub sent_at: DateTime<Utc>,
    pub session_id: SessionId,
    pub reason: String,
}

struct JsonlFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_all<T: for<'de> Deserialize<'de>>(&self) -> Result<Vec<T>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(Into::into))
            .collect()
    }
}

/// Appends finalized consultations to a JSONL file.
pub struct JsonlConsultationStore {
    file: JsonlFile,
}

impl JsonlConsultationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonlFile::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub async fn records(&self) -> Result<Vec<ConsultationRecord>> {
        self.file.read_all().await
    }
}

#[async_trait]
impl ConsultationSink for JsonlConsultationStore {
    async fn persist(
        &self,
        condition: ConditionId,
        session: &TriageSession,
        result: &EscalationResult,
        transcript: &[Turn],
    ) -> Result<ConsultationId> {
        let record = ConsultationRecord {
            id: Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            condition,
            session: session.clone(),
            result: result.clone(),
            transcript: transcript.to_vec(),
        };
        self.file.append(&record).await?;
        info!(
            record = %record.id,
            session = %session.session_id,
            recommendation = ?result.recommendation,
            "consultation recorded"
        );
        Ok(ConsultationId(record.id))
    }
}

/// Pharmacist notifications written to a JSONL queue file and the log.
pub struct JsonlNotifier {
    file: JsonlFile,
}

impl JsonlNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonlFile::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub async fn notifications(&self) -> Result<Vec<NotificationRecord>> {
        self.file.read_all().await
    }
}

#[async_trait]
impl PharmacistNotifier for JsonlNotifier {
    async fn notify(&self, session_id: &SessionId, reason: &str) -> Result<NotificationAck> {
        let record = NotificationRecord {
            id: Uuid::new_v4().to_string(),
            sent_at: Utc::now(),
            session_id: session_id.clone(),
            reason: truncate_text(reason, MAX_REASON_LEN),
        };
        self.file.append(&record).await?;
        warn!(session = %session_id, notification = %record.id, reason = %record.reason, "pharmacist review requested");
        Ok(NotificationAck {
            reference: record.id,
        })
    }
}

fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use pft_core::{escalation::assess, protocol::ProtocolRegistry, triage::State};

    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.jsonl"))
    }

    fn finished_session() -> (TriageSession, EscalationResult) {
        let protocol = ProtocolRegistry::pharmacy_first()
            .get(ConditionId::Impetigo)
            .unwrap();
        let mut session = TriageSession::new(SessionId::from("s-1"), protocol.condition);
        session.state = State::Completed;
        let result = assess(&protocol, &session.symptoms, &session.red_flags);
        session.assessment = Some(result.clone());
        (session, result)
    }

    #[tokio::test]
    async fn consultations_append_and_read_back() {
        let store = JsonlConsultationStore::new(tmp_file("pft-consultations"));
        let (session, result) = finished_session();
        let transcript = [
            Turn::assistant("What is your name and date of birth?"),
            Turn::patient("Jane Doe, 1990-01-01"),
        ];

        let a = store
            .persist(ConditionId::Impetigo, &session, &result, &transcript)
            .await
            .unwrap();
        let b = store
            .persist(ConditionId::Impetigo, &session, &result, &[])
            .await
            .unwrap();
        assert_ne!(a, b);

        let records = store.records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, a.0);
        assert_eq!(records[0].session, session);
        assert_eq!(records[0].transcript, transcript);
        assert_eq!(records[1].result, result);
        assert!(records[1].transcript.is_empty());
        let _ = std::fs::remove_file(store.path());
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let store = JsonlConsultationStore::new(tmp_file("pft-missing"));
        assert!(store.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_notifications_do_not_interleave() {
        let notifier = Arc::new(JsonlNotifier::new(tmp_file("pft-notify")));
        let mut handles = Vec::new();
        for i in 0..20 {
            let n = notifier.clone();
            handles.push(tokio::spawn(async move {
                n.notify(&SessionId(format!("s-{i}")), "red flags present")
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let notes = notifier.notifications().await.unwrap();
        assert_eq!(notes.len(), 20);
        assert!(notes.iter().all(|n| n.reason == "red flags present"));
        let _ = std::fs::remove_file(notifier.path());
    }

    #[tokio::test]
    async fn long_reasons_are_truncated() {
        let notifier = JsonlNotifier::new(tmp_file("pft-notify-long"));
        let ack = notifier
            .notify(&SessionId::from("s"), &"x".repeat(MAX_REASON_LEN + 20))
            .await
            .unwrap();

        let notes = notifier.notifications().await.unwrap();
        assert_eq!(notes[0].id, ack.reference);
        assert_eq!(notes[0].reason.chars().count(), MAX_REASON_LEN + 3);
        assert!(notes[0].reason.ends_with("..."));
        let _ = std::fs::remove_file(notifier.path());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_text("héllo", 2), "hé...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}
