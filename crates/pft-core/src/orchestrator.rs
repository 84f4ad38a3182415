//! Session orchestration: one machine per session, serialised per session.
//!
//! The map lock is only held to find, insert or remove a slot. Each slot has its
//! own async mutex so one session's events are applied in order while other
//! sessions proceed in parallel.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    domain::{LanguageCode, SessionId},
    errors::Error,
    escalation::{EscalationResult, Recommendation},
    extract::Extractor,
    interpreter::{IdentityHints, Interpreter},
    ports::{ConsultationSink, PharmacistNotifier, Turn},
    protocol::ProtocolRegistry,
    triage::{
        prompts::{closing_message, PromptSettings},
        State, Transition, TriageEvent, TriageMachine, TriageSession,
    },
    Result,
};

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub prompts: PromptSettings,
    pub default_language: LanguageCode,
    pub supported_languages: Vec<LanguageCode>,
    pub idle_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            prompts: PromptSettings {
                emergency_number: cfg.emergency_number.clone(),
                booking_url: cfg.booking_url.clone(),
            },
            default_language: cfg.default_language.clone(),
            supported_languages: cfg.supported_languages.clone(),
            idle_timeout: cfg.idle_timeout,
        }
    }

    fn supports(&self, code: &LanguageCode) -> bool {
        self.supported_languages.contains(code)
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            prompts: PromptSettings::default(),
            default_language: LanguageCode::english(),
            supported_languages: ["en", "ur", "es"]
                .iter()
                .filter_map(|c| LanguageCode::parse(c).ok())
                .collect(),
            idle_timeout: Duration::from_secs(900),
        }
    }
}

/// What to say back to the patient after an utterance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: Option<String>,
    pub state: State,
    pub complete: bool,
}

struct SessionSlot {
    machine: TriageMachine,
    hints: IdentityHints,
    last_activity: Instant,
    /// Free-text exchanges only; structured events are not echoed here.
    transcript: Vec<Turn>,
    /// Set once the session has been persisted; later events are no-ops.
    finalized: bool,
}

impl SessionSlot {
    fn new(machine: TriageMachine) -> Self {
        Self {
            machine,
            hints: IdentityHints::default(),
            last_activity: Instant::now(),
            transcript: Vec::new(),
            finalized: false,
        }
    }
}

pub struct SessionOrchestrator {
    registry: Arc<ProtocolRegistry>,
    interpreter: Interpreter,
    sink: Arc<dyn ConsultationSink>,
    notifier: Arc<dyn PharmacistNotifier>,
    settings: OrchestratorSettings,
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<SessionSlot>>>>,
}

impl SessionOrchestrator {
    pub fn new(
        registry: Arc<ProtocolRegistry>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn ConsultationSink>,
        notifier: Arc<dyn PharmacistNotifier>,
        settings: OrchestratorSettings,
    ) -> Self {
        let interpreter = Interpreter::new(extractor, settings.default_language.clone());
        Self {
            registry,
            interpreter,
            sink,
            notifier,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Creates a session and returns the greeting.
    pub async fn start(&self, session_id: SessionId, condition: &str) -> Result<Reply> {
        let protocol = match self.registry.lookup(condition) {
            Ok(p) => p,
            Err(err) => {
                self.report(&session_id, &format!("triage could not start: {err}"))
                    .await;
                return Err(err);
            }
        };

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session_id) {
            return Err(Error::SessionExists(session_id));
        }

        let mut machine = TriageMachine::new(session_id.clone(), protocol);
        if self.settings.default_language != LanguageCode::english() {
            machine.process_event(TriageEvent::LanguageDetected(
                self.settings.default_language.clone(),
            ))?;
        }
        let greeting = machine.next_prompt();
        let transition = machine.process_event(TriageEvent::StartTriage)?;

        let mut slot = SessionSlot::new(machine);
        slot.transcript.extend(greeting.clone().map(Turn::assistant));
        sessions.insert(session_id.clone(), Arc::new(Mutex::new(slot)));
        info!(session = %session_id, condition = %condition, "triage started");

        Ok(Reply {
            text: greeting,
            state: transition.to,
            complete: false,
        })
    }

    /// Applies one structured event.
    pub async fn deliver(&self, session_id: &SessionId, event: TriageEvent) -> Result<Transition> {
        let slot = self.slot(session_id).await?;
        let mut slot = slot.lock().await;
        if slot.finalized {
            return Err(Error::SessionNotFound(session_id.clone()));
        }
        slot.last_activity = Instant::now();

        if let TriageEvent::LanguageDetected(code) = &event {
            if !self.settings.supports(code) {
                let err = Error::validation("language", format!("unsupported language: {code}"));
                self.report(session_id, &format!("rejected event: {err}")).await;
                return Err(err);
            }
        }

        let transition = match slot.machine.process_event(event) {
            Ok(t) => t,
            Err(err) => {
                self.report(session_id, &format!("rejected event: {err}")).await;
                return Err(err);
            }
        };

        if transition.to.is_terminal() {
            self.finalize(session_id, &mut slot).await;
        }
        Ok(transition)
    }

    /// Interprets free text, applies the resulting events and returns the reply.
    pub async fn handle_utterance(&self, session_id: &SessionId, text: &str) -> Result<Reply> {
        let slot = self.slot(session_id).await?;
        let mut guard = slot.lock().await;
        let slot = &mut *guard;
        // Lost the race to an abandon or sweep.
        if slot.finalized {
            return Err(Error::SessionNotFound(session_id.clone()));
        }
        slot.last_activity = Instant::now();
        slot.transcript.push(Turn::patient(text));

        let events = self.interpreter.interpret(
            text,
            slot.machine.context(),
            slot.machine.protocol(),
            &mut slot.hints,
        );
        debug!(session = %session_id, events = events.len(), "utterance interpreted");

        for event in events {
            if let TriageEvent::LanguageDetected(code) = &event {
                if !self.settings.supports(code) {
                    debug!(session = %session_id, language = %code, "unsupported language ignored");
                    continue;
                }
            }
            if let Err(err) = slot.machine.process_event(event) {
                self.report(session_id, &format!("rejected event: {err}")).await;
                return Err(err);
            }
            if slot.machine.is_complete() {
                break;
            }
        }

        let complete = slot.machine.is_complete();
        let text = if complete {
            closing_message(slot.machine.context(), &self.settings.prompts)
        } else {
            slot.machine.next_prompt()
        };
        slot.transcript.extend(text.clone().map(Turn::assistant));
        if complete {
            self.finalize(session_id, slot).await;
        }

        Ok(Reply {
            text,
            state: slot.machine.state(),
            complete,
        })
    }

    pub async fn snapshot(&self, session_id: &SessionId) -> Result<TriageSession> {
        let slot = self.slot(session_id).await?;
        let slot = slot.lock().await;
        if slot.finalized {
            return Err(Error::SessionNotFound(session_id.clone()));
        }
        Ok(slot.machine.context().clone())
    }

    /// Ends a session the patient walked away from.
    ///
    /// A session that never finished is recorded as ESCALATE and handed to a
    /// pharmacist. Returns `None` if the session had already finished.
    pub async fn abandon(&self, session_id: &SessionId) -> Result<Option<EscalationResult>> {
        self.abandon_if(session_id, |_| true).await
    }

    /// Abandons every session idle for at least the configured timeout.
    pub async fn sweep_idle(&self, now: Instant) -> Vec<SessionId> {
        let timeout = self.settings.idle_timeout;
        let candidates: Vec<SessionId> = self.sessions.lock().await.keys().cloned().collect();

        let mut abandoned = Vec::new();
        for id in candidates {
            let idle = |slot: &SessionSlot| now.saturating_duration_since(slot.last_activity) >= timeout;
            match self.abandon_if(&id, idle).await {
                Ok(Some(_)) => abandoned.push(id),
                Ok(None) | Err(Error::SessionNotFound(_)) => {}
                Err(err) => warn!(session = %id, error = %err, "idle sweep failed"),
            }
        }
        abandoned
    }

    /// Sweeps idle sessions every `every` until `cancel` fires.
    pub fn spawn_idle_sweeper(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let swept = this.sweep_idle(Instant::now()).await;
                        if !swept.is_empty() {
                            info!(count = swept.len(), "abandoned idle sessions");
                        }
                    }
                }
            }
            debug!("idle sweeper stopped");
        })
    }

    async fn slot(&self, session_id: &SessionId) -> Result<Arc<Mutex<SessionSlot>>> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.clone()))
    }

    async fn abandon_if(
        &self,
        session_id: &SessionId,
        pred: impl FnOnce(&SessionSlot) -> bool,
    ) -> Result<Option<EscalationResult>> {
        let slot = self.slot(session_id).await?;
        let mut slot = slot.lock().await;
        if slot.finalized || !pred(&slot) {
            return Ok(None);
        }
        slot.finalized = true;
        self.sessions.lock().await.remove(session_id);

        let session = slot.machine.context();
        if session.state.is_terminal() {
            return Ok(None);
        }

        let partial = slot.machine.assessment();
        let result = EscalationResult {
            suitable_for_treatment: false,
            red_flags: partial.red_flags,
            recommendation: Recommendation::Escalate,
            reasoning: format!(
                "session abandoned in {} before completion; {}",
                session.state, partial.reasoning
            ),
        };
        warn!(session = %session_id, state = %session.state, "session abandoned");

        self.persist(session_id, session, &result, &slot.transcript)
            .await;
        self.report(session_id, &result.reasoning).await;
        Ok(Some(result))
    }

    async fn finalize(&self, session_id: &SessionId, slot: &mut SessionSlot) {
        if slot.finalized {
            return;
        }
        slot.finalized = true;
        self.sessions.lock().await.remove(session_id);

        let session = slot.machine.context();
        let result = slot.machine.assessment();
        info!(
            session = %session_id,
            state = %session.state,
            recommendation = ?result.recommendation,
            "finalizing session"
        );

        self.persist(session_id, session, &result, &slot.transcript)
            .await;
        if slot.machine.needs_pharmacist_review() || result.recommendation != Recommendation::Treat {
            let reason = format!(
                "{} ended in {} with {:?}: {}",
                session.condition, session.state, result.recommendation, result.reasoning
            );
            self.report(session_id, &reason).await;
        }
    }

    async fn persist(
        &self,
        session_id: &SessionId,
        session: &TriageSession,
        result: &EscalationResult,
        transcript: &[Turn],
    ) {
        match self
            .sink
            .persist(session.condition, session, result, transcript)
            .await
        {
            Ok(record) => debug!(session = %session_id, record = %record, "consultation persisted"),
            Err(err) => {
                error!(session = %session_id, error = %err, "failed to persist consultation");
                self.report(session_id, &format!("consultation could not be saved: {err}"))
                    .await;
            }
        }
    }

    async fn report(&self, session_id: &SessionId, reason: &str) {
        match self.notifier.notify(session_id, reason).await {
            Ok(ack) => debug!(session = %session_id, reference = %ack.reference, "pharmacist notified"),
            Err(err) => error!(session = %session_id, error = %err, reason, "pharmacist notification failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        extract::KeywordExtractor,
        ports::{ConsultationId, NotificationAck},
        protocol::ConditionId,
    };

    #[derive(Default)]
    struct FakeSink {
        fail: bool,
        records: StdMutex<Vec<(ConditionId, TriageSession, EscalationResult)>>,
        transcripts: StdMutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl ConsultationSink for FakeSink {
        async fn persist(
            &self,
            condition: ConditionId,
            session: &TriageSession,
            result: &EscalationResult,
            transcript: &[Turn],
        ) -> Result<ConsultationId> {
            if self.fail {
                return Err(Error::External("disk full".to_string()));
            }
            self.transcripts.lock().unwrap().push(transcript.to_vec());
            let mut records = self.records.lock().unwrap();
            records.push((condition, session.clone(), result.clone()));
            Ok(ConsultationId(format!("rec-{}", records.len())))
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        notes: StdMutex<Vec<(SessionId, String)>>,
    }

    impl FakeNotifier {
        fn notes(&self) -> Vec<(SessionId, String)> {
            self.notes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PharmacistNotifier for FakeNotifier {
        async fn notify(&self, session_id: &SessionId, reason: &str) -> Result<NotificationAck> {
            self.notes
                .lock()
                .unwrap()
                .push((session_id.clone(), reason.to_string()));
            Ok(NotificationAck {
                reference: "n-1".to_string(),
            })
        }
    }

    fn orchestrator_with(
        sink: Arc<FakeSink>,
        notifier: Arc<FakeNotifier>,
        settings: OrchestratorSettings,
    ) -> SessionOrchestrator {
        let registry = Arc::new(ProtocolRegistry::pharmacy_first());
        let extractor = Arc::new(KeywordExtractor::new(&registry));
        SessionOrchestrator::new(registry, extractor, sink, notifier, settings)
    }

    fn orchestrator() -> (SessionOrchestrator, Arc<FakeSink>, Arc<FakeNotifier>) {
        let sink = Arc::new(FakeSink::default());
        let notifier = Arc::new(FakeNotifier::default());
        let orch = orchestrator_with(sink.clone(), notifier.clone(), OrchestratorSettings::default());
        (orch, sink, notifier)
    }

    fn sid(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[tokio::test]
    async fn conversation_to_treatment() {
        let (orch, sink, notifier) = orchestrator();
        let id = sid("call-1");

        let greeting = orch.start(id.clone(), "uti").await.unwrap();
        assert_eq!(greeting.state, State::IdentityVerification);
        assert!(greeting.text.unwrap().contains("Pharmacy First"));

        let steps = [
            ("my name is Jane Doe, born 1990-01-01", State::SymptomAssessment),
            ("It burns and I'm going more often, that's all", State::RedFlagCheck),
            ("no", State::FollowUpSelection),
            ("a phone call please", State::Confirmation),
        ];
        for (text, expected) in steps {
            let reply = orch.handle_utterance(&id, text).await.unwrap();
            assert_eq!(reply.state, expected, "after {text:?}");
            assert!(reply.text.is_some());
        }

        let done = orch.handle_utterance(&id, "yes").await.unwrap();
        assert!(done.complete);
        assert_eq!(done.state, State::Completed);
        assert!(done.text.unwrap().starts_with("Thanks, Jane Doe."));

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, ConditionId::UncomplicatedUti);
        assert_eq!(records[0].2.recommendation, Recommendation::Treat);
        assert!(notifier.notes().is_empty());
        assert_eq!(orch.active_sessions().await, 0);

        let transcript = &sink.transcripts.lock().unwrap()[0];
        assert_eq!(transcript.len(), 11);
        assert_eq!(transcript[0].speaker, crate::ports::Speaker::Assistant);
        assert_eq!(transcript[1], Turn::patient("my name is Jane Doe, born 1990-01-01"));
        assert_eq!(transcript[9], Turn::patient("yes"));
        assert!(transcript[10].text.starts_with("Thanks, Jane Doe."));
    }

    #[tokio::test]
    async fn red_flag_escalates_and_notifies() {
        let (orch, sink, notifier) = orchestrator();
        let id = sid("call-2");
        orch.start(id.clone(), "uncomplicated_uti").await.unwrap();
        orch.handle_utterance(&id, "I'm Sam Smith, 1985-06-15")
            .await
            .unwrap();

        let reply = orch
            .handle_utterance(&id, "there's blood in my urine")
            .await
            .unwrap();
        assert!(reply.complete);
        assert_eq!(reply.state, State::Escalated);
        assert!(reply.text.unwrap().contains("call 111"));

        assert_eq!(
            sink.records.lock().unwrap()[0].2.recommendation,
            Recommendation::Escalate
        );
        let notes = notifier.notes();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].1.contains("visible_blood"), "{}", notes[0].1);
        assert!(matches!(
            orch.snapshot(&id).await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn ambiguous_symptoms_complete_but_are_reviewed() {
        let (orch, sink, notifier) = orchestrator();
        let id = sid("call-3");
        orch.start(id.clone(), "uti").await.unwrap();
        for ev in [
            TriageEvent::identity_verified("Jane Doe", "1990-01-01", None).unwrap(),
            TriageEvent::symptom_recorded("urgency").unwrap(),
            TriageEvent::SymptomsComplete,
            TriageEvent::NoRedFlags,
            TriageEvent::FollowUpSelected(crate::domain::FollowUpOption::InPerson),
            TriageEvent::Confirmed,
        ] {
            orch.deliver(&id, ev).await.unwrap();
        }

        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].1.state, State::Completed);
        assert_eq!(records[0].2.recommendation, Recommendation::Escalate);
        assert_eq!(notifier.notes().len(), 1);
    }

    #[tokio::test]
    async fn unknown_condition_is_reported() {
        let (orch, _, notifier) = orchestrator();
        let err = orch.start(sid("x"), "broken_leg").await.unwrap_err();
        assert!(matches!(err, Error::UnknownCondition(_)));
        assert_eq!(notifier.notes().len(), 1);
        assert_eq!(orch.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected() {
        let (orch, _, _) = orchestrator();
        orch.start(sid("dup"), "shingles").await.unwrap();
        let err = orch.start(sid("dup"), "shingles").await.unwrap_err();
        assert!(matches!(err, Error::SessionExists(_)));
    }

    #[tokio::test]
    async fn validation_errors_leave_the_session_untouched() {
        let (orch, _, notifier) = orchestrator();
        let id = sid("v");
        orch.start(id.clone(), "uti").await.unwrap();
        orch.deliver(
            &id,
            TriageEvent::identity_verified("Jane Doe", "1990-01-01", None).unwrap(),
        )
        .await
        .unwrap();
        let before = orch.snapshot(&id).await.unwrap();

        let err = orch
            .deliver(&id, TriageEvent::symptom_recorded("ear_pain").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(orch.snapshot(&id).await.unwrap(), before);
        assert_eq!(notifier.notes().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected_or_ignored() {
        let sink = Arc::new(FakeSink::default());
        let notifier = Arc::new(FakeNotifier::default());
        let settings = OrchestratorSettings {
            supported_languages: vec![LanguageCode::english()],
            ..OrchestratorSettings::default()
        };
        let orch = orchestrator_with(sink, notifier, settings);
        let id = sid("lang");
        orch.start(id.clone(), "uti").await.unwrap();

        let err = orch
            .deliver(&id, TriageEvent::language_detected("es").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let reply = orch.handle_utterance(&id, "hola").await.unwrap();
        assert_eq!(reply.state, State::IdentityVerification);
        assert_eq!(orch.snapshot(&id).await.unwrap().language, None);
    }

    #[tokio::test]
    async fn detected_language_switches_prompts() {
        let (orch, _, _) = orchestrator();
        let id = sid("es");
        orch.start(id.clone(), "uti").await.unwrap();
        let reply = orch.handle_utterance(&id, "hola, buenos días").await.unwrap();
        assert!(reply.text.unwrap().starts_with("No he entendido"));
    }

    #[tokio::test]
    async fn abandon_escalates_unfinished_sessions() {
        let (orch, sink, notifier) = orchestrator();
        let id = sid("gone");
        orch.start(id.clone(), "impetigo").await.unwrap();
        orch.handle_utterance(&id, "hang on").await.unwrap();

        let result = orch.abandon(&id).await.unwrap().unwrap();
        assert_eq!(result.recommendation, Recommendation::Escalate);
        assert!(result.reasoning.starts_with("session abandoned in IDENTITY_VERIFICATION"));
        assert_eq!(sink.records.lock().unwrap().len(), 1);
        let transcript = &sink.transcripts.lock().unwrap()[0];
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1], Turn::patient("hang on"));
        assert_eq!(notifier.notes().len(), 1);
        assert!(matches!(
            orch.abandon(&id).await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn calls_queued_behind_an_abandon_see_the_session_gone() {
        let (orch, sink, _) = orchestrator();
        let orch = Arc::new(orch);
        let id = sid("race");
        orch.start(id.clone(), "uti").await.unwrap();

        let slot = orch.slot(&id).await.unwrap();
        let guard = slot.lock().await;

        let abandon = tokio::spawn({
            let (orch, id) = (orch.clone(), id.clone());
            async move { orch.abandon(&id).await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let utterance = tokio::spawn({
            let (orch, id) = (orch.clone(), id.clone());
            async move { orch.handle_utterance(&id, "my name is Jane Doe, born 1990-01-01").await }
        });
        let event = tokio::spawn({
            let (orch, id) = (orch.clone(), id.clone());
            async move { orch.deliver(&id, TriageEvent::IdentityFailed).await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        drop(guard);

        let abandoned = abandon.await.unwrap().unwrap().unwrap();
        assert_eq!(abandoned.recommendation, Recommendation::Escalate);
        assert!(matches!(
            utterance.await.unwrap(),
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            event.await.unwrap(),
            Err(Error::SessionNotFound(_))
        ));
        assert_eq!(sink.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_only_takes_idle_sessions() {
        let (orch, sink, _) = orchestrator();
        orch.start(sid("a"), "uti").await.unwrap();
        orch.start(sid("b"), "uti").await.unwrap();

        assert!(orch.sweep_idle(Instant::now()).await.is_empty());

        let later = Instant::now() + Duration::from_secs(901);
        let mut swept = orch.sweep_idle(later).await;
        swept.sort();
        assert_eq!(swept, vec![sid("a"), sid("b")]);
        assert_eq!(sink.records.lock().unwrap().len(), 2);
        assert_eq!(orch.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn sweeper_runs_until_cancelled() {
        let sink = Arc::new(FakeSink::default());
        let notifier = Arc::new(FakeNotifier::default());
        let settings = OrchestratorSettings {
            idle_timeout: Duration::from_millis(20),
            ..OrchestratorSettings::default()
        };
        let orch = Arc::new(orchestrator_with(sink.clone(), notifier, settings));
        orch.start(sid("idle"), "uti").await.unwrap();

        let cancel = CancellationToken::new();
        let handle = orch.spawn_idle_sweeper(Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.records.lock().unwrap().len(), 1);
        assert_eq!(orch.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn persistence_failure_still_reaches_a_pharmacist() {
        let sink = Arc::new(FakeSink {
            fail: true,
            ..FakeSink::default()
        });
        let notifier = Arc::new(FakeNotifier::default());
        let orch = orchestrator_with(sink, notifier.clone(), OrchestratorSettings::default());
        let id = sid("f");
        orch.start(id.clone(), "uti").await.unwrap();

        let t = orch
            .deliver(&id, TriageEvent::red_flag_detected("confusion").unwrap())
            .await
            .unwrap();
        assert_eq!(t.to, State::Escalated);

        let notes = notifier.notes();
        assert_eq!(notes.len(), 2);
        assert!(notes[0].1.starts_with("consultation could not be saved"));
    }
}
