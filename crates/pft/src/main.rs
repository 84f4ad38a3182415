//! Console channel: one triage session over stdin/stdout.
//!
//! Lines starting with `{` are taken as structured events
//! (`{"type": "SYMPTOM_RECORDED", "symptom_kind": "frequency"}`); anything else
//! is treated as something the patient said.

use std::sync::Arc;

use anyhow::Context;
use pft_core::{
    config::Config,
    domain::SessionId,
    errors::Error,
    extract::KeywordExtractor,
    orchestrator::{OrchestratorSettings, Reply, SessionOrchestrator},
    protocol::ProtocolRegistry,
    triage::{
        prompts::{closing_message, next_prompt},
        TriageEvent,
    },
};
use pft_journal::{JsonlConsultationStore, JsonlNotifier};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pft_core::logging::init("pft")?;

    let cfg = Config::load()?;
    let condition = std::env::args()
        .nth(1)
        .unwrap_or_else(|| cfg.default_condition.as_str().to_string());

    let registry = Arc::new(ProtocolRegistry::pharmacy_first());
    let protocol = registry
        .lookup(&condition)
        .with_context(|| format!("cannot triage '{condition}'"))?;
    let extractor = Arc::new(KeywordExtractor::new(&registry));
    let store = Arc::new(JsonlConsultationStore::new(cfg.consultation_log_path.clone()));
    let notifier = Arc::new(JsonlNotifier::new(cfg.notification_log_path.clone()));
    let settings = OrchestratorSettings::from_config(&cfg);
    let prompt_settings = settings.prompts.clone();

    let orchestrator = Arc::new(SessionOrchestrator::new(
        registry.clone(),
        extractor,
        store,
        notifier,
        settings,
    ));
    let cancel = CancellationToken::new();
    let sweeper = orchestrator.spawn_idle_sweeper(cfg.sweep_interval, cancel.clone());

    let session_id = SessionId(format!("console-{}", std::process::id()));
    info!(session = %session_id, condition = %protocol.condition, "console session");
    let greeting = orchestrator.start(session_id.clone(), &condition).await?;
    print_reply(&greeting);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut finished = false;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = if line.starts_with('{') {
            let result = match TriageEvent::from_json(line) {
                Ok(event) => orchestrator.deliver(&session_id, event).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(t) => Reply {
                    text: if t.to.is_terminal() {
                        closing_message(&t.session, &prompt_settings)
                    } else {
                        next_prompt(&t.session, &protocol)
                    },
                    state: t.to,
                    complete: t.to.is_terminal(),
                },
                Err(Error::SessionNotFound(_)) => {
                    println!("This session has timed out; a pharmacist will follow up.");
                    finished = true;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "event rejected");
                    println!("(rejected: {e})");
                    continue;
                }
            }
        } else {
            match orchestrator.handle_utterance(&session_id, line).await {
                Ok(r) => r,
                Err(Error::SessionNotFound(_)) => {
                    println!("This session has timed out; a pharmacist will follow up.");
                    finished = true;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "utterance rejected");
                    println!("(rejected: {e})");
                    continue;
                }
            }
        };

        print_reply(&reply);
        if reply.complete {
            finished = true;
            break;
        }
    }

    if !finished {
        // Input closed mid-conversation.
        match orchestrator.abandon(&session_id).await {
            Ok(Some(result)) => println!(
                "Session ended early; a pharmacist will follow up. ({})",
                result.reasoning
            ),
            Ok(None) | Err(Error::SessionNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    cancel.cancel();
    sweeper.await.context("idle sweeper panicked")?;
    Ok(())
}

fn print_reply(reply: &Reply) {
    if let Some(text) = &reply.text {
        println!("{text}");
    }
}
