//! Conversational memory survives a restart when backed by a database file.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use runmate::assistant::{Assistant, AssistantSettings, Services, UserProfile, prompts};
use runmate::integrations::{Disconnected, OpenMeteoClient};
use runmate::llm::{LanguageModel, LlmError, Prompt};
use runmate::memory::SqliteMemory;

/// Routes everything to the general assistant and records what it was asked.
#[derive(Default)]
struct RecordingLlm {
    general_inputs: Mutex<Vec<String>>,
}

impl LanguageModel for RecordingLlm {
    fn generate(&self, prompt: Prompt) -> BoxFuture<'_, Result<String, LlmError>> {
        Box::pin(async move {
            if prompt.system.starts_with(prompts::ROUTER) {
                return Ok(r#"{"appropriate_node":"GeneralAssistant"}"#.to_string());
            }
            if prompt.system.starts_with(prompts::GENERAL) {
                self.general_inputs.lock().unwrap().push(prompt.user.clone());
                return Ok("Got it, your long run is on Sundays.".to_string());
            }
            Err(LlmError::Empty)
        })
    }
}

fn user() -> UserProfile {
    UserProfile {
        user_id: "1001".into(),
        name: "Rohan".into(),
        email: None,
        home_city: None,
        interests: Vec::new(),
        timezone: chrono_tz::UTC,
    }
}

fn assistant(llm: Arc<RecordingLlm>, db: &std::path::Path) -> Assistant {
    let services = Services {
        llm,
        fitness: Arc::new(Disconnected("strava")),
        weather: Arc::new(OpenMeteoClient::new()),
        calendar: Arc::new(Disconnected("google")),
        memory: Arc::new(SqliteMemory::open(db).unwrap()),
    };
    Assistant::new(services, AssistantSettings::default()).unwrap()
}

#[tokio::test]
async fn test_exchange_recalled_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("memory.db");
    let llm = Arc::new(RecordingLlm::default());

    {
        let first = assistant(llm.clone(), &db);
        let reply = first.respond("I always do my long run on Sunday mornings", user()).await;
        assert_eq!(reply, "Got it, your long run is on Sundays.");
    }

    let second = assistant(llm.clone(), &db);
    second.respond("When should I schedule my long run?", user()).await;

    let inputs = llm.general_inputs.lock().unwrap();
    assert_eq!(inputs.len(), 2);
    assert!(inputs[1].contains("Relevant earlier conversation"));
    assert!(inputs[1].contains("Sunday mornings"));
}

#[tokio::test]
async fn test_memories_are_not_shared_between_users() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("memory.db");
    let llm = Arc::new(RecordingLlm::default());
    let bot = assistant(llm.clone(), &db);

    bot.respond("My long run route goes past the river", user()).await;
    let mut other = user();
    other.user_id = "2002".into();
    bot.respond("Where does my long run route go?", other).await;

    let inputs = llm.general_inputs.lock().unwrap();
    assert!(!inputs[1].contains("river"));
}
