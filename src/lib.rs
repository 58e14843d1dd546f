//! runmate - a Telegram personal assistant for runners.
//!
//! Each message runs through a small workflow of specialist steps (fitness,
//! recovery, weather, calendar, general questions) backed by Gemini, Strava,
//! Open-Meteo and Google Calendar, with conversational memory in SQLite.

pub mod assistant;
pub mod config;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod retry;
pub mod telegram;
pub mod telegram_log;
pub mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use assistant::Services;
use config::Config;
use integrations::oauth::OAuthProvider;
use integrations::{
    CalendarProvider, Disconnected, FitnessProvider, GoogleCalendarClient, OAuthApp, OpenMeteoClient, ProviderError,
    StravaClient, TokenStore,
};
use llm::GeminiClient;
use memory::{MemoryError, SqliteMemory};

/// Errors while wiring services at startup.
#[derive(Debug)]
pub enum StartupError {
    Io(std::io::Error),
    Tokens(ProviderError),
    Memory(MemoryError),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Io(e) => write!(f, "data directory: {e}"),
            StartupError::Tokens(e) => write!(f, "token store: {e}"),
            StartupError::Memory(e) => write!(f, "memory store: {e}"),
        }
    }
}

impl std::error::Error for StartupError {}

pub fn token_db_path(config: &Config) -> PathBuf {
    config.data_dir.join("runmate.db")
}

pub fn open_token_store(config: &Config) -> Result<Arc<TokenStore>, StartupError> {
    std::fs::create_dir_all(&config.data_dir).map_err(StartupError::Io)?;
    let store = TokenStore::open(&token_db_path(config)).map_err(StartupError::Tokens)?;
    Ok(Arc::new(store))
}

/// OAuth app for `provider`, if its credentials are configured.
pub fn oauth_app(config: &Config, provider: OAuthProvider, tokens: Arc<TokenStore>) -> Option<OAuthApp> {
    let credentials = match provider {
        OAuthProvider::Strava => config.strava.clone(),
        OAuthProvider::Google => config.google.as_ref().map(|g| g.credentials.clone()),
    }?;
    Some(OAuthApp::new(provider, credentials, tokens, config.retry.clone()))
}

/// Concrete clients for every capability the assistant uses.
pub fn build_services(config: &Config) -> Result<Services, StartupError> {
    let tokens = open_token_store(config)?;
    let memory = SqliteMemory::open(&config.data_dir.join("memory.db")).map_err(StartupError::Memory)?;

    let fitness: Arc<dyn FitnessProvider> = match oauth_app(config, OAuthProvider::Strava, tokens.clone()) {
        Some(app) => Arc::new(StravaClient::new(app)),
        None => {
            info!("Strava not configured");
            Arc::new(Disconnected("strava"))
        }
    };
    let calendar: Arc<dyn CalendarProvider> = match (
        oauth_app(config, OAuthProvider::Google, tokens),
        config.google.as_ref(),
    ) {
        (Some(app), Some(google)) => Arc::new(GoogleCalendarClient::new(
            app,
            google.calendar_id.clone(),
            config.timezone.name().to_string(),
        )),
        _ => {
            info!("Google Calendar not configured");
            Arc::new(Disconnected("google"))
        }
    };

    Ok(Services {
        llm: Arc::new(GeminiClient::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.retry.clone(),
        )),
        fitness,
        weather: Arc::new(OpenMeteoClient::new()),
        calendar,
        memory: Arc::new(memory),
    })
}
