//! Telegram transport: the webhook endpoint and the outbound client.

use std::collections::HashSet;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, ChatAction, UpdateKind};
use tracing::{debug, info, warn};

use crate::assistant::{Assistant, UserProfile};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Telegram rejects messages longer than 4096 characters.
const MAX_CHUNK_CHARS: usize = 4000;

/// Outbound side of the chat.
pub trait Messenger: Send + Sync {
    fn send_text<'a>(&'a self, chat_id: i64, text: &'a str) -> BoxFuture<'a, Result<(), String>>;

    fn typing(&self, chat_id: i64) -> BoxFuture<'_, ()>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Messenger for TelegramClient {
    fn send_text<'a>(&'a self, chat_id: i64, text: &'a str) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            for chunk in split_message(text, MAX_CHUNK_CHARS) {
                self.bot.send_message(ChatId(chat_id), chunk).await.map_err(|e| {
                    let msg = format!("Failed to send: {e}");
                    warn!("{}", msg);
                    msg
                })?;
            }
            Ok(())
        })
    }

    fn typing(&self, chat_id: i64) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.bot.send_chat_action(ChatId(chat_id), ChatAction::Typing).await {
                debug!("Typing indicator failed: {e}");
            }
        })
    }
}

/// Point Telegram at our webhook.
pub async fn register_webhook(bot: &Bot, url: &str, secret: Option<&str>) -> Result<(), String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid webhook url '{url}': {e}"))?;
    let mut request = bot.set_webhook(parsed).allowed_updates(vec![AllowedUpdate::Message]);
    if let Some(secret) = secret {
        request = request.secret_token(secret.to_string());
    }
    request.await.map_err(|e| format!("setWebhook failed: {e}"))?;
    info!("🔗 Webhook registered at {}", url);
    Ok(())
}

/// Split on line breaks where possible so each piece fits one message.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// `/start`, optionally addressed as `/start@botname`.
fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .is_some_and(|cmd| cmd == "/start" || cmd.starts_with("/start@"))
}

pub struct AppState {
    assistant: Arc<Assistant>,
    messenger: Arc<dyn Messenger>,
    /// Template for every user; `user_id` is filled per message.
    profile: UserProfile,
    /// Empty means any chat.
    allowed_chats: HashSet<ChatId>,
    secret: Option<String>,
}

impl AppState {
    pub fn new(
        assistant: Arc<Assistant>,
        messenger: Arc<dyn Messenger>,
        profile: UserProfile,
        allowed_chats: HashSet<ChatId>,
        secret: Option<String>,
    ) -> Self {
        Self {
            assistant,
            messenger,
            profile,
            allowed_chats,
            secret,
        }
    }

    fn is_allowed(&self, chat_id: ChatId) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }

    fn profile_for(&self, user_id: String) -> UserProfile {
        UserProfile {
            user_id,
            ..self.profile.clone()
        }
    }

    async fn handle_text(&self, chat_id: i64, user_id: String, text: &str) {
        let reply = if is_start_command(text) {
            format!(
                "Hi {}! 👋 I can look at your Strava training, tell you whether to run or rest today, check the weather and manage your calendar. What's up?",
                self.profile.name
            )
        } else {
            self.messenger.typing(chat_id).await;
            self.assistant.respond(text, self.profile_for(user_id)).await
        };

        if let Err(e) = self.messenger.send_text(chat_id, &reply).await {
            warn!("Reply to chat {} not delivered: {}", chat_id, e);
        }
    }
}

pub fn router(state: Arc<AppState>, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Telegram retries anything but 2xx, so every outcome is acknowledged.
async fn webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let ack = Json(json!({ "ok": true }));

    if let Some(ref secret) = state.secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_str()) {
            warn!("Webhook call with wrong secret token ignored");
            return ack;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Malformed update ignored: {}", e);
            return ack;
        }
    };
    let UpdateKind::Message(message) = update.kind else {
        debug!("Update {} without message ignored", update.id.0);
        return ack;
    };

    if !state.is_allowed(message.chat.id) {
        info!("Message from unknown chat {} ignored", message.chat.id.0);
        return ack;
    }
    let chat_id = message.chat.id.0;
    let Some(text) = message.text().map(str::trim).filter(|t| !t.is_empty()).map(str::to_string) else {
        debug!("Non-text message in chat {} ignored", chat_id);
        return ack;
    };
    let user_id = match message.from {
        Some(ref user) => user.id.0.to_string(),
        None => chat_id.to_string(),
    };

    let preview: String = text.chars().take(100).collect();
    info!("📨 Chat {} user {}: \"{}\"", chat_id, user_id, preview);

    // Reply out of band so Telegram is not kept waiting on the model.
    tokio::spawn(async move {
        state.handle_text(chat_id, user_id, &text).await;
    });

    ack
}
