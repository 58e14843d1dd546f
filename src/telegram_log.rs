//! Forwards problems to an operator chat: errors at once, warnings in batches.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

const FLUSH_INTERVAL: Duration = Duration::from_secs(30);
const MAX_BATCH: usize = 20;
const MAX_MESSAGE_CHARS: usize = 4000;

/// Log message with priority.
#[derive(Debug, PartialEq)]
enum LogMessage {
    /// ERROR - send immediately
    Urgent(String),
    /// WARN - batch and send periodically
    Batched(String),
}

fn classify(level: Level, message: String) -> Option<LogMessage> {
    match level {
        Level::ERROR => Some(LogMessage::Urgent(format!("❌ {message}"))),
        Level::WARN => Some(LogMessage::Batched(format!("⚠️ {message}"))),
        _ => None,
    }
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl TelegramLogLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogMessage>();

        tokio::spawn(async move {
            let mut warn_buffer: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(LogMessage::Urgent(text)) => {
                                send_log(&bot, chat_id, &text).await;
                            }
                            Some(LogMessage::Batched(text)) => {
                                warn_buffer.push(text);
                                if warn_buffer.len() >= MAX_BATCH {
                                    flush_buffer(&bot, chat_id, &mut warn_buffer).await;
                                }
                            }
                            None => {
                                flush_buffer(&bot, chat_id, &mut warn_buffer).await;
                                break;
                            }
                        }
                    }
                    _ = interval.tick() => {
                        flush_buffer(&bot, chat_id, &mut warn_buffer).await;
                    }
                }
            }
        });

        Self { tx }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE_CHARS {
        let truncated: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

async fn send_log(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, truncate(text)).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

async fn flush_buffer(bot: &Bot, chat_id: ChatId, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let combined = buffer.join("\n");
    buffer.clear();
    send_log(bot, chat_id, &combined).await;
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        if let Some(msg) = classify(level, visitor.message)
            && self.tx.send(msg).is_err()
        {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_urgent_warnings_batched() {
        assert_eq!(
            classify(Level::ERROR, "run failed".into()),
            Some(LogMessage::Urgent("❌ run failed".into()))
        );
        assert_eq!(
            classify(Level::WARN, "retrying".into()),
            Some(LogMessage::Batched("⚠️ retrying".into()))
        );
        assert_eq!(classify(Level::INFO, "hello".into()), None);
    }

    #[test]
    fn test_truncate_long_logs() {
        let long = "x".repeat(MAX_MESSAGE_CHARS + 10);
        let out = truncate(&long);
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS + 3);
        assert_eq!(truncate("short"), "short");
    }
}
