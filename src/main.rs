use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use runmate::assistant::{Assistant, AssistantSettings};
use runmate::config::Config;
use runmate::telegram::{self, AppState, TelegramClient};
use runmate::{build_services, telegram_log};

#[tokio::main]
async fn main() {
    let first_arg = std::env::args().nth(1);
    let print_graph = first_arg.as_deref() == Some("graph");
    let config_path = if print_graph {
        std::env::args().nth(2)
    } else {
        first_arg
    }
    .unwrap_or_else(|| "runmate.json".to_string());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::never(&log_dir, "runmate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id.filter(|_| !print_graph) {
        let tg_layer = telegram_log::TelegramLogLayer::new(bot.clone(), log_chat_id);
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    let services = match build_services(&config) {
        Ok(services) => services,
        Err(e) => {
            error!("Startup failed: {e}");
            std::process::exit(1);
        }
    };
    let settings = AssistantSettings {
        memory_limit: config.memory_limit,
        run_timeout: config.run_timeout,
    };
    let assistant = match Assistant::new(services, settings) {
        Ok(assistant) => assistant,
        Err(e) => {
            error!("Invalid assistant graph: {e}");
            std::process::exit(1);
        }
    };

    if print_graph {
        println!("{}", assistant.workflow().to_mermaid());
        return;
    }

    info!("🚀 Starting runmate...");
    info!("Loaded config from {config_path}");

    match config.webhook_url() {
        Some(url) => {
            if let Err(e) = telegram::register_webhook(&bot, &url, config.webhook_secret.as_deref()).await {
                error!("{e}");
            }
        }
        None => warn!("public_url not set; expecting the webhook to be registered elsewhere"),
    }

    let state = Arc::new(AppState::new(
        Arc::new(assistant),
        Arc::new(TelegramClient::new(bot)),
        config.user_profile(0),
        config.allowed_chat_ids.clone(),
        config.webhook_secret.clone(),
    ));
    let app = telegram::router(state, &config.webhook_path);

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot bind {}: {e}", config.listen_addr);
            std::process::exit(1);
        }
    };
    info!("Listening on {} (webhook path {})", config.listen_addr, config.webhook_path);

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down");
    };
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!("Server error: {e}");
    }
}
