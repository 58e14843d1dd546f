//! Run one request through the assistant from the terminal.
//!
//! Usage: cargo run --bin ask <config.json> <telegram_user_id> <message...>

use runmate::assistant::{Assistant, AssistantSettings};
use runmate::build_services;
use runmate::config::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <config.json> <telegram_user_id> <message...>", args[0]);
        std::process::exit(1);
    }

    let Ok(user_id) = args[2].parse::<i64>() else {
        eprintln!("telegram_user_id must be a number");
        std::process::exit(1);
    };
    let request = args[3..].join(" ");

    match ask(&args[1], user_id, &request).await {
        Ok(reply) => println!("{reply}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn ask(config_path: &str, user_id: i64, request: &str) -> Result<String, Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;
    let settings = AssistantSettings {
        memory_limit: config.memory_limit,
        run_timeout: config.run_timeout,
    };
    let assistant = Assistant::new(build_services(&config)?, settings)?;
    Ok(assistant.respond(request, config.user_profile(user_id)).await)
}
