//! Link a Strava or Google account to a Telegram user.
//!
//! Usage: cargo run --bin authorize <config.json> <strava|google> <telegram_user_id>
//!
//! Prints the authorization URL, then reads the URL the browser was redirected
//! to (it contains `code=`), exchanges the code and stores the tokens.

use std::io::{BufRead, Write};

use runmate::config::Config;
use runmate::integrations::oauth::{OAuthProvider, extract_code};
use runmate::{oauth_app, open_token_store};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: {} <config.json> <strava|google> <telegram_user_id>", args[0]);
        std::process::exit(1);
    }

    let provider = match args[2].as_str() {
        "strava" => OAuthProvider::Strava,
        "google" => OAuthProvider::Google,
        other => {
            eprintln!("Unknown provider '{other}', expected strava or google");
            std::process::exit(1);
        }
    };
    let user_id = &args[3];

    if let Err(e) = run(&args[1], provider, user_id).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(config_path: &str, provider: OAuthProvider, user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;
    let tokens = open_token_store(&config)?;
    let app = oauth_app(&config, provider, tokens)
        .ok_or_else(|| format!("no '{}' section in {}", provider.name(), config_path))?;

    println!("Open this URL in your browser and approve access:\n");
    println!("{}\n", app.authorization_url(user_id));
    print!("Paste the URL you were redirected to: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let code = extract_code(line.trim()).ok_or("no code= parameter in that URL")?;

    let token = app.exchange_code(user_id, &code).await?;
    println!(
        "✅ {} connected for user {} (token valid until {})",
        provider.name(),
        user_id,
        token.expires_at
    );
    Ok(())
}
