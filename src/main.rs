//! opsbot - chat ops bot for cloud VMs and release rotations
//!
//! Reads `<user>: <message>` lines from stdin and prints the Slack
//! payloads the bot would send. Clouds and the rota sheet are in-process.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use opsbot::commands::Bot;
use opsbot::config::{BotConfig, Secrets};
use opsbot::paths;
use opsbot::state::SharedState;

/// User id for lines without a `<user>:` prefix
const CONSOLE_USER: &str = "console";
const CONSOLE_CHANNEL: &str = "console";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("opsbot=info".parse()?),
        )
        .init();

    let config_path = paths::config_path();
    let config = BotConfig::load(&config_path).context("failed to load config")?;

    let secrets = Secrets::from_env();
    info!(?secrets, "slack credentials");
    if secrets.slack_bot_token.is_none() {
        warn!("SLACK_BOT_TOKEN not set - running console only");
    }

    info!(
        region = %config.aws.region,
        "using in-memory AWS and OpenStack backends"
    );
    let state = Arc::new(SharedState::in_memory(config));
    info!(
        commands = state.registry.commands().len(),
        "starting {}", state.config.bot_name
    );
    let bot = Bot::new(state);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (user, text) = split_user(line);

        for reply in bot.handle_message(user, text).await {
            println!("{}", reply.to_slack_payload(CONSOLE_CHANNEL));
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}

/// Split `user: message`; a prefix containing whitespace is part of the message
fn split_user(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((user, text)) if !user.is_empty() && !user.contains(char::is_whitespace) => {
            (user, text.trim())
        }
        _ => (CONSOLE_USER, line),
    }
}
