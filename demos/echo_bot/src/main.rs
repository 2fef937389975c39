//! Echo Bot Example
//!
//! Echoes every text message back to its chat and answers a few commands.
//!
//! # Usage
//!
//! ```bash
//! COURIER_BOT__TOKEN=123456:ABC-DEF cargo run --package echo-bot
//! cargo run --package echo-bot -- --config ./courier.toml --debug
//! ```
//!
//! Press Ctrl+C to stop; the bot exits once the in-flight poll returns.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use courier::prelude::*;
use courier::runtime::config::validate_config;
use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "echo-bot", about = "Echo bot built on Courier")]
struct Args {
    /// Configuration file; searched in the default locations when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long)]
    profile: Option<String>,

    /// Bot token; overrides the configured one.
    #[arg(short, long)]
    token: Option<String>,

    /// Log every response and inbound update.
    #[arg(short, long)]
    debug: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Builds the reply for one incoming message.
fn reply_for(msg: &Message, me: &str) -> Option<String> {
    let text = msg.text_or_caption()?.trim();
    let reply = match text {
        "/ping" => "Pong!".to_string(),
        "/help" | "/start" => "\
/echo <text> - Echo text
/ping        - Pong!
/info        - Message info
Anything else is echoed back."
            .to_string(),
        "/info" => format!(
            "Message {} in chat {} ({:?}), handled by @{}",
            msg.id, msg.chat.id, msg.chat.kind, me
        ),
        _ => text.strip_prefix("/echo ").unwrap_or(text).to_string(),
    };
    Some(reply)
}

async fn echo(client: Client, me: Identity, msg: Message) {
    let sender = msg
        .from
        .as_ref()
        .map(|u| u.first_name.as_str())
        .unwrap_or("Unknown");
    info!(
        "[{}] {}: {}",
        msg.chat.id,
        sender,
        msg.text_or_caption().unwrap_or_default()
    );

    let me = me.display_name().unwrap_or("unknown");
    let Some(reply) = reply_for(&msg, me) else {
        return;
    };
    if let Err(e) = client
        .send(&SendMessage::new(msg.chat.id, reply).reply_to(msg.id))
        .await
    {
        error!("Failed to send echo reply: {}", e);
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile);
    }
    let mut config = loader.load().context("failed to load configuration")?;
    if let Some(token) = args.token {
        config.bot.token = token;
    }
    config.bot.debug |= args.debug;
    validate_config(&config).context("invalid configuration")?;

    init_from_config(&config.logging);

    let mut session = Session::from_config(&config.bot)?;
    let client = session.client().clone();
    // Filled in by `start` before the first update is dispatched.
    let me = session.identity();

    session.on(UpdateKind::Message, move |msg: Message| {
        echo(client.clone(), me.clone(), msg)
    })?;
    session.handle("callback_query", |query: Value| async move {
        warn!(id = %query["id"], "Ignoring callback query");
    })?;

    let stop = session.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested, waiting for the current poll to return");
            stop.stop();
        }
    });

    session.start().await?;
    info!("Bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(text: &str) -> Message {
        serde_json::from_value(json!({
            "message_id": 4,
            "date": 0,
            "chat": {"id": 99, "type": "private"},
            "text": text
        }))
        .unwrap()
    }

    #[test]
    fn test_replies() {
        assert_eq!(reply_for(&message("/ping"), "bot").as_deref(), Some("Pong!"));
        assert_eq!(reply_for(&message("/echo hi there"), "bot").as_deref(), Some("hi there"));
        assert_eq!(reply_for(&message("plain"), "bot").as_deref(), Some("plain"));
        assert!(reply_for(&message("/info"), "bot").unwrap().contains("@bot"));
    }
}
