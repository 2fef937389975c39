//! # Courier
//!
//! A typed long-polling client runtime for the Telegram Bot API.
//!
//! ## Overview
//!
//! A [`Session`](prelude::Session) authenticates with a bot token, long-polls
//! `getUpdates`, acknowledges every update it sees and hands each one to the
//! single handler registered for the first matching update kind. Outbound
//! calls go through a [`Client`](prelude::Client) that encodes requests as
//! JSON, or as multipart when they carry files.
//!
//! ```text
//! ┌─────────┐  getUpdates  ┌─────────┐  Update  ┌────────────┐  payload  ┌─────────┐
//! │ Bot API │─────────────▶│ Session │─────────▶│ Dispatcher │──────────▶│ Handler │
//! └─────────┘◀─────────────└─────────┘          └────────────┘           └─────────┘
//!              sendMessage ◀──────────────────── Client ◀──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut session = Session::from_config(&BotConfig::new("123456:ABC-DEF"))?;
//!     let client = session.client().clone();
//!
//!     session.on(UpdateKind::Message, move |msg: Message| {
//!         let client = client.clone();
//!         async move {
//!             let text = msg.text_or_caption().unwrap_or("(empty)").to_string();
//!             client.send(&SendMessage::new(msg.chat.id, text)).await.map(|_| ())
//!         }
//!     })?;
//!
//!     session.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log format

pub use courier_core as core;
pub use courier_runtime as runtime;
pub use courier_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Session - main entry point
    pub use courier_runtime::{Identity, Session, StopHandle};

    // Configuration and logging
    pub use courier_runtime::config::{ConfigLoader, load_config};
    pub use courier_runtime::logging::init_from_config;
    pub use courier_runtime::{BotConfig, CourierConfig};

    // Calls
    pub use courier_core::{
        ChatId, Client, Encoding, Fields, GetMe, InputFile, Method, SendDocument, SendMessage,
        SendPhoto, ToFields,
    };

    // Updates and records
    pub use courier_core::{Chat, ChatType, Message, Update, UpdateKind, User};

    // Errors
    pub use courier_core::{ApiError, Error, Result, SessionState};
}
