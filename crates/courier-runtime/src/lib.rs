//! Courier Runtime - session and update loop for the Courier bot client.
//!
//! This crate provides:
//! - The [`Session`]: identity, long-poll loop, lifecycle
//! - Layered configuration ([`config`])
//! - Logging setup ([`logging`])
//!
//! ```ignore
//! use courier_runtime::{Session, config::load_config, logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let mut session = Session::from_config(&config.bot)?;
//!     session.handle("message", |msg: courier_core::Message| async move {
//!         tracing::info!(text = ?msg.text, "got message");
//!     })?;
//!     session.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;
pub mod session;

// Re-exports
pub use config::{BotConfig, ConfigError, ConfigLoader, ConfigResult, CourierConfig, LoggingConfig};
pub use logging::{init_from_config, try_init_from_config};
pub use session::{DEFAULT_POLL_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, Identity, Session, StopHandle};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;
