//! Configuration module for the Courier runtime.
//!
//! Layered loading (defaults, files, `COURIER_*` environment variables,
//! programmatic overrides) and validation of the bot and logging settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, CourierConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig,
};
pub use validation::{validate_bot_config, validate_config};
