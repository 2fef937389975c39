//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, CourierConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_bot_config(&config.bot)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates bot credentials and polling settings.
pub fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    validate_token(&bot.token)?;

    if !(bot.api_url.starts_with("http://") || bot.api_url.starts_with("https://")) {
        return Err(ConfigError::invalid_url(
            &bot.api_url,
            "URL must start with http:// or https://",
        ));
    }

    if bot.request_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "Request timeout must be greater than 0",
        ));
    }

    Ok(())
}

/// Checks the `<numeric id>:<secret>` shape without revealing the secret.
fn validate_token(token: &str) -> ConfigResult<()> {
    if token.is_empty() {
        return Err(ConfigError::missing_field("bot.token"));
    }

    let Some((id, secret)) = token.split_once(':') else {
        return Err(ConfigError::InvalidToken(
            "expected `<id>:<secret>`".to_string(),
        ));
    };
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::InvalidToken(
            "bot id must be numeric".to_string(),
        ));
    }
    if secret.is_empty() || secret.chars().any(char::is_whitespace) || secret.contains('/') {
        return Err(ConfigError::InvalidToken(
            "secret must be non-empty and URL-safe".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}
