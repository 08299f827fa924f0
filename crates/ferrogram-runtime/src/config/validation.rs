//! Configuration validation utilities.

use std::str::FromStr;

use super::error::{ConfigError, ConfigResult};
use super::schema::{FerrogramConfig, LogOutput, LoggingConfig, ReceiverConfig};
use ferrogram_core::UpdateKind;

/// Update slot names a receiver may ask for.
///
/// The routed kinds plus slots delivered only to unmatched handlers.
const EXTRA_SLOTS: &[&str] = &[
    "channel_post",
    "edited_channel_post",
    "chosen_inline_result",
    "shipping_query",
    "poll",
    "poll_answer",
    "my_chat_member",
    "chat_member",
    "chat_join_request",
];

/// Validates the entire configuration.
pub fn validate_config(config: &FerrogramConfig) -> ConfigResult<()> {
    validate_token(&config.bot.token)?;
    validate_receiver(&config.receiver)?;
    validate_logging(&config.logging)?;
    Ok(())
}

/// Validates the gateway token shape: `<numeric id>:<secret>`.
///
/// An empty token is accepted; transports that need one reject it.
fn validate_token(token: &str) -> ConfigResult<()> {
    if token.is_empty() {
        return Ok(());
    }
    match token.split_once(':') {
        Some((id, secret))
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && !secret.is_empty() =>
        {
            Ok(())
        }
        _ => Err(ConfigError::Invalid(
            "bot token must have the form '<numeric id>:<secret>'".to_string(),
        )),
    }
}

fn validate_receiver(receiver: &ReceiverConfig) -> ConfigResult<()> {
    if let Some(limit) = receiver.limit
        && !(1..=100).contains(&limit)
    {
        return Err(ConfigError::Invalid(format!(
            "receiver limit must be between 1 and 100, got {limit}"
        )));
    }

    for name in &receiver.allowed_updates {
        let known = name != "unmatched"
            && (UpdateKind::from_str(name).is_ok() || EXTRA_SLOTS.contains(&name.as_str()));
        if !known {
            return Err(ConfigError::Invalid(format!(
                "unknown update type in allowed_updates: {name}"
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::MissingField("logging.file_path"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = FerrogramConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_token() {
        let mut config = FerrogramConfig::default();
        config.bot.token = "123456:abc-DEF".to_string();
        assert!(validate_config(&config).is_ok());

        config.bot.token = "not-a-token".to_string();
        assert!(validate_config(&config).is_err());

        config.bot.token = "abc:def".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_limit() {
        let mut config = FerrogramConfig::default();
        config.receiver.limit = Some(0);
        assert!(validate_config(&config).is_err());
        config.receiver.limit = Some(101);
        assert!(validate_config(&config).is_err());
        config.receiver.limit = Some(100);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_allowed_updates() {
        let mut config = FerrogramConfig::default();
        config.receiver.allowed_updates = vec!["message".into(), "callback_query".into(), "poll".into()];
        assert!(validate_config(&config).is_ok());

        config.receiver.allowed_updates = vec!["unmatched".into()];
        assert!(validate_config(&config).is_err());

        config.receiver.allowed_updates = vec!["messages".into()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = FerrogramConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField(_))
        ));
    }
}
