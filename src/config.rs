//! Configuration types, built from environment variables.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Queue the classification service consumes from.
pub const CLASSIFICATION_QUEUE: &str = "classification.queue";

/// Default text posted back to a chat conversation when a ticket is created.
pub const DEFAULT_ACK_TEXT: &str = "We've received your message and will get back to you shortly!";

/// Mail source configuration for the email adapter.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub mail_host: String,
    pub mail_port: u16,
    pub mail_user: String,
    pub mail_password: SecretString,
    pub mailbox: String,
    pub poll_interval_seconds: u64,
}

impl MailConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `IMAP_SERVER` is not set (email channel disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(mail_host) = std::env::var("IMAP_SERVER") else {
            return Ok(None);
        };

        let mail_user =
            std::env::var("EMAIL").map_err(|_| ConfigError::MissingEnvVar("EMAIL".into()))?;
        let mail_password = std::env::var("EMAIL_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("EMAIL_PASSWORD".into()))?;

        Ok(Some(Self {
            mail_host,
            mail_port: parse_env("IMAP_PORT", 993)?,
            mail_user,
            mail_password: SecretString::from(mail_password),
            mailbox: std::env::var("IMAP_MAILBOX").unwrap_or_else(|_| "INBOX".to_string()),
            poll_interval_seconds: parse_nonzero_env("EMAIL_POLL_INTERVAL_SECS", 30)?,
        }))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

/// Slack Web API configuration for the chat adapter.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub api_base: String,
    pub ack_text: String,
}

impl SlackConfig {
    /// Returns `None` if `SLACK_BOT_TOKEN` is not set (chat channel disabled).
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("SLACK_BOT_TOKEN").ok()?;
        Some(Self {
            bot_token: SecretString::from(bot_token),
            api_base: std::env::var("SLACK_API_BASE")
                .unwrap_or_else(|_| "https://slack.com/api".to_string()),
            ack_text: std::env::var("SLACK_ACK_TEXT")
                .unwrap_or_else(|_| DEFAULT_ACK_TEXT.to_string()),
        })
    }
}

/// Downstream queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub queue_name: String,
    /// NATS server URL. `None` runs against the in-memory queue.
    pub nats_url: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: CLASSIFICATION_QUEUE.to_string(),
            nats_url: None,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            queue_name: std::env::var("CLASSIFICATION_QUEUE")
                .unwrap_or_else(|_| CLASSIFICATION_QUEUE.to_string()),
            nats_url: std::env::var("NATS_URL").ok().filter(|s| !s.is_empty()),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("INTAKE_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
        }
    }
}

/// Everything the intake binary needs to start.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub mail: Option<MailConfig>,
    pub slack: Option<SlackConfig>,
    pub queue: QueueConfig,
    pub server: ServerConfig,
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            mail: MailConfig::from_env()?,
            slack: SlackConfig::from_env(),
            queue: QueueConfig::from_env(),
            server: ServerConfig::from_env(),
        })
    }
}

/// Parse an optional numeric env var, rejecting garbage instead of defaulting.
fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Like `parse_env`, but zero is rejected.
fn parse_nonzero_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match parse_env(key, default)? {
        0 => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be at least 1".into(),
        }),
        value => Ok(value),
    }
}
