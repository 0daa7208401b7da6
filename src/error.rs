//! Error types for the intake service.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors talking to an external channel (mail server, chat API).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} connection failed: {reason}")]
    Connection { name: String, reason: String },

    #[error("Channel {name} protocol error: {reason}")]
    Protocol { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// A single fetched message could not be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Message {id} could not be parsed")]
    Unparseable { id: String },

    #[error("Message {id} has no text/plain part")]
    NoPlainText { id: String },

    #[error("Message {id} has no decodable sender")]
    NoSender { id: String },
}

/// A ticket draft failed the channel-agnostic field checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Required field `{field}` is empty")]
    EmptyField { field: &'static str },
}

/// Handing a draft to the downstream queue failed.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize ticket draft: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue {queue} transport failed: {reason}")]
    Transport { queue: String, reason: String },
}

/// What went wrong while turning a channel event into a queued ticket.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Acknowledgement failed: {0}")]
    Ack(ChannelError),
}

/// Poll scheduler lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Poll scheduler is already running")]
    AlreadyRunning,
}
