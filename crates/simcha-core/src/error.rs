use thiserror::Error;

/// Top-level error type for simcha.
#[derive(Debug, Error)]
pub enum SimchaError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Error from the SMS gateway path. The payload is the reason string
    /// shown to the operator (fixed gateway reasons included).
    #[error("sms error: {0}")]
    Sms(String),

    /// Error from the WhatsApp session or relay.
    #[error("whatsapp error: {0}")]
    WhatsApp(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
