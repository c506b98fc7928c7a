use thiserror::Error;

/// Status code returned across the C boundary on success.
pub const STATUS_OK: i32 = 0;

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(format!("JSON error: {}", err))
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::str::Utf8Error> for BridgeError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::InvalidInput(format!("text is not valid UTF-8: {}", err))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Invalid or released handle")]
    InvalidHandle,

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Malformed relay URL: {0}")]
    MalformedUrl(String),

    #[error("Buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },

    #[error("Cryptographic backend unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("No connected relays")]
    NoConnectedRelays,

    #[error("Relay connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Relay timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Event rejected by every relay: {0}")]
    PublishRejected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl BridgeError {
    /// Stable negative status code for this error kind.
    ///
    /// These values are part of the C ABI and must never be renumbered.
    pub fn status_code(&self) -> i32 {
        match self {
            BridgeError::InvalidHandle => -1,
            BridgeError::MalformedKey(_) => -2,
            BridgeError::MalformedUrl(_) => -3,
            BridgeError::BufferTooSmall { .. } => -4,
            BridgeError::CryptoUnavailable(_) => -5,
            BridgeError::NoConnectedRelays => -6,
            BridgeError::ConnectionFailed(_) => -7,
            BridgeError::Timeout(_) => -8,
            BridgeError::InvalidInput(_) => -9,
            BridgeError::PublishRejected(_) => -10,
            BridgeError::Config(_) => -11,
            BridgeError::Runtime(_) => -12,
        }
    }

    /// Per-relay errors never abort an aggregate relay operation on their own.
    pub fn is_relay_local(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionFailed(_) | BridgeError::Timeout(_)
        )
    }
}

/// Static, NUL-terminated description of a status code.
pub fn status_message(code: i32) -> &'static str {
    match code {
        0 => "ok\0",
        -1 => "invalid handle\0",
        -2 => "malformed key\0",
        -3 => "malformed url\0",
        -4 => "buffer too small\0",
        -5 => "crypto unavailable\0",
        -6 => "no connected relays\0",
        -7 => "connection failed\0",
        -8 => "timeout\0",
        -9 => "invalid input\0",
        -10 => "publish rejected\0",
        -11 => "configuration error\0",
        -12 => "runtime error\0",
        _ => "unknown status\0",
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(BridgeError::InvalidHandle.status_code(), -1);
        assert_eq!(BridgeError::MalformedKey(String::new()).status_code(), -2);
        assert_eq!(BridgeError::MalformedUrl(String::new()).status_code(), -3);
        assert_eq!(BridgeError::BufferTooSmall { required: 1 }.status_code(), -4);
        assert_eq!(BridgeError::CryptoUnavailable(String::new()).status_code(), -5);
        assert_eq!(BridgeError::NoConnectedRelays.status_code(), -6);
        assert_eq!(BridgeError::ConnectionFailed(String::new()).status_code(), -7);
        assert_eq!(BridgeError::Timeout(String::new()).status_code(), -8);
    }

    #[test]
    fn test_status_messages_are_nul_terminated() {
        for code in -13..=0 {
            assert!(status_message(code).ends_with('\0'));
        }
        assert_eq!(status_message(-6), "no connected relays\0");
    }

    #[test]
    fn test_relay_local_errors() {
        assert!(BridgeError::Timeout("wss://a".into()).is_relay_local());
        assert!(!BridgeError::InvalidHandle.is_relay_local());
    }
}
