use std::fmt;
use url::Url;

use crate::error::{BridgeError, Result};

/// A validated `ws://` or `wss://` relay address.
///
/// Two spellings of the same relay (`wss://relay.example` and
/// `wss://relay.example/`) normalize to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayUrl(String);

impl RelayUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim())
            .map_err(|e| BridgeError::MalformedUrl(format!("{}: {}", input, e)))?;

        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(BridgeError::MalformedUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(BridgeError::MalformedUrl(format!("{}: missing host", input)));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(BridgeError::MalformedUrl(format!(
                "{}: credentials are not allowed",
                input
            )));
        }

        let mut normalized = url.to_string();
        if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
            normalized.pop();
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
