//! NIP-01 client/relay messages used for publishing.

use serde_json::Value;

use crate::error::{BridgeError, Result};

/// `["EVENT", <event json>]`, built from an already-serialized event so every
/// relay receives byte-identical payloads.
pub fn event_message(event_json: &str) -> String {
    format!("[\"EVENT\",{}]", event_json)
}

/// Messages a relay can send that matter when publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `["OK", event_id, accepted, message]`
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// `["NOTICE", message]`
    Notice(String),
    /// `["AUTH", challenge]`
    Auth(String),
    /// Anything else (EVENT, EOSE, CLOSED, unknown types).
    Other(String),
}

impl RelayMessage {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let arr = value
            .as_array()
            .ok_or_else(|| BridgeError::InvalidInput("Relay message must be a JSON array".into()))?;

        let msg_type = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BridgeError::InvalidInput("Relay message type must be a string".into())
            })?;

        match msg_type {
            "OK" => {
                if arr.len() < 3 {
                    return Err(BridgeError::InvalidInput(
                        "OK message requires at least 3 elements".into(),
                    ));
                }
                let event_id = arr[1]
                    .as_str()
                    .ok_or_else(|| {
                        BridgeError::InvalidInput("OK event_id must be a string".into())
                    })?
                    .to_string();
                let accepted = arr[2].as_bool().ok_or_else(|| {
                    BridgeError::InvalidInput("OK accepted field must be a boolean".into())
                })?;
                // Some relays omit the message on success.
                let message = arr.get(3).and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            "NOTICE" => Ok(RelayMessage::Notice(
                arr.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
            )),
            "AUTH" => Ok(RelayMessage::Auth(
                arr.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
            )),
            other => Ok(RelayMessage::Other(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_message_wraps_json() {
        assert_eq!(event_message(r#"{"id":"ab"}"#), r#"["EVENT",{"id":"ab"}]"#);
        let value: Value = serde_json::from_str(&event_message(r#"{"id":"ab"}"#)).unwrap();
        assert_eq!(value[0], "EVENT");
    }

    #[test]
    fn test_parse_ok() {
        assert_eq!(
            RelayMessage::parse(r#"["OK","abc",false,"blocked: spam"]"#).unwrap(),
            RelayMessage::Ok {
                event_id: "abc".into(),
                accepted: false,
                message: "blocked: spam".into()
            }
        );
        assert_eq!(
            RelayMessage::parse(r#"["OK","abc",true]"#).unwrap(),
            RelayMessage::Ok {
                event_id: "abc".into(),
                accepted: true,
                message: String::new()
            }
        );
    }

    #[test]
    fn test_parse_notice_and_other() {
        assert_eq!(
            RelayMessage::parse(r#"["NOTICE","slow down"]"#).unwrap(),
            RelayMessage::Notice("slow down".into())
        );
        assert_eq!(
            RelayMessage::parse(r#"["EOSE","sub"]"#).unwrap(),
            RelayMessage::Other("EOSE".into())
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(RelayMessage::parse("{}").is_err());
        assert!(RelayMessage::parse("[]").is_err());
        assert!(RelayMessage::parse(r#"["OK","abc","yes"]"#).is_err());
        assert!(RelayMessage::parse("not json").is_err());
    }
}
