//! Relay connections and publishing
//!
//! Manages connections to multiple Nostr relays and publishes signed events,
//! collecting each relay's acknowledgment.

pub mod message;
pub mod session;
pub mod transport;
pub mod url;

pub use session::{PublishOutcome, PublishReport, RelaySession, RelayState, RelayStatus};
pub use transport::{Connection, Transport, WebSocketTransport};
pub use url::RelayUrl;
