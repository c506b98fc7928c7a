pub mod bridge;
pub mod buffer;
pub mod config;
pub mod crypto;
pub mod error;
pub mod event;
pub mod ffi;
pub mod keys;
pub mod logging;
pub mod nip19;
pub mod registry;
pub mod relay;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use event::{EventBuilder, SignedEvent};
pub use keys::KeyIdentity;
pub use registry::{Handle, HandleRegistry};
pub use relay::{PublishOutcome, PublishReport, RelaySession, RelayState};
