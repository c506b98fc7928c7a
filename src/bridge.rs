//! Handle-based client core
//!
//! [`Bridge`] owns one registry per resource type, the tokio runtime that
//! drives relay I/O, and the injected signing and transport capabilities.
//! Every method is synchronous: relay work is driven to completion on the
//! runtime before the call returns. The C ABI in [`crate::ffi`] is a thin
//! wrapper over a process-wide instance.

use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::buffer;
use crate::config::BridgeConfig;
use crate::crypto::{SchnorrSigner, Signer};
use crate::error::{BridgeError, Result};
use crate::event::{EventBuilder, SignedEvent};
use crate::keys::KeyIdentity;
use crate::registry::{Handle, HandleRegistry};
use crate::relay::{PublishReport, RelaySession, RelayStatus, Transport, WebSocketTransport};

const KEYS_TAG: u8 = 0x4b;
const EVENTS_TAG: u8 = 0x45;
const CLIENTS_TAG: u8 = 0x43;

pub struct Bridge {
    config: BridgeConfig,
    signer: Arc<dyn Signer>,
    transport: Arc<dyn Transport>,
    runtime: Runtime,
    keys: HandleRegistry<KeyIdentity>,
    events: HandleRegistry<SignedEvent>,
    clients: HandleRegistry<RelaySession>,
}

impl Bridge {
    /// Bridge with Schnorr signing and WebSocket relays.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        Self::with_capabilities(
            config,
            Arc::new(SchnorrSigner::new()),
            Arc::new(WebSocketTransport),
        )
    }

    pub fn with_capabilities(
        config: BridgeConfig,
        signer: Arc<dyn Signer>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("nostr-bridge")
            .build()
            .map_err(|e| BridgeError::Runtime(format!("Failed to create runtime: {}", e)))?;

        Ok(Self {
            config,
            signer,
            transport,
            runtime,
            keys: HandleRegistry::new("keys", KEYS_TAG),
            events: HandleRegistry::new("event", EVENTS_TAG),
            clients: HandleRegistry::new("client", CLIENTS_TAG),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    // Keys

    pub fn generate_keys(&self) -> Result<Handle> {
        let identity = KeyIdentity::generate(self.signer.as_ref())?;
        Ok(self.keys.create(identity))
    }

    pub fn import_keys(&self, encoded: &str) -> Result<Handle> {
        let identity = KeyIdentity::import(self.signer.as_ref(), encoded)?;
        info!("Imported key identity {}", identity.public_key_hex());
        Ok(self.keys.create(identity))
    }

    pub fn keys(&self, handle: Handle) -> Result<Arc<KeyIdentity>> {
        self.keys.resolve(handle)
    }

    pub fn export_public_key(&self, handle: Handle, out: &mut [u8]) -> Result<usize> {
        let identity = self.keys.resolve(handle)?;
        buffer::write_terminated(&identity.public_key_hex(), out)
    }

    pub fn export_secret_key(&self, handle: Handle, out: &mut [u8]) -> Result<usize> {
        let identity = self.keys.resolve(handle)?;
        buffer::write_terminated(&identity.secret_key_hex(), out)
    }

    pub fn export_npub(&self, handle: Handle, out: &mut [u8]) -> Result<usize> {
        let identity = self.keys.resolve(handle)?;
        buffer::write_terminated(&identity.npub()?, out)
    }

    pub fn export_nsec(&self, handle: Handle, out: &mut [u8]) -> Result<usize> {
        let identity = self.keys.resolve(handle)?;
        buffer::write_terminated(&identity.nsec()?, out)
    }

    /// The secret is scrubbed once the last in-flight use of the identity ends.
    pub fn release_keys(&self, handle: Handle) -> Result<()> {
        drop(self.keys.release(handle)?);
        Ok(())
    }

    // Events

    pub fn build_text_note(&self, content: &str, keys: Handle) -> Result<Handle> {
        self.build_event(EventBuilder::text_note(content), keys)
    }

    pub fn build_text_note_with_tags(
        &self,
        content: &str,
        tags: Vec<Vec<String>>,
        keys: Handle,
    ) -> Result<Handle> {
        self.build_event(EventBuilder::text_note_with_tags(content, tags)?, keys)
    }

    /// Sign with a borrowed identity and register the finished event.
    pub fn build_event(&self, builder: EventBuilder, keys: Handle) -> Result<Handle> {
        let identity = self.keys.resolve(keys)?;
        let event = builder.sign(&identity, self.signer.as_ref())?;
        Ok(self.events.create(event))
    }

    pub fn event(&self, handle: Handle) -> Result<Arc<SignedEvent>> {
        self.events.resolve(handle)
    }

    pub fn serialize_event(&self, handle: Handle, out: &mut [u8]) -> Result<usize> {
        self.events.resolve(handle)?.write_json(out)
    }

    pub fn export_event_id(&self, handle: Handle, out: &mut [u8]) -> Result<usize> {
        buffer::write_terminated(self.events.resolve(handle)?.id(), out)
    }

    pub fn release_event(&self, handle: Handle) -> Result<()> {
        drop(self.events.release(handle)?);
        Ok(())
    }

    // Clients

    pub fn new_client(&self) -> Handle {
        let session = RelaySession::new(self.config.relay.clone(), Arc::clone(&self.transport));
        self.clients.create(session)
    }

    pub fn add_relay(&self, client: Handle, url: &str) -> Result<()> {
        let session = self.clients.resolve(client)?;
        self.runtime.block_on(session.add_relay(url))?;
        Ok(())
    }

    pub fn remove_relay(&self, client: Handle, url: &str) -> Result<bool> {
        let session = self.clients.resolve(client)?;
        self.runtime.block_on(session.remove_relay(url))
    }

    pub fn connect(&self, client: Handle) -> Result<()> {
        let session = self.clients.resolve(client)?;
        self.runtime.block_on(session.connect())
    }

    pub fn disconnect(&self, client: Handle) -> Result<()> {
        let session = self.clients.resolve(client)?;
        self.runtime.block_on(session.disconnect());
        Ok(())
    }

    pub fn send_event(&self, client: Handle, event: Handle) -> Result<PublishReport> {
        let session = self.clients.resolve(client)?;
        let event = self.events.resolve(event)?;
        self.runtime.block_on(session.send_event(&event))
    }

    pub fn relay_status(&self, client: Handle) -> Result<Vec<RelayStatus>> {
        Ok(self.clients.resolve(client)?.relay_status())
    }

    /// Close every connection of the session, then free it.
    pub fn release_client(&self, client: Handle) -> Result<()> {
        let session = self.clients.release(client)?;
        self.runtime.block_on(session.close());
        debug!("Client {} torn down", client);
        Ok(())
    }

    /// Live handles per resource type: (keys, events, clients).
    pub fn live_handles(&self) -> (usize, usize, usize) {
        (self.keys.len(), self.events.len(), self.clients.len())
    }
}
