#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use nostr_bridge::config::{BridgeConfig, RelayConfig};
use nostr_bridge::crypto::{SchnorrSigner, SecretBytes, Signer};
use nostr_bridge::error::{BridgeError, Result};
use nostr_bridge::relay::{Connection, RelayUrl, Transport};
use zeroize::Zeroizing;

/// Relay timeouts short enough for tests that wait on them.
pub fn fast_relay_config() -> RelayConfig {
    RelayConfig {
        connect_timeout_ms: 200,
        ack_timeout_ms: 200,
        require_ack: false,
    }
}

/// Bridge configuration with fast relay timeouts.
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        relay: fast_relay_config(),
        ..BridgeConfig::default()
    }
}

/// Signer that hands out predictable secrets (1, 2, 3, …) and uses real
/// Schnorr math for everything else. With `failing()` it reports that no
/// entropy is available; with `failing_to_sign()` only signing fails.
pub struct FakeSigner {
    inner: SchnorrSigner,
    next_secret: AtomicU8,
    entropy_available: bool,
    signing_available: bool,
}

impl FakeSigner {
    pub fn deterministic() -> Self {
        Self {
            inner: SchnorrSigner::new(),
            next_secret: AtomicU8::new(1),
            entropy_available: true,
            signing_available: true,
        }
    }

    pub fn failing() -> Self {
        Self {
            entropy_available: false,
            ..Self::deterministic()
        }
    }

    pub fn failing_to_sign() -> Self {
        Self {
            signing_available: false,
            ..Self::deterministic()
        }
    }
}

impl Signer for FakeSigner {
    fn generate_secret(&self) -> Result<SecretBytes> {
        if !self.entropy_available {
            return Err(BridgeError::CryptoUnavailable("no entropy in test".to_string()));
        }
        let mut secret = Zeroizing::new([0u8; 32]);
        secret[31] = self.next_secret.fetch_add(1, Ordering::SeqCst);
        Ok(secret)
    }

    fn derive_public(&self, secret: &[u8; 32]) -> Result<[u8; 32]> {
        self.inner.derive_public(secret)
    }

    fn sign(&self, secret: &[u8; 32], digest: &[u8; 32]) -> Result<[u8; 64]> {
        if !self.signing_available {
            return Err(BridgeError::CryptoUnavailable("signing disabled in test".to_string()));
        }
        self.inner.sign(secret, digest)
    }

    fn verify(&self, public_key: &[u8; 32], digest: &[u8; 32], signature: &[u8; 64]) -> bool {
        self.inner.verify(public_key, digest, signature)
    }
}

/// How a scripted relay reacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayBehavior {
    /// Connects and answers every event with an accepting OK.
    Accept,
    /// Connects and answers every event with a rejecting OK.
    Reject(String),
    /// Connects but never answers.
    Silent,
    /// Refuses the connection.
    Refuse,
    /// Never completes the connection attempt.
    Hang,
    /// Connects, then fails on the first send.
    DropOnSend,
    /// Connects, then never finishes a send.
    StallOnSend,
}

/// In-memory transport whose relays follow a script.
pub struct ScriptedTransport {
    default: RelayBehavior,
    behaviors: HashMap<String, RelayBehavior>,
    connects: AtomicUsize,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedTransport {
    pub fn new(default: RelayBehavior) -> Self {
        Self {
            default,
            behaviors: HashMap::new(),
            connects: AtomicUsize::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_relay(mut self, url: &str, behavior: RelayBehavior) -> Self {
        let url = RelayUrl::parse(url).expect("test relay url");
        self.behaviors.insert(url.to_string(), behavior);
        self
    }

    /// Number of connection attempts made so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Frames sent so far, as (relay url, text).
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, url: &RelayUrl) -> Result<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        match behavior {
            RelayBehavior::Refuse => Err(BridgeError::ConnectionFailed(format!(
                "{}: connection refused",
                url
            ))),
            RelayBehavior::Hang => std::future::pending().await,
            behavior => Ok(Box::new(ScriptedConnection {
                url: url.to_string(),
                behavior,
                inbox: VecDeque::new(),
                sent: Arc::clone(&self.sent),
            })),
        }
    }
}

struct ScriptedConnection {
    url: String,
    behavior: RelayBehavior,
    inbox: VecDeque<String>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        match self.behavior {
            RelayBehavior::DropOnSend => {
                return Err(BridgeError::ConnectionFailed(format!("{}: broken pipe", self.url)))
            }
            RelayBehavior::StallOnSend => return std::future::pending().await,
            _ => {}
        }
        self.sent.lock().push((self.url.clone(), text.clone()));

        let Some(id) = event_id_of(&text) else {
            return Ok(());
        };
        match &self.behavior {
            RelayBehavior::Accept => {
                self.inbox.push_back(json!(["NOTICE", "welcome"]).to_string());
                self.inbox.push_back(json!(["OK", id, true, ""]).to_string());
            }
            RelayBehavior::Reject(reason) => {
                self.inbox.push_back(json!(["OK", id, false, reason]).to_string());
            }
            _ => {}
        }
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<Option<String>> {
        match self.inbox.pop_front() {
            Some(text) => Ok(Some(text)),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Event id from an `["EVENT", {...}]` frame.
pub fn event_id_of(frame: &str) -> Option<String> {
    let value: Value = serde_json::from_str(frame).ok()?;
    let array = value.as_array()?;
    if array.first()?.as_str()? != "EVENT" {
        return None;
    }
    Some(array.get(1)?.get("id")?.as_str()?.to_string())
}

/// A WebSocket relay on 127.0.0.1 that answers every EVENT with an OK.
///
/// Runs on its own thread and runtime so both sync and async tests can use it.
pub struct LocalRelay {
    pub url: String,
    received: Arc<Mutex<Vec<String>>>,
}

impl LocalRelay {
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }
}

pub fn spawn_local_relay(accept: bool) -> LocalRelay {
    let (tx, rx) = std::sync::mpsc::channel();
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("relay runtime");
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
            tx.send(listener.local_addr().expect("relay addr"))
                .expect("report relay addr");
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_relay(stream, accept, Arc::clone(&log)));
            }
        });
    });

    let addr = rx.recv().expect("relay started");
    LocalRelay {
        url: format!("ws://{}", addr),
        received,
    }
}

async fn serve_relay(stream: TcpStream, accept: bool, log: Arc<Mutex<Vec<String>>>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        log.lock().push(text.clone());
        if let Some(id) = event_id_of(&text) {
            let reason = if accept { "" } else { "blocked: test relay" };
            let reply = json!(["OK", id, accept, reason]).to_string();
            if ws.send(Message::Text(reply)).await.is_err() {
                break;
            }
        }
    }
}
