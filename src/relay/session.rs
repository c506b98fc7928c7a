//! Multi-relay session
//!
//! Tracks an ordered set of relays and their connection state, connects to them
//! concurrently, and publishes signed events to every connected relay.
//!
//! Mutations (`add_relay`, `connect`, `remove_relay`, `disconnect`) are
//! serialized by an async mutex. The relay table itself sits behind a lock that
//! is never held across network I/O, so publishing works from a snapshot.

use futures::future::join_all;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{BridgeError, Result};
use crate::event::SignedEvent;
use crate::relay::message::{event_message, RelayMessage};
use crate::relay::transport::{Connection, Transport};
use crate::relay::url::RelayUrl;

type SharedConnection = Arc<Mutex<Box<dyn Connection>>>;

/// Connection state of one relay entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Added,
    Connecting,
    Connected,
    Failed,
}

impl RelayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayState::Added => "added",
            RelayState::Connecting => "connecting",
            RelayState::Connected => "connected",
            RelayState::Failed => "failed",
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one relay entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStatus {
    pub url: RelayUrl,
    pub state: RelayState,
    pub last_error: Option<BridgeError>,
}

/// What happened when an event was published to one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    Rejected(String),
    /// Sent, but no OK arrived before the acknowledgment timeout.
    Unacknowledged,
    /// Never reached the relay.
    Failed(BridgeError),
}

impl PublishOutcome {
    pub fn transmitted(&self) -> bool {
        !matches!(self, PublishOutcome::Failed(_))
    }
}

/// Per-relay results of one publish.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub event_id: String,
    pub outcomes: Vec<(RelayUrl, PublishOutcome)>,
}

impl PublishReport {
    pub fn transmitted_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.transmitted()).count()
    }

    pub fn accepted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == PublishOutcome::Accepted)
            .count()
    }

    pub fn outcome(&self, url: &RelayUrl) -> Option<&PublishOutcome> {
        self.outcomes.iter().find(|(u, _)| u == url).map(|(_, o)| o)
    }
}

struct RelayEntry {
    url: RelayUrl,
    state: RelayState,
    last_error: Option<BridgeError>,
    connection: Option<SharedConnection>,
}

pub struct RelaySession {
    config: RelayConfig,
    transport: Arc<dyn Transport>,
    relays: RwLock<Vec<RelayEntry>>,
    /// Guards mutations; `true` once the session has been closed for good.
    mutation: Mutex<bool>,
}

impl RelaySession {
    pub fn new(config: RelayConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            relays: RwLock::new(Vec::new()),
            mutation: Mutex::new(false),
        }
    }

    /// Add a relay, or reset a failed one so the next `connect` retries it.
    pub async fn add_relay(&self, url: &str) -> Result<RelayUrl> {
        let url = RelayUrl::parse(url)?;
        let closed = self.mutation.lock().await;
        if *closed {
            return Err(BridgeError::InvalidHandle);
        }

        let mut relays = self.relays.write();
        match relays.iter_mut().find(|entry| entry.url == url) {
            Some(entry) => {
                if entry.state == RelayState::Failed {
                    entry.state = RelayState::Added;
                    entry.last_error = None;
                }
                debug!("Relay {} already present ({})", url, entry.state);
            }
            None => {
                relays.push(RelayEntry {
                    url: url.clone(),
                    state: RelayState::Added,
                    last_error: None,
                    connection: None,
                });
                info!("Added relay {}", url);
            }
        }
        Ok(url)
    }

    /// Remove a relay, closing its connection. Returns whether it was present.
    pub async fn remove_relay(&self, url: &str) -> Result<bool> {
        let url = RelayUrl::parse(url)?;
        let _guard = self.mutation.lock().await;

        let removed = {
            let mut relays = self.relays.write();
            let index = relays.iter().position(|entry| entry.url == url);
            index.map(|index| relays.remove(index))
        };

        match removed {
            Some(entry) => {
                if let Some(connection) = entry.connection {
                    close_connection(&url, connection, self.config.ack_timeout()).await;
                }
                info!("Removed relay {}", url);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Connect every relay in `Added` or `Failed` state, concurrently.
    ///
    /// Per-relay failures are recorded in relay state. The call itself only
    /// fails when relays were attempted and none of them connected.
    pub async fn connect(&self) -> Result<()> {
        let closed = self.mutation.lock().await;
        if *closed {
            return Err(BridgeError::InvalidHandle);
        }

        let targets: Vec<RelayUrl> = {
            let mut relays = self.relays.write();
            relays
                .iter_mut()
                .filter(|entry| matches!(entry.state, RelayState::Added | RelayState::Failed))
                .map(|entry| {
                    entry.state = RelayState::Connecting;
                    entry.url.clone()
                })
                .collect()
        };

        if targets.is_empty() {
            debug!("No relays need connecting");
            return Ok(());
        }

        let connect_timeout = self.config.connect_timeout();
        let attempts = targets.into_iter().map(|url| async move {
            let outcome = match timeout(connect_timeout, self.transport.connect(&url)).await {
                Ok(Ok(connection)) => Ok(connection),
                Ok(Err(e)) if e.is_relay_local() => Err(e),
                Ok(Err(e)) => Err(BridgeError::ConnectionFailed(format!("{}: {}", url, e))),
                Err(_) => Err(BridgeError::Timeout(format!(
                    "{}: connection timeout after {:?}",
                    url, connect_timeout
                ))),
            };
            (url, outcome)
        });
        let results = join_all(attempts).await;

        let attempted = results.len();
        let mut failures = Vec::new();
        {
            let mut relays = self.relays.write();
            for (url, outcome) in results {
                let Some(entry) = relays.iter_mut().find(|entry| entry.url == url) else {
                    continue;
                };
                match outcome {
                    Ok(connection) => {
                        info!("Connected to relay: {}", url);
                        entry.state = RelayState::Connected;
                        entry.last_error = None;
                        entry.connection = Some(Arc::new(Mutex::new(connection)));
                    }
                    Err(e) => {
                        warn!("Failed to connect to relay {}: {}", url, e);
                        entry.state = RelayState::Failed;
                        entry.connection = None;
                        entry.last_error = Some(e.clone());
                        failures.push(e);
                    }
                }
            }
        }

        info!(
            "Connected to {}/{} attempted relays",
            attempted - failures.len(),
            attempted
        );

        if failures.len() < attempted {
            return Ok(());
        }
        if failures.iter().all(|e| matches!(e, BridgeError::Timeout(_))) {
            return Err(BridgeError::Timeout(format!(
                "all {} relays timed out",
                attempted
            )));
        }
        Err(BridgeError::ConnectionFailed(format!(
            "all {} relays failed: {}",
            attempted,
            failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        )))
    }

    /// Publish to every relay that is connected right now and collect acknowledgments.
    ///
    /// Succeeds when the event reached at least one relay, or, with
    /// `require_ack`, when at least one relay accepted it.
    pub async fn send_event(&self, event: &SignedEvent) -> Result<PublishReport> {
        let payload = event_message(&event.as_json()?);

        let targets: Vec<(RelayUrl, SharedConnection)> = self
            .relays
            .read()
            .iter()
            .filter(|entry| entry.state == RelayState::Connected)
            .filter_map(|entry| {
                entry
                    .connection
                    .as_ref()
                    .map(|connection| (entry.url.clone(), Arc::clone(connection)))
            })
            .collect();

        if targets.is_empty() {
            return Err(BridgeError::NoConnectedRelays);
        }

        let ack_timeout = self.config.ack_timeout();
        let event_id = event.id();
        let payload = payload.as_str();
        let deliveries = targets.into_iter().map(|(url, connection)| async move {
            let (outcome, alive) =
                publish_to(&url, &connection, payload, event_id, ack_timeout).await;
            (url, connection, outcome, alive)
        });
        let results = join_all(deliveries).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for (url, connection, outcome, alive) in results {
            if !alive {
                self.mark_dead(&url, &connection, &outcome);
            }
            outcomes.push((url, outcome));
        }

        let report = PublishReport {
            event_id: event_id.to_string(),
            outcomes,
        };
        let transmitted = report.transmitted_count();
        let accepted = report.accepted_count();

        if transmitted == 0 {
            error!("Failed to publish event {} to any relay", event_id);
            return Err(BridgeError::ConnectionFailed(format!(
                "event {} reached no relay",
                event_id
            )));
        }
        info!(
            "Published event {} to {}/{} relays ({} accepted)",
            event_id,
            transmitted,
            report.outcomes.len(),
            accepted
        );

        if self.config.require_ack && accepted == 0 {
            return Err(BridgeError::PublishRejected(format!(
                "event {} was not accepted by any relay",
                event_id
            )));
        }
        Ok(report)
    }

    /// Close every live connection. Relays stay in the table in `Added` state
    /// with no recorded error.
    pub async fn disconnect(&self) {
        let _guard = self.mutation.lock().await;
        self.close_all().await;
    }

    /// Disconnect and refuse any later `add_relay` or `connect`.
    ///
    /// Operations already queued behind this one see the session as released.
    pub async fn close(&self) {
        let mut closed = self.mutation.lock().await;
        *closed = true;
        self.close_all().await;
    }

    /// Callers hold the mutation lock.
    async fn close_all(&self) {
        let connections: Vec<(RelayUrl, SharedConnection)> = {
            let mut relays = self.relays.write();
            relays
                .iter_mut()
                .filter_map(|entry| {
                    entry.state = RelayState::Added;
                    entry.last_error = None;
                    entry
                        .connection
                        .take()
                        .map(|connection| (entry.url.clone(), connection))
                })
                .collect()
        };

        let count = connections.len();
        let limit = self.config.ack_timeout();
        join_all(connections.into_iter().map(|(url, connection)| async move {
            close_connection(&url, connection, limit).await
        }))
        .await;
        info!("Disconnected from {} relays", count);
    }

    pub fn relay_status(&self) -> Vec<RelayStatus> {
        self.relays
            .read()
            .iter()
            .map(|entry| RelayStatus {
                url: entry.url.clone(),
                state: entry.state,
                last_error: entry.last_error.clone(),
            })
            .collect()
    }

    pub fn relay_count(&self) -> usize {
        self.relays.read().len()
    }

    pub fn connected_count(&self) -> usize {
        self.relays
            .read()
            .iter()
            .filter(|entry| entry.state == RelayState::Connected)
            .count()
    }

    fn mark_dead(&self, url: &RelayUrl, connection: &SharedConnection, outcome: &PublishOutcome) {
        let mut relays = self.relays.write();
        let Some(entry) = relays.iter_mut().find(|entry| &entry.url == url) else {
            return;
        };
        // A concurrent reconnect may already have replaced this connection.
        if !entry
            .connection
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, connection))
        {
            return;
        }

        entry.state = RelayState::Failed;
        entry.connection = None;
        entry.last_error = Some(match outcome {
            PublishOutcome::Failed(e) => e.clone(),
            _ => BridgeError::ConnectionFailed(format!("{}: connection lost", url)),
        });
        warn!("Relay {} marked failed after publish", url);
    }
}

/// Send one payload and wait for the matching OK.
///
/// Returns the outcome and whether the connection is still usable.
async fn publish_to(
    url: &RelayUrl,
    connection: &SharedConnection,
    payload: &str,
    event_id: &str,
    ack_timeout: Duration,
) -> (PublishOutcome, bool) {
    // One deadline bounds the lock, the send and the acknowledgment.
    let deadline = Instant::now() + ack_timeout;
    let sent = timeout_at(deadline, async move {
        let mut connection = connection.lock().await;
        connection.send_text(payload.to_string()).await?;
        Ok::<_, BridgeError>(connection)
    })
    .await;

    let mut connection = match sent {
        Ok(Ok(connection)) => connection,
        Ok(Err(e)) => {
            error!("Failed to publish to relay {}: {}", url, e);
            return (PublishOutcome::Failed(e), false);
        }
        Err(_) => {
            error!("Relay {} did not take event {} within {:?}", url, event_id, ack_timeout);
            let e = BridgeError::Timeout(format!("{}: send timeout after {:?}", url, ack_timeout));
            return (PublishOutcome::Failed(e), false);
        }
    };
    debug!("Sent event {} to relay {}", event_id, url);

    loop {
        match timeout_at(deadline, connection.recv_text()).await {
            Ok(Ok(Some(text))) => match RelayMessage::parse(&text) {
                Ok(RelayMessage::Ok {
                    event_id: acked,
                    accepted,
                    message,
                }) if acked == event_id => {
                    return if accepted {
                        debug!("Relay {} accepted event {}", url, event_id);
                        (PublishOutcome::Accepted, true)
                    } else {
                        warn!("Relay {} rejected event {}: {}", url, event_id, message);
                        (PublishOutcome::Rejected(message), true)
                    };
                }
                Ok(RelayMessage::Notice(notice)) => info!("Notice from {}: {}", url, notice),
                Ok(other) => debug!("Ignoring message from {}: {:?}", url, other),
                Err(e) => warn!("Unparseable message from {}: {}", url, e),
            },
            Ok(Ok(None)) => {
                warn!("Relay {} closed before acknowledging {}", url, event_id);
                return (PublishOutcome::Unacknowledged, false);
            }
            Ok(Err(e)) => {
                warn!("Relay {} errored before acknowledging {}: {}", url, event_id, e);
                return (PublishOutcome::Unacknowledged, false);
            }
            Err(_) => {
                debug!("No acknowledgment from {} within {:?}", url, ack_timeout);
                return (PublishOutcome::Unacknowledged, true);
            }
        }
    }
}

async fn close_connection(url: &RelayUrl, connection: SharedConnection, limit: Duration) {
    match timeout(limit, async { connection.lock().await.close().await }).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Error closing relay {}: {}", url, e),
        Err(_) => warn!("Relay {} did not close within {:?}; dropping it", url, limit),
    }
}
