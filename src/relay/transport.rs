//! Relay transport capability
//!
//! The session only needs a text-frame duplex per relay. [`WebSocketTransport`]
//! provides it over `tokio-tungstenite`; tests plug in scripted fakes.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::relay::url::RelayUrl;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection. The session bounds this call with its connect timeout.
    async fn connect(&self, url: &RelayUrl) -> Result<Box<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame, or `None` once the relay has closed the connection.
    async fn recv_text(&mut self) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// WebSocket transport for `ws://` and `wss://` relays.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &RelayUrl) -> Result<Box<dyn Connection>> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| BridgeError::ConnectionFailed(format!("{}: {}", url, e)))?;
        debug!("WebSocket handshake with {} returned {}", url, response.status());
        Ok(Box::new(WebSocketConnection {
            url: url.clone(),
            stream,
        }))
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WebSocketConnection {
    url: RelayUrl,
    stream: WsStream,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| BridgeError::ConnectionFailed(format!("{}: {}", self.url, e)))
    }

    async fn recv_text(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!("Failed to answer ping from {}: {}", self.url, e);
                    }
                }
                Ok(Message::Close(_)) => return Ok(None),
                Ok(_) => {}
                Err(e) => {
                    return Err(BridgeError::ConnectionFailed(format!("{}: {}", self.url, e)))
                }
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| BridgeError::ConnectionFailed(format!("{}: {}", self.url, e)))
    }
}
