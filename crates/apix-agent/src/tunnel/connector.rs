//! Outbound WebSocket connector
//!
//! Opens the agent's persistent connection to the broker's `/ws` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use apix_core::config::AgentConfig;
use apix_core::error::ConnectionError;
use apix_core::{Connection, ConnectionId};
use apix_protocol::MAX_FRAME_SIZE;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Failures establishing the broker connection
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The broker did not complete the handshake in time
    #[error("Connection to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// TCP, TLS or WebSocket handshake failure
    #[error("Failed to connect to {url}: {source}")]
    Handshake {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
}

/// Establishes WebSocket connections to the broker
pub struct TunnelConnector {
    /// Broker `/ws` URL
    url: String,
    /// Limit on TCP + TLS + upgrade
    connect_timeout: Duration,
}

impl TunnelConnector {
    /// Create a connector for the broker named in the configuration
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            url: config.ws_url(),
            connect_timeout: config.connect_timeout,
        }
    }

    /// Broker WebSocket URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Attempt a single connection to the broker
    pub async fn connect(&self) -> Result<WsClientConnection, ConnectError> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_FRAME_SIZE);
        ws_config.max_frame_size = Some(MAX_FRAME_SIZE);

        tracing::debug!("Connecting to {}", self.url);
        let (socket, _response) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async_with_config(self.url.as_str(), Some(ws_config), false),
        )
        .await
        .map_err(|_| ConnectError::Timeout {
            url: self.url.clone(),
            timeout: self.connect_timeout,
        })?
        .map_err(|source| ConnectError::Handshake {
            url: self.url.clone(),
            source,
        })?;

        let connection = WsClientConnection::new(socket);
        tracing::info!("Connected to broker at {} ({})", self.url, connection.id());
        Ok(connection)
    }
}

/// Agent end of the broker WebSocket
pub struct WsClientConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WsClientConnection {
    fn new(socket: WsStream) -> Self {
        let (sink, stream) = socket.split();
        Self {
            id: ConnectionId::next(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

#[async_trait]
impl Connection for WsClientConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, text: String) -> Result<(), ConnectionError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    ConnectionError::Closed
                }
                other => ConnectionError::Send(other.to_string()),
            })
    }

    async fn receive(&self) -> Result<String, ConnectionError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Ok(text),
                    Err(_) => tracing::debug!("{}: dropping non-UTF-8 binary message", self.id),
                },
                Some(Ok(Message::Close(_))) | None => return Err(ConnectionError::Closed),
                Some(Ok(_)) => {}
                Some(Err(tungstenite::Error::ConnectionClosed)) => {
                    return Err(ConnectionError::Closed)
                }
                Some(Err(e)) => return Err(ConnectionError::Receive(e.to_string())),
            }
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| ConnectionError::Send(e.to_string()))
    }
}
