//! Transport seam for the connection manager
//!
//! The manager only speaks text frames through these traits; the production
//! implementation rides `tokio-tungstenite`. Keeping the seam this narrow
//! lets tests drive the whole state machine with scripted transports.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The server refused the connection attempt outright. Fatal for the
    /// current credential; the manager will not retry with it.
    #[error("connection rejected: unauthorized")]
    Unauthorized,

    /// Anything retriable: dial failures, abnormal closures, broken pipes
    #[error("transport failure: {0}")]
    Failed(String),
}

/// One live bidirectional channel
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Next inbound text frame. `Ok(None)` is a graceful close from the
    /// server; `Err` is an abnormal closure.
    async fn recv_text(&mut self) -> Result<Option<String>, TransportError>;

    /// Best-effort close; errors are irrelevant at this point
    async fn close(&mut self);
}

/// Dials new transports carrying the identity credential
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, token: &str) -> Result<Box<dyn Transport>, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production connector over `tokio-tungstenite`
pub struct WsConnector {
    endpoint: String,
}

impl WsConnector {
    /// `endpoint` is the WebSocket URL without query, e.g. `ws://host:3030/ws`
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, token: &str) -> Result<Box<dyn Transport>, TransportError> {
        let url = format!("{}?token={}", self.endpoint, token);
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => Ok(Box::new(WsTransport { inner: stream })),
            Err(tokio_tungstenite::tungstenite::Error::Http(response))
                if response.status() == 401 =>
            {
                Err(TransportError::Unauthorized)
            }
            Err(err) => Err(TransportError::Failed(err.to_string())),
        }
    }
}

struct WsTransport {
    inner: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))
    }

    async fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(frame))) => {
                    let graceful = frame
                        .as_ref()
                        .map(|f| f.code == CloseCode::Normal || f.code == CloseCode::Away)
                        .unwrap_or(false);
                    if graceful {
                        return Ok(None);
                    }
                    return Err(TransportError::Failed(format!(
                        "abnormal close: {:?}",
                        frame.map(|f| f.code)
                    )));
                }
                // Control and binary frames are transparent to the protocol
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(TransportError::Failed(err.to_string())),
                None => return Err(TransportError::Failed("connection reset".to_string())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}
