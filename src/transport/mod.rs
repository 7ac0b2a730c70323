pub mod stomp;

use crate::error::ChatError;
use async_trait::async_trait;

/// Callbacks from the messaging client, delivered in order on one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Fired after the handshake, and again after every reconnect.
    Connected,
    /// A message on one of the subscribed destinations.
    Message {
        destination: String,
        body: String,
    },
    /// Broker ERROR frame or socket failure.
    Error(String),
    /// The socket went away. The transport may already be reconnecting.
    Disconnected,
}

/// Narrow contract the connection manager needs from a pub/sub client.
#[async_trait]
pub trait Transport: Send {
    /// Starts connecting. Outcome arrives later as a `TransportEvent`.
    async fn open(&mut self) -> Result<(), ChatError>;

    async fn subscribe(&mut self, destination: &str) -> Result<(), ChatError>;

    async fn send(&mut self, destination: &str, body: String) -> Result<(), ChatError>;

    /// Flushes pending sends, then tears the connection down.
    async fn close(&mut self) -> Result<(), ChatError>;
}
