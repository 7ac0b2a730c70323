use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("a username is required before connecting")]
    MissingIdentity,

    #[error("transport is not running")]
    TransportClosed,

    #[error("invalid broker url: {0}")]
    InvalidUrl(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed STOMP frame: {0}")]
    Frame(String),

    #[error("broker reported error: {0}")]
    Broker(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<url::ParseError> for ChatError {
    fn from(e: url::ParseError) -> Self {
        ChatError::InvalidUrl(e.to_string())
    }
}
