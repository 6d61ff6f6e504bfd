use thiserror::Error;

/// Failures reported back to whoever called into the chat core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("not connected to the assistant")]
    NotConnected,
    #[error("chat session has been shut down")]
    ManagerStopped,
}

/// Failures of the underlying socket. These never leave the manager; they
/// feed the reconnect path instead.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint '{0}': {1}")]
    InvalidEndpoint(String, url::ParseError),
    #[error("unsupported endpoint scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed")]
    Closed,
}
