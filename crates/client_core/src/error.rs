use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::connection::ConnectionState;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        source: tungstenite::Error,
    },
    #[error("websocket receive failed: {0}")]
    Receive(tungstenite::Error),
    #[error("received binary frame that is not UTF-8")]
    InvalidUtf8,
    #[error("connection to {0} refused")]
    Refused(String),
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("page url scheme '{0}' has no push channel equivalent")]
    UnsupportedScheme(String),
    #[error("page url has no host")]
    MissingHost,
    #[error("page url has no port and no default port for its scheme")]
    MissingPort,
    #[error("page port {0} leaves no room for the push port")]
    PortOverflow(u16),
    #[error("derived push endpoint is invalid: {0}")]
    Invalid(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("push connection is not open (state: {0:?})")]
    NotConnected(ConnectionState),
    #[error("push connection did not open within {0:?}")]
    OpenTimeout(std::time::Duration),
    #[error("outbound message must encode to a JSON object")]
    NotAnObject,
    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid command base url: {0}")]
    InvalidBase(#[from] url::ParseError),
    #[error("command request failed: {0}")]
    Http(#[from] reqwest::Error),
}
