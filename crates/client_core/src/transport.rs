//! Push channel transports.

use async_trait::async_trait;
use futures::{future, stream::BoxStream, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::{Host, Url};

use crate::error::{EndpointError, TransportError};

/// An established push channel.
///
/// `inbound` ends when the peer goes away; an `Err` item means the channel
/// broke and no further items will follow. Text pushed into `outbound` is
/// written as one frame each.
pub struct PushChannel {
    pub inbound: BoxStream<'static, Result<String, TransportError>>,
    pub outbound: mpsc::UnboundedSender<String>,
}

#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, endpoint: &Url) -> Result<PushChannel, TransportError>;
}

/// Derives the push endpoint from the console page URL: same host, next port.
pub fn push_endpoint(page_url: &Url) -> Result<Url, EndpointError> {
    let scheme = match page_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };
    let host = page_url.host().ok_or(EndpointError::MissingHost)?;
    let port = page_url
        .port_or_known_default()
        .ok_or(EndpointError::MissingPort)?;
    let push_port = port
        .checked_add(1)
        .ok_or(EndpointError::PortOverflow(port))?;
    let host = match host {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => format!("[{addr}]"),
    };
    Ok(Url::parse(&format!("{scheme}://{host}:{push_port}/"))?)
}

pub struct TungsteniteConnector;

#[async_trait]
impl PushConnector for TungsteniteConnector {
    async fn connect(&self, endpoint: &Url) -> Result<PushChannel, TransportError> {
        let (ws_stream, _) =
            connect_async(endpoint.as_str())
                .await
                .map_err(|source| TransportError::Handshake {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
        let (mut ws_writer, ws_reader) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!("push: websocket send failed: {err}");
                    break;
                }
            }
            let _ = ws_writer.close().await;
            debug!("push: outbound writer stopped");
        });

        let inbound = ws_reader
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(bytes)) => {
                        Some(String::from_utf8(bytes).map_err(|_| TransportError::InvalidUtf8))
                    }
                    Ok(_) => None,
                    Err(err) => Some(Err(TransportError::Receive(err))),
                })
            })
            .boxed();

        Ok(PushChannel { inbound, outbound })
    }
}

pub mod memory {
    //! Loopback connector: every accepted connection hands its far end to the
    //! caller as a [`MemoryPeer`].

    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, PoisonError,
    };

    use async_trait::async_trait;
    use futures::StreamExt;
    use tokio::{sync::mpsc, time::Instant};
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use url::Url;

    use super::{PushChannel, PushConnector};
    use crate::error::TransportError;

    /// Far end of an in-memory push channel. Dropping it closes the channel.
    pub struct MemoryPeer {
        pub frames: mpsc::UnboundedSender<Result<String, TransportError>>,
        pub outbound: mpsc::UnboundedReceiver<String>,
    }

    impl MemoryPeer {
        pub fn push(&self, text: impl Into<String>) -> bool {
            self.frames.send(Ok(text.into())).is_ok()
        }

        pub fn fail(&self, error: TransportError) -> bool {
            self.frames.send(Err(error)).is_ok()
        }
    }

    pub struct MemoryConnector {
        refusing: AtomicBool,
        attempts: Mutex<Vec<Instant>>,
        peers: mpsc::UnboundedSender<MemoryPeer>,
    }

    impl MemoryConnector {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
            let (peers, peers_rx) = mpsc::unbounded_channel();
            (
                Self {
                    refusing: AtomicBool::new(false),
                    attempts: Mutex::new(Vec::new()),
                    peers,
                },
                peers_rx,
            )
        }

        /// While refusing, every handshake fails.
        pub fn set_refusing(&self, refusing: bool) {
            self.refusing.store(refusing, Ordering::SeqCst);
        }

        /// Times at which handshakes were attempted.
        pub fn attempts(&self) -> Vec<Instant> {
            self.attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl PushConnector for MemoryConnector {
        async fn connect(&self, endpoint: &Url) -> Result<PushChannel, TransportError> {
            self.attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Instant::now());
            if self.refusing.load(Ordering::SeqCst) {
                return Err(TransportError::Refused(endpoint.to_string()));
            }

            let (frames, frames_rx) = mpsc::unbounded_channel();
            let (outbound, outbound_rx) = mpsc::unbounded_channel();
            let peer = MemoryPeer {
                frames,
                outbound: outbound_rx,
            };
            if self.peers.send(peer).is_err() {
                return Err(TransportError::Refused(endpoint.to_string()));
            }

            Ok(PushChannel {
                inbound: UnboundedReceiverStream::new(frames_rx).boxed(),
                outbound,
            })
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
