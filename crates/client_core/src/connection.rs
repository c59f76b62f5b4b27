use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::{stream::BoxStream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use shared::protocol::{Frame, CONNECTION_EXHAUSTED, CONSOLE_CLEAR};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    error::{ConnectionError, TransportError},
    event_bus::EventBus,
    transport::PushConnector,
};

pub const RETRY_LIMIT: u32 = 5;
pub const RETRY_WAIT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub retry_limit: u32,
    pub retry_wait: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_limit: RETRY_LIMIT,
            retry_wait: RETRY_WAIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Connecting,
    Open,
    RetryWait,
    /// Automatic reconnection gave up. Only an explicit `connect()` leaves it.
    Exhausted,
}

struct ConnectionInner {
    state: ConnectionState,
    retry_budget: u32,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

/// Owns the single push connection of the process.
///
/// Construct it once and hand the `Arc` to whoever needs to send or observe
/// state; subscribers attach to the shared [`EventBus`].
pub struct ConnectionManager {
    endpoint: Url,
    config: ConnectionConfig,
    connector: Arc<dyn PushConnector>,
    bus: Arc<EventBus>,
    inner: Mutex<ConnectionInner>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        endpoint: Url,
        config: ConnectionConfig,
        connector: Arc<dyn PushConnector>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Init);
        Arc::new(Self {
            endpoint,
            config,
            connector,
            bus,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Init,
                retry_budget: config.retry_limit,
                outbound: None,
            }),
            state_tx,
        })
    }

    /// Builds the manager and immediately starts connecting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        endpoint: Url,
        config: ConnectionConfig,
        connector: Arc<dyn PushConnector>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let manager = Self::new(endpoint, config, connector, bus);
        manager.connect();
        manager
    }

    /// Starts a connection attempt unless one is open or already pending.
    /// Returns whether a new attempt was started.
    pub fn connect(self: &Arc<Self>) -> bool {
        {
            let mut inner = self.lock_inner();
            match inner.state {
                ConnectionState::Connecting | ConnectionState::Open | ConnectionState::RetryWait => {
                    debug!(state = ?inner.state, "push: connect ignored");
                    return false;
                }
                ConnectionState::Init | ConnectionState::Exhausted => {
                    inner.state = ConnectionState::Connecting;
                }
            }
        }
        self.state_tx.send_replace(ConnectionState::Connecting);

        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run().await });
        true
    }

    pub fn state(&self) -> ConnectionState {
        self.lock_inner().state
    }

    pub fn retry_budget(&self) -> u32 {
        self.lock_inner().retry_budget
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Waits until the connection is open.
    ///
    /// Fails once automatic reconnection is exhausted or `limit` elapses first.
    pub async fn wait_until_open(&self, limit: Duration) -> Result<(), ConnectionError> {
        let mut states = self.state_tx.subscribe();
        let settled = tokio::time::timeout(
            limit,
            states.wait_for(|state| {
                matches!(state, ConnectionState::Open | ConnectionState::Exhausted)
            }),
        )
        .await
        .map_err(|_| ConnectionError::OpenTimeout(limit))?
        .map(|state| *state)
        .map_err(|_| ConnectionError::NotConnected(self.state()))?;

        match settled {
            ConnectionState::Open => Ok(()),
            state => Err(ConnectionError::NotConnected(state)),
        }
    }

    /// Sends `message` as one frame. Nothing is queued while disconnected.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<(), ConnectionError> {
        let value = serde_json::to_value(message)?;
        if !value.is_object() {
            return Err(ConnectionError::NotAnObject);
        }
        let text = serde_json::to_string(&value)?;

        let inner = self.lock_inner();
        let outbound = match (&inner.state, &inner.outbound) {
            (ConnectionState::Open, Some(outbound)) => outbound,
            (state, _) => return Err(ConnectionError::NotConnected(*state)),
        };
        outbound
            .send(text)
            .map_err(|_| ConnectionError::NotConnected(inner.state))
    }

    pub fn send_frame(&self, frame: &Frame) -> Result<(), ConnectionError> {
        self.send(frame)
    }

    async fn run(self: Arc<Self>) {
        loop {
            match self.connector.connect(&self.endpoint).await {
                Ok(channel) => {
                    self.on_open(channel.outbound);
                    self.pump(channel.inbound).await;
                    info!(endpoint = %self.endpoint, "push: connection lost");
                }
                Err(err) => {
                    warn!(endpoint = %self.endpoint, "push: connection attempt failed: {err}");
                }
            }

            if !self.begin_retry_wait() {
                return;
            }
            tokio::time::sleep(self.config.retry_wait).await;
            self.set_state(ConnectionState::Connecting);
        }
    }

    fn on_open(&self, outbound: mpsc::UnboundedSender<String>) {
        {
            let mut inner = self.lock_inner();
            inner.state = ConnectionState::Open;
            inner.retry_budget = self.config.retry_limit;
            inner.outbound = Some(outbound);
        }
        info!(endpoint = %self.endpoint, "push: connection open");
        self.bus.publish(CONSOLE_CLEAR, &Value::Null);
        // Watchers of `Open` must see the cleared console.
        self.state_tx.send_replace(ConnectionState::Open);
    }

    async fn pump(&self, mut inbound: BoxStream<'static, Result<String, TransportError>>) {
        while let Some(item) = inbound.next().await {
            match item {
                Ok(text) => self.handle_frame(&text),
                Err(err) => {
                    warn!("push: inbound stream failed: {err}");
                    break;
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match Frame::decode(text) {
            Ok(Some(frame)) => self.bus.dispatch_frame(&frame),
            Ok(None) => debug!("push: ignoring empty frame"),
            Err(err) => warn!("push: ignoring malformed frame: {err}"),
        }
    }

    /// Moves to `RetryWait` and spends one retry, or to `Exhausted` when the
    /// budget is gone. Returns whether a retry should follow.
    fn begin_retry_wait(&self) -> bool {
        let (next, budget) = {
            let mut inner = self.lock_inner();
            inner.outbound = None;
            if inner.retry_budget == 0 {
                inner.state = ConnectionState::Exhausted;
            } else {
                inner.retry_budget -= 1;
                inner.state = ConnectionState::RetryWait;
            }
            (inner.state, inner.retry_budget)
        };
        self.state_tx.send_replace(next);

        if next == ConnectionState::Exhausted {
            error!(
                endpoint = %self.endpoint,
                retry_limit = self.config.retry_limit,
                "push: reconnect attempts exhausted; live updates stopped"
            );
            self.bus.publish(CONNECTION_EXHAUSTED, &Value::Null);
            return false;
        }
        info!(
            remaining = budget,
            wait = ?self.config.retry_wait,
            "push: scheduling reconnect"
        );
        true
    }

    fn set_state(&self, state: ConnectionState) {
        self.lock_inner().state = state;
        self.state_tx.send_replace(state);
    }

    fn lock_inner(&self) -> MutexGuard<'_, ConnectionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
