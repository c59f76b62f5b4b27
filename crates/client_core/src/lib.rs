use std::sync::Arc;

use storage::SharedStore;
use tracing::info;
use url::Url;

pub mod commands;
pub mod connection;
pub mod console;
pub mod error;
pub mod event_bus;
pub mod layout;
pub mod progress;
pub mod transport;
pub mod view;

pub use commands::{Command, CommandClient};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use console::{Console, ConsoleOptions, ConsoleSnapshot, ConsoleTail, RenderedLine};
pub use error::{CommandError, ConnectionError, EndpointError, TransportError};
pub use event_bus::EventBus;
pub use transport::{push_endpoint, PushConnector, TungsteniteConnector};

/// A console wired to a live push connection for one page.
pub struct LiveConsole {
    pub bus: Arc<EventBus>,
    pub console: Console,
    pub connection: Arc<ConnectionManager>,
}

impl LiveConsole {
    /// Derives the push endpoint from `page_url`, attaches a console to a
    /// fresh bus and starts connecting.
    ///
    /// The console subscribes before the first connection attempt so the
    /// opening `console.clear` and every early frame reach it.
    pub fn start(
        page_url: &Url,
        connection: ConnectionConfig,
        options: ConsoleOptions,
        store: Option<SharedStore>,
        connector: Arc<dyn PushConnector>,
    ) -> Result<Self, EndpointError> {
        let endpoint = push_endpoint(page_url)?;
        let bus = Arc::new(EventBus::new());
        let console = Console::new(options, store);
        console.attach(&bus);
        info!(page = %page_url, endpoint = %endpoint, "starting live console");
        let connection = ConnectionManager::start(endpoint, connection, connector, Arc::clone(&bus));
        Ok(Self {
            bus,
            console,
            connection,
        })
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
