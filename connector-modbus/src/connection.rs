//! Lifecycle of the single connection to a device.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::master::{Endpoint, MasterFactory, ModbusMaster};

/// State of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No master exists; the next use connects.
    Unconnected,
    /// A master exists and was healthy after its last use.
    Connected,
    /// The master reported its transport as closed.
    Disconnected,
    /// A read failed in a way that leaves the stream unusable.
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unconnected => write!(f, "unconnected"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Faulted => write!(f, "faulted"),
        }
    }
}

/// Owns the master for one device and keeps it usable.
///
/// The connection is established lazily on the first [`ensure_connected`]
/// call. A broken connection is torn down completely and rebuilt on the next
/// call; a failed attempt leaves the manager [`ConnectionState::Unconnected`]
/// and is retried on the call after that, never in a loop.
///
/// [`ensure_connected`]: ConnectionManager::ensure_connected
pub struct ConnectionManager<F> {
    factory: F,
    endpoint: Endpoint,
    state: ConnectionState,
    master: Option<Box<dyn ModbusMaster>>,
}

impl<F: MasterFactory> ConnectionManager<F> {
    pub fn new(factory: F, endpoint: Endpoint) -> Self {
        Self {
            factory,
            endpoint,
            state: ConnectionState::Unconnected,
            master: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Return a live master, reconnecting from scratch if needed.
    pub async fn ensure_connected(&mut self) -> Result<&mut dyn ModbusMaster, ConnectionError> {
        if self.state == ConnectionState::Connected
            && self.master.as_ref().is_some_and(|m| !m.is_connected())
        {
            self.state = ConnectionState::Disconnected;
        }

        if matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Faulted
        ) {
            warn!(endpoint = %self.endpoint, state = %self.state, "Connection lost, reconnecting");
            self.teardown().await;
        }

        let master = match self.master.take() {
            Some(master) => master,
            None => self.connect().await?,
        };

        Ok(&mut **self.master.insert(master))
    }

    /// Flag the current connection as unusable; the next
    /// [`ensure_connected`](Self::ensure_connected) call rebuilds it.
    pub fn mark_faulted(&mut self) {
        if self.state == ConnectionState::Connected {
            debug!(endpoint = %self.endpoint, "Marking connection faulted");
            self.state = ConnectionState::Faulted;
        }
    }

    /// Close the connection, if any.
    pub async fn dispose(&mut self) {
        if self.master.is_some() {
            info!(endpoint = %self.endpoint, "Closing Modbus connection");
        }
        self.teardown().await;
    }

    async fn connect(&mut self) -> Result<Box<dyn ModbusMaster>, ConnectionError> {
        info!(endpoint = %self.endpoint, "Connecting to Modbus device");

        match self.factory.connect(&self.endpoint).await {
            Ok(master) => {
                self.state = ConnectionState::Connected;
                info!(endpoint = %self.endpoint, "Connected to Modbus device");
                Ok(master)
            }
            Err(e) => {
                self.state = ConnectionState::Unconnected;
                warn!(endpoint = %self.endpoint, error = %e, "Failed to connect to Modbus device");
                Err(e)
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut master) = self.master.take() {
            master.disconnect().await;
        }
        self.state = ConnectionState::Unconnected;
    }
}
