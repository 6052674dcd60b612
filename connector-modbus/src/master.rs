//! Master capability: the Modbus client that performs the actual reads.
//!
//! The connector only needs two read operations and a liveness check, so the
//! master is abstracted behind [`ModbusMaster`]. [`MasterFactory`] builds a
//! master for an [`Endpoint`]; [`TokioModbusFactory`] is the production
//! implementation on top of `tokio-modbus`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_modbus::client::{Context, Reader};
use tokio_modbus::prelude::*;
use tracing::{debug, warn};

use crate::config::Protocol;
use crate::error::{ConnectionError, MasterError};

/// Framing used on top of the TCP stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Modbus ASCII framing.
    Ascii,
    /// Native Modbus TCP (MBAP header).
    Tcp,
    /// Modbus RTU framing tunneled over the stream.
    Rtu,
}

impl Framing {
    /// Choose framing from configuration. ASCII wins over the protocol setting.
    pub fn select(protocol: Protocol, use_ascii: bool) -> Self {
        if use_ascii {
            Framing::Ascii
        } else if protocol == Protocol::Tcp {
            Framing::Tcp
        } else {
            Framing::Rtu
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Ascii => "ascii",
            Framing::Tcp => "tcp",
            Framing::Rtu => "rtu",
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to reach a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub framing: Framing,
}

impl Endpoint {
    /// `host:port` form of this endpoint.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.framing)
    }
}

/// A connected Modbus master.
#[async_trait]
pub trait ModbusMaster: Send {
    /// Read `count` holding registers (function 0x03).
    async fn read_holding_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, MasterError>;

    /// Read `count` input registers (function 0x04).
    async fn read_input_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, MasterError>;

    /// Returns `false` once the underlying transport is known to be broken.
    ///
    /// This reflects the outcome of the last request only. A peer that closed
    /// the stream while the master sat idle still reports `true`; the next
    /// request fails with a transport error and the connection is rebuilt
    /// before the request after it.
    fn is_connected(&self) -> bool;

    /// Close the transport. The master must not be used afterwards.
    async fn disconnect(&mut self);
}

/// Builds connected masters.
#[async_trait]
pub trait MasterFactory: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ModbusMaster>, ConnectionError>;
}

/// [`MasterFactory`] backed by `tokio-modbus`.
///
/// Supports TCP-native and RTU framing. ASCII framing is not implemented by
/// `tokio-modbus` and is rejected with [`ConnectionError::UnsupportedFraming`].
#[derive(Debug, Clone)]
pub struct TokioModbusFactory {
    connect_timeout: Duration,
}

impl TokioModbusFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn open_stream(&self, endpoint: &Endpoint) -> Result<TcpStream, ConnectionError> {
        let address = endpoint.address();

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ConnectionError::Timeout {
                endpoint: address.clone(),
                timeout: self.connect_timeout,
            })?
            .map_err(|source| ConnectionError::Io {
                endpoint: address.clone(),
                source,
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(endpoint = %address, error = %e, "Failed to set TCP_NODELAY");
        }

        Ok(stream)
    }
}

#[async_trait]
impl MasterFactory for TokioModbusFactory {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ModbusMaster>, ConnectionError> {
        let ctx = match endpoint.framing {
            Framing::Ascii => {
                return Err(ConnectionError::UnsupportedFraming {
                    framing: Framing::Ascii,
                });
            }
            Framing::Tcp => tcp::attach_slave(self.open_stream(endpoint).await?, Slave(1)),
            Framing::Rtu => rtu::attach_slave(self.open_stream(endpoint).await?, Slave(1)),
        };

        Ok(Box::new(TokioModbusMaster {
            ctx,
            endpoint: endpoint.address(),
            connected: true,
        }))
    }
}

/// A `tokio-modbus` client context plus its health flag.
///
/// The flag is cleared by a failed request, never by probing the socket:
/// the stream is owned by the `tokio-modbus` context.
#[derive(Debug)]
pub struct TokioModbusMaster {
    ctx: Context,
    endpoint: String,
    connected: bool,
}

impl TokioModbusMaster {
    fn settle(&mut self, result: tokio_modbus::Result<Vec<u16>>) -> Result<Vec<u16>, MasterError> {
        match result {
            Ok(Ok(words)) => Ok(words),
            Ok(Err(exception)) => Err(MasterError::Exception(format!("{:?}", exception))),
            Err(e) => {
                let err = MasterError::from(e);
                if err.breaks_connection() {
                    self.connected = false;
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ModbusMaster for TokioModbusMaster {
    async fn read_holding_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, MasterError> {
        self.ctx.set_slave(Slave(unit));
        let result = self.ctx.read_holding_registers(address, count).await;
        self.settle(result)
    }

    async fn read_input_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, MasterError> {
        self.ctx.set_slave(Slave(unit));
        let result = self.ctx.read_input_registers(address, count).await;
        self.settle(result)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn disconnect(&mut self) {
        self.connected = false;
        if let Err(e) = self.ctx.disconnect().await {
            warn!(endpoint = %self.endpoint, error = %e, "Error disconnecting from Modbus device");
        }
    }
}

impl From<tokio_modbus::Error> for MasterError {
    fn from(e: tokio_modbus::Error) -> Self {
        match e {
            tokio_modbus::Error::Transport(io) => MasterError::Transport(io),
            other => MasterError::Protocol(other.to_string()),
        }
    }
}
