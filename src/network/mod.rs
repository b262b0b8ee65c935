//! A network abstraction layer for IoTConnect devices
//!
//! The SDK never opens sockets or performs TLS itself. The firmware or host
//! application supplies a byte stream through the traits below and the protocol
//! clients in [`application`] speak HTTP/1.1 and MQTT 3.1.1 over it.
//!

#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// URL helpers shared by discovery, sync and credential derivation
pub mod url;

/// Protocol client implementations
pub mod application;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connection, Read, TlsConnect, Write};
}

/// Read side of a byte stream.
///
/// `Ok(0)` means no data is available right now; the protocol clients treat it as
/// "nothing to do" while idle and as a closed stream in the middle of a packet.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Write side of a byte stream.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Orderly shutdown of a byte stream.
pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close {}

/// TLS parameters handed to a [`TlsConnect`] implementation.
///
/// Paths are passed through untouched; how they are resolved (file system, flash
/// partition, secure element slot) is up to the implementor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsOptions<'a> {
    /// Host name used for SNI and certificate verification.
    pub server_name: &'a str,
    /// CA bundle used to verify the server. `None` means the platform default.
    pub trust_store: Option<&'a str>,
    /// Device certificate (chain) for mutual TLS.
    pub client_cert: Option<&'a str>,
    /// Device private key for mutual TLS.
    pub client_key: Option<&'a str>,
}

impl<'a> TlsOptions<'a> {
    /// Server-authenticated TLS with no client certificate.
    pub fn server(server_name: &'a str, trust_store: Option<&'a str>) -> Self {
        Self {
            server_name,
            trust_store,
            client_cert: None,
            client_key: None,
        }
    }
}

/// Opens TLS-secured connections (client side).
pub trait TlsConnect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to `remote` (`host:port`) and complete the TLS handshake.
    fn connect_tls(
        &mut self,
        remote: &str,
        tls: &TlsOptions<'_>,
    ) -> Result<Self::Connection, Self::Error>;
}
