//! The MQTT collaborator the session drives.

use crate::auth::AuthCredential;
use crate::network::application::mqtt::QoS;
use crate::network::error::Error as NetworkError;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Port every IoTConnect broker listens on (MQTT over TLS).
pub const MQTT_PORT: u16 = 8883;

/// How long a confirmed publish may wait for its acknowledgement.
pub const PUBLISH_TIMEOUT_MS: u32 = 10_000;

/// Upper bound handed to [`MqttTransport::disconnect`].
pub const DISCONNECT_TIMEOUT_MS: u32 = 10_000;

/// Keep-alive interval requested on connect.
pub const KEEP_ALIVE_SECS: u16 = 60;

/// Delivery guarantee requested for one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Publish at the configured QoS and block (up to [`PUBLISH_TIMEOUT_MS`])
    /// until the broker acknowledges it.
    Acknowledged,
    /// Publish at QoS 0 and return as soon as the bytes are written.
    ///
    /// This is the degraded mode used for replies sent from inside a message
    /// callback: waiting there for a PUBACK would need the very receive loop that
    /// is busy running the callback.
    FireAndForget,
}

/// Everything needed to open an authenticated broker session.
#[derive(Debug, Clone, Copy)]
pub struct ConnectParams<'a> {
    /// Broker host from sync.
    pub host: &'a str,
    /// Broker port, normally [`MQTT_PORT`].
    pub port: u16,
    /// MQTT client id from sync.
    pub client_id: &'a str,
    /// MQTT user name; `None` on AWS.
    pub username: Option<&'a str>,
    /// SAS token or broker token, depending on the credential.
    pub password: Option<&'a str>,
    /// CA bundle for broker verification.
    pub trust_store: &'a str,
    /// Active credential; X.509 and TPM material is used for the TLS handshake.
    pub credential: &'a AuthCredential,
    /// Keep-alive interval.
    pub keep_alive_seconds: u16,
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic it arrived on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Payload as UTF-8, if it is.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}

/// A failure reported by the MQTT transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Byte stream or TLS failure.
    Network(NetworkError),
    /// CONNACK return code 1..=5.
    Refused(u8),
    /// The broker refused the subscription (SUBACK 0x80).
    SubscribeRefused,
    /// No acknowledgement within the allowed time.
    Timeout,
    /// The operation needs a live session.
    NotConnected,
    /// A code from a foreign MQTT stack.
    Code(i32),
}

impl From<NetworkError> for TransportError {
    fn from(err: NetworkError) -> Self {
        TransportError::Network(err)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(err) => write!(f, "{}", err),
            TransportError::Refused(code) => write!(f, "broker refused connection (code {})", code),
            TransportError::SubscribeRefused => f.write_str("broker refused subscription"),
            TransportError::Timeout => f.write_str("timed out waiting for broker"),
            TransportError::NotConnected => f.write_str("not connected"),
            TransportError::Code(code) => write!(f, "transport error {}", code),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TransportError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            TransportError::Network(err) => defmt::write!(f, "Network({})", err),
            TransportError::Refused(code) => defmt::write!(f, "Refused({=u8})", code),
            TransportError::SubscribeRefused => defmt::write!(f, "SubscribeRefused"),
            TransportError::Timeout => defmt::write!(f, "Timeout"),
            TransportError::NotConnected => defmt::write!(f, "NotConnected"),
            TransportError::Code(code) => defmt::write!(f, "Code({=i32})", code),
        }
    }
}

/// MQTT session operations.
///
/// Implemented by [`BrokerConnection`](crate::network::application::mqtt::BrokerConnection)
/// for the built-in client; firmware with its own MQTT stack implements it
/// directly. Message delivery is pull-based: the session calls [`poll`] from the
/// application's loop and never from a transport-owned thread.
///
/// [`poll`]: MqttTransport::poll
pub trait MqttTransport {
    /// Opens the TLS connection and MQTT session.
    fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), TransportError>;

    /// Subscribes and waits for the broker to grant it.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Publishes one message.
    ///
    /// With [`Delivery::Acknowledged`] and QoS 1 this blocks until the PUBACK
    /// arrives or [`PUBLISH_TIMEOUT_MS`] elapses.
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        delivery: Delivery,
    ) -> Result<(), TransportError>;

    /// Returns the next inbound message, if any.
    ///
    /// An `Err` means the connection is gone.
    fn poll(&mut self) -> Result<Option<InboundMessage>, TransportError>;

    /// Ends the session and releases every resource, even when the broker cannot
    /// be told.
    fn disconnect(&mut self, timeout_ms: u32) -> Result<(), TransportError>;

    /// Whether a session is currently open.
    fn is_connected(&self) -> bool;
}
