//! MQTT 3.1.1 for IoTConnect brokers.
//!
//! [`Client`] encodes and decodes packets over any [`Connection`](crate::network::Connection).
//! [`BrokerConnection`] adds TLS connection setup, acknowledgement waits and
//! keep-alive on top of it and implements the session's
//! [`MqttTransport`](crate::session::MqttTransport) interface.

/// Packet-level client.
pub mod client;

/// Session-level transport.
pub mod broker;

pub use broker::BrokerConnection;
pub use client::{Client, ConnectError, Options, Packet, PublishPacket, QoS};
