//! # Application Layer Protocols
//!
//! The two protocols an IoTConnect device speaks, both over the
//! [`Connection`](crate::network::Connection) traits:
//!
//! - **[`http`]**: HTTP/1.1 for the discovery and identity (sync) REST calls
//! - **[`mqtt`]**: MQTT 3.1.1 for the broker session
//!
//! Each client wraps an open connection, and each has a higher level adapter
//! ([`http::HttpsClient`], [`mqtt::BrokerConnection`]) that opens TLS
//! connections on demand and implements the interface the bootstrap and session
//! layers consume.

/// HTTP client implementation.
pub mod http;

/// MQTT client implementation.
pub mod mqtt;
