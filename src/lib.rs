//! # iotconnect - device SDK for the IoTConnect platform
//!
//! Gets a device from "configured" to "connected and exchanging messages":
//!
//! 1. **Discovery** resolves the identity service for a company id and
//!    environment.
//! 2. **Sync** exchanges the device's unique id for broker host, client id,
//!    credentials seed and topics.
//! 3. **Credential derivation** produces the broker password. Symmetric-key
//!    devices sign a SAS token locally.
//! 4. **Session** opens the MQTT connection, subscribes to the cloud-to-device
//!    topic and runs until the application or the platform closes it.
//!
//! The crate is `no_std` + `alloc`. Sockets, TLS and time come from the
//! platform through [`network::TlsConnect`] and [`clock::Clock`], or the
//! application replaces the built-in HTTP and MQTT clients entirely by
//! implementing [`bootstrap::HttpsTransport`] and [`session::MqttTransport`].
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! iotconnect = "0.1.0"
//! ```
//!
//! ```rust,no_run
//! use iotconnect::auth::{AuthCredential, AuthInfo};
//! use iotconnect::config::{ClientConfig, ConnectionType, DeviceIdentity};
//! use iotconnect::session::{Callbacks, Delivery, Event, Session};
//! # use iotconnect::bootstrap::{HttpResponse, HttpsTransport};
//! # use iotconnect::session::{ConnectParams, InboundMessage, MqttTransport, TransportError};
//! # use iotconnect::network::application::mqtt::QoS;
//! # struct Https;
//! # impl HttpsTransport for Https {
//! #     type Error = ();
//! #     fn request(&mut self, _: &str, _: Option<&str>) -> Result<HttpResponse, ()> { Err(()) }
//! # }
//! # struct Mqtt;
//! # impl MqttTransport for Mqtt {
//! #     fn connect(&mut self, _: &ConnectParams<'_>) -> Result<(), TransportError> { Ok(()) }
//! #     fn subscribe(&mut self, _: &str, _: QoS) -> Result<(), TransportError> { Ok(()) }
//! #     fn publish(&mut self, _: &str, _: &[u8], _: QoS, _: Delivery) -> Result<(), TransportError> { Ok(()) }
//! #     fn poll(&mut self) -> Result<Option<InboundMessage>, TransportError> { Ok(None) }
//! #     fn disconnect(&mut self, _: u32) -> Result<(), TransportError> { Ok(()) }
//! #     fn is_connected(&self) -> bool { true }
//! # }
//! # struct Rtc;
//! # impl iotconnect::clock::Clock for Rtc { fn now_millis(&self) -> u64 { 0 } }
//!
//! let auth = AuthInfo::new(
//!     "certs/root-ca.pem",
//!     AuthCredential::SymmetricKey { key: "c2VjcmV0".into() },
//! );
//! let config = ClientConfig::new(
//!     ConnectionType::Azure,
//!     DeviceIdentity::new("my-cpid", "my-env", "sensor-01"),
//!     auth,
//! )
//! .with_callbacks(Callbacks::new().on_command(|command, outbox| {
//!     outbox.publish(command.command.as_bytes().to_vec());
//! }));
//!
//! let mut session = Session::new(config, Https, Mqtt, Rtc);
//! session.init()?;
//! session.publish_telemetry(br#"{"temperature":21.5}"#, Delivery::Acknowledged)?;
//! while session.is_connected() {
//!     session.receive()?;
//! }
//! # Ok::<(), iotconnect::Error>(())
//! ```
//!
//! ## Optional Features
//!
//! - `std`: [`clock::SystemClock`] (default: disabled)
//! - `defmt`: log through `defmt` and implement `defmt::Format` for public types
//! - `tracing`: log through `tracing`

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

extern crate alloc;

#[macro_use]
mod fmt;

/// Authentication material and SAS token derivation.
pub mod auth;

/// Discovery and identity sync over HTTPS.
pub mod bootstrap;

/// Cloud-to-device message decoding.
pub mod c2d;

pub mod clock;

/// Client configuration and validation.
pub mod config;

pub mod error;

/// Network abstraction layer and the built-in HTTP and MQTT clients.
pub mod network;

/// Session lifecycle.
pub mod session;

pub use config::{ClientConfig, ConnectionType, DeviceIdentity};
pub use error::{Error, Result};
pub use session::{ConnectionStatus, Event, Session, SessionState};
