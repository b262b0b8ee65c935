//! Session lifecycle.
//!
//! A [`Session`] owns the configuration, the two network collaborators and the
//! bootstrap results, and moves through
//!
//! ```text
//! Uninitialized ──init──▶ Bootstrapping ──▶ Connected ──disconnect / close / lost──▶ Disconnected
//!                               │   ▲            │
//!                               ▼   └─ resync ───┘
//!                             Error ◀── any stage failing
//! ```
//!
//! `init` may be called again from `Disconnected` or `Error`. The application
//! only ever sees [`ConnectionStatus::Connected`] and
//! [`ConnectionStatus::Disconnected`]; the intermediate states are internal.

mod callbacks;
mod transport;

pub use callbacks::{Callbacks, OutboundMessage, Outbox};
pub use transport::{
    ConnectParams, DISCONNECT_TIMEOUT_MS, Delivery, InboundMessage, KEEP_ALIVE_SECS, MQTT_PORT,
    MqttTransport, PUBLISH_TIMEOUT_MS, TransportError,
};

use crate::auth::{AuthCredential, AuthType, SasError, derive_sas_token};
use crate::bootstrap::{
    DiscoveryResult, HttpsTransport, SyncResult, SyncStatus, discover, discovery_url, sync,
};
use crate::c2d::{self, C2dMessage, ControlEvent};
use crate::clock::Clock;
use crate::config::{ClientConfig, ConfigError, ConnectionType};
use crate::error::{Error, Result};
use crate::network::application::mqtt::QoS;
use alloc::collections::VecDeque;
use alloc::string::String;
use core::fmt;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, `init` not called yet.
    Uninitialized,
    /// Discovery, sync or connect in progress.
    Bootstrapping,
    /// Broker session up.
    Connected,
    /// Disconnected on request, by the platform or by connection loss.
    Disconnected,
    /// The last bootstrap failed.
    Error,
}

impl SessionState {
    fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Bootstrapping => "bootstrapping",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SessionState {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

/// What the application is told about the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The session reached the broker.
    Connected,
    /// The session left the broker.
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => f.write_str("CONNECTED"),
            ConnectionStatus::Disconnected => f.write_str("DISCONNECTED"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectionStatus {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnectionStatus::Connected => defmt::write!(f, "CONNECTED"),
            ConnectionStatus::Disconnected => defmt::write!(f, "DISCONNECTED"),
        }
    }
}

/// Something [`Session::poll`] has to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A connection status change.
    Status(ConnectionStatus),
    /// An application message. Control messages never appear here.
    Message(InboundMessage),
}

/// One device's connection to IoTConnect.
///
/// `H` performs the discovery and sync requests, `M` carries the MQTT session and
/// `C` provides the wall clock for SAS token expiry.
pub struct Session<H: HttpsTransport, M: MqttTransport, C: Clock> {
    config: ClientConfig,
    http: H,
    mqtt: M,
    clock: C,
    state: SessionState,
    discovery: Option<DiscoveryResult>,
    sync: Option<SyncResult>,
    events: VecDeque<Event>,
}

impl<H: HttpsTransport, M: MqttTransport, C: Clock> Session<H, M, C> {
    /// Creates an uninitialized session. Nothing is validated or sent until
    /// [`init`](Self::init).
    pub fn new(config: ClientConfig, http: H, mqtt: M, clock: C) -> Self {
        Self {
            config,
            http,
            mqtt,
            clock,
            state: SessionState::Uninitialized,
            discovery: None,
            sync: None,
            events: VecDeque::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is connected and the transport agrees.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.mqtt.is_connected()
    }

    /// Cached discovery result.
    pub fn discovery(&self) -> Option<&DiscoveryResult> {
        self.discovery.as_ref()
    }

    /// Result of the last sync.
    pub fn sync_result(&self) -> Option<&SyncResult> {
        self.sync.as_ref()
    }

    /// The configuration the session runs with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The HTTPS collaborator.
    pub fn http(&self) -> &H {
        &self.http
    }

    /// The MQTT collaborator.
    pub fn mqtt(&self) -> &M {
        &self.mqtt
    }

    /// The MQTT collaborator, mutably.
    pub fn mqtt_mut(&mut self) -> &mut M {
        &mut self.mqtt
    }

    /// Validates the configuration and runs discovery, sync, credential
    /// derivation and connect.
    ///
    /// A configuration error is returned before any request is made and leaves
    /// the state untouched. Any later failure moves the session to
    /// [`SessionState::Error`] and releases the transport. There are no
    /// internal retries.
    pub fn init(&mut self) -> Result<()> {
        if matches!(
            self.state,
            SessionState::Connected | SessionState::Bootstrapping
        ) {
            return Err(Error::InvalidState(self.state));
        }
        if let Err(err) = self.config.validate() {
            error!("configuration: {}", err);
            return Err(Error::ConfigInvalid(err));
        }
        self.bootstrap()
    }

    /// Discards the cached bootstrap results and runs the full bootstrap again.
    ///
    /// This is what a force-sync message from the platform triggers; the
    /// application may also call it, for example after a
    /// [`SyncStatus::DeviceMoved`] failure.
    pub fn resync(&mut self) -> Result<()> {
        if matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Bootstrapping
        ) {
            return Err(Error::InvalidState(self.state));
        }
        let was_connected = self.state == SessionState::Connected;

        self.state = SessionState::Bootstrapping;
        if self.mqtt.is_connected() {
            if let Err(err) = self.mqtt.disconnect(DISCONNECT_TIMEOUT_MS) {
                warn!("resync: disconnect failed: {}", err);
            }
        }
        self.discovery = None;
        self.sync = None;
        if was_connected {
            self.notify(ConnectionStatus::Disconnected);
        }

        self.bootstrap()
    }

    /// Closes the broker session.
    ///
    /// Local resources are released and the state becomes
    /// [`SessionState::Disconnected`] even when the transport reports a
    /// failure, which is then returned.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(Error::InvalidState(self.state));
        }
        let result = self.mqtt.disconnect(DISCONNECT_TIMEOUT_MS);
        self.state = SessionState::Disconnected;
        info!("session: disconnected");
        self.notify(ConnectionStatus::Disconnected);

        result.map_err(|err| {
            error!("disconnect failed: {}", err);
            Error::TransportFailed(err)
        })
    }

    /// Publishes `payload` on `topic`.
    ///
    /// [`Delivery::Acknowledged`] uses the configured QoS and blocks for the
    /// acknowledgement; [`Delivery::FireAndForget`] always goes out at QoS 0.
    pub fn publish(&mut self, topic: &str, payload: &[u8], delivery: Delivery) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(Error::InvalidState(self.state));
        }
        let qos = match delivery {
            Delivery::Acknowledged => self.config.qos,
            Delivery::FireAndForget => QoS::AtMostOnce,
        };
        if self.config.trace_data {
            debug!(">> {}: {}", topic, core::str::from_utf8(payload).unwrap_or("<binary>"));
        }

        self.mqtt
            .publish(topic, payload, qos, delivery)
            .map_err(|err| {
                error!("publish to {} failed: {}", topic, err);
                Error::TransportFailed(err)
            })
    }

    /// Publishes on the telemetry topic returned by sync.
    ///
    /// Fails with [`Error::InvalidState`] if sync did not provide one.
    pub fn publish_telemetry(&mut self, payload: &[u8], delivery: Delivery) -> Result<()> {
        let topic = self.publish_topic()?;
        self.publish(&topic, payload, delivery)
    }

    /// Returns the next event.
    ///
    /// Status changes are reported first. While connected, the transport is
    /// polled once: force-sync and close messages are acted on here and never
    /// returned; a transport error counts as connection loss.
    pub fn poll(&mut self) -> Result<Option<Event>> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        if self.state != SessionState::Connected {
            return Ok(None);
        }

        let message = match self.mqtt.poll() {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(None),
            Err(err) => {
                info!("connection lost: {}", err);
                // the transport is already down; this only releases what is left
                let _ = self.mqtt.disconnect(DISCONNECT_TIMEOUT_MS);
                self.state = SessionState::Disconnected;
                self.notify(ConnectionStatus::Disconnected);
                return Ok(self.events.pop_front());
            }
        };
        if self.config.trace_data {
            debug!(
                "<< {}: {}",
                message.topic.as_str(),
                message.payload_str().unwrap_or("<binary>")
            );
        }

        match c2d::decode(&message.payload).control_event() {
            Some(ControlEvent::ForceSync) => {
                info!("force sync requested by the platform");
                self.resync()?;
                Ok(self.events.pop_front())
            }
            Some(ControlEvent::Close) => {
                info!("close requested by the platform");
                if let Err(err) = self.disconnect() {
                    warn!("close: {}", err);
                }
                Ok(self.events.pop_front())
            }
            None => Ok(Some(Event::Message(message))),
        }
    }

    /// Drains [`poll`](Self::poll) and dispatches every application message to
    /// the configured [`Callbacks`]. Returns the number of messages dispatched.
    ///
    /// Status events were already reported through `on_status` when they
    /// happened and are skipped. Replies queued on the [`Outbox`] are sent after
    /// each callback returns, fire-and-forget.
    pub fn receive(&mut self) -> Result<usize> {
        let mut dispatched = 0;
        while let Some(event) = self.poll()? {
            if let Event::Message(message) = event {
                self.dispatch(&message)?;
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    fn dispatch(&mut self, message: &InboundMessage) -> Result<()> {
        let callbacks = &mut self.config.callbacks;
        if let Some(f) = callbacks.on_inbound.as_mut() {
            f(&message.topic, &message.payload);
        }

        let mut outbox = Outbox::new();
        let decoded = c2d::decode(&message.payload);
        match &decoded {
            C2dMessage::Command(command) => {
                if let Some(f) = callbacks.on_command.as_mut() {
                    f(command, &mut outbox);
                }
            }
            C2dMessage::Ota(request) => {
                if let Some(f) = callbacks.on_ota.as_mut() {
                    f(request, &mut outbox);
                }
            }
            _ => {}
        }
        if let Some(f) = callbacks.on_message.as_mut() {
            f(&decoded);
        }

        for reply in outbox.into_messages() {
            let topic = match reply.topic {
                Some(topic) => topic,
                None => self.publish_topic()?,
            };
            self.publish(&topic, &reply.payload, Delivery::FireAndForget)?;
        }
        Ok(())
    }

    fn publish_topic(&self) -> Result<String> {
        self.sync
            .as_ref()
            .and_then(|sync| sync.broker.publish_topic.clone())
            .ok_or(Error::InvalidState(self.state))
    }

    fn notify(&mut self, status: ConnectionStatus) {
        self.config.callbacks.status(status);
        self.events.push_back(Event::Status(status));
    }

    fn bootstrap(&mut self) -> Result<()> {
        self.state = SessionState::Bootstrapping;
        match self.run_bootstrap() {
            Ok(()) => {
                self.state = SessionState::Connected;
                info!("session: connected");
                self.notify(ConnectionStatus::Connected);
                Ok(())
            }
            Err(err) => {
                error!("bootstrap failed: {}", err);
                if self.mqtt.is_connected() {
                    if let Err(err) = self.mqtt.disconnect(DISCONNECT_TIMEOUT_MS) {
                        warn!("releasing transport after failed bootstrap: {}", err);
                    }
                }
                self.state = SessionState::Error;
                Err(err)
            }
        }
    }

    fn run_bootstrap(&mut self) -> Result<()> {
        let company_id = self.config.identity.company_id.clone();
        let unique_id = String::from(
            self.config
                .device_unique_id()
                .ok_or(Error::ConfigInvalid(ConfigError::MissingValue("duid")))?,
        );
        let auth_type = self.config.auth.auth_type();

        let discovery = match &self.discovery {
            Some(cached) => cached.clone(),
            None => {
                let url = discovery_url(
                    self.config.connection_type,
                    self.config.discovery_host.as_deref(),
                    &company_id,
                    &self.config.identity.environment,
                );
                let fresh = discover(&mut self.http, &url)?;
                self.discovery = Some(fresh.clone());
                fresh
            }
        };

        // drop the previous result before the new one is fetched
        self.sync = None;
        let mut result = sync(&mut self.http, &discovery, &company_id, &unique_id, auth_type)?;
        if self.config.connection_type == ConnectionType::Aws {
            // AWS IoT Core identifies the device by certificate
            result.broker.username = None;
        }
        let enrolling = result.status == SyncStatus::DeviceNotRegistered;
        self.sync = Some(result);

        self.connect()?;

        if enrolling && auth_type == AuthType::Tpm {
            // the first sync of an unregistered TPM device carries no telemetry group
            let second = sync(&mut self.http, &discovery, &company_id, &unique_id, auth_type)?;
            if let Some(current) = self.sync.as_mut() {
                current.status = second.status;
                current.device_telemetry_group_id = second.device_telemetry_group_id;
                if current.broker.publish_topic.is_none() {
                    current.broker.publish_topic = second.broker.publish_topic;
                }
                if current.broker.subscribe_topic.is_none() {
                    current.broker.subscribe_topic = second.broker.subscribe_topic;
                }
            }
        }
        Ok(())
    }

    fn connect(&mut self) -> Result<()> {
        let Some(sync) = self.sync.as_ref() else {
            return Err(Error::InvalidState(self.state));
        };
        let broker = &sync.broker;

        let password = match &self.config.auth.credential {
            AuthCredential::SymmetricKey { key } => {
                let token = derive_sas_token(
                    &broker.host,
                    &broker.client_id,
                    key,
                    self.config.sas_token_ttl_secs,
                    &self.clock,
                )
                .map_err(|err| {
                    error!("SAS token: {}", err);
                    err
                })?;
                Some(token.into_string())
            }
            AuthCredential::Token => match &broker.password_seed {
                Some(seed) => Some(seed.clone()),
                None => {
                    error!("SAS token: {}", SasError::MissingToken);
                    return Err(SasError::MissingToken.into());
                }
            },
            AuthCredential::X509 { .. } | AuthCredential::Tpm { .. } => None,
        };
        // MQTT only carries a password alongside a username
        if password.is_some() && broker.username.is_none() {
            error!("SAS token: {}", SasError::MissingUsername);
            return Err(SasError::MissingUsername.into());
        }

        let params = ConnectParams {
            host: &broker.host,
            port: MQTT_PORT,
            client_id: &broker.client_id,
            username: broker.username.as_deref(),
            password: password.as_deref(),
            trust_store: &self.config.auth.trust_store,
            credential: &self.config.auth.credential,
            keep_alive_seconds: KEEP_ALIVE_SECS,
        };
        debug!(
            "connecting to {} as {}",
            params.host,
            params.client_id
        );
        self.mqtt.connect(&params).map_err(|err| {
            error!("MQTT connect failed: {}", err);
            Error::TransportFailed(err)
        })?;

        if let Some(topic) = &broker.subscribe_topic {
            self.mqtt.subscribe(topic, self.config.qos).map_err(|err| {
                error!("subscribe to {} failed: {}", topic.as_str(), err);
                Error::TransportFailed(err)
            })?;
        }
        Ok(())
    }
}

impl<H: HttpsTransport, M: MqttTransport, C: Clock> fmt::Debug for Session<H, M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("discovery", &self.discovery)
            .field("sync", &self.sync)
            .field("pending_events", &self.events.len())
            .finish()
    }
}
