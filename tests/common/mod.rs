#![allow(dead_code)]

use iotconnect::auth::{AuthCredential, AuthInfo};
use iotconnect::bootstrap::{HttpResponse, HttpsTransport};
use iotconnect::clock::Clock;
use iotconnect::config::{ClientConfig, ConnectionType, DeviceIdentity};
use iotconnect::network::application::mqtt::QoS;
use iotconnect::network::error::Error;
use iotconnect::network::{Close, Connection, Read, TlsConnect, TlsOptions, Write};
use iotconnect::session::{ConnectParams, Delivery, InboundMessage, MqttTransport, TransportError};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

pub const DISCOVERY_OK: &str = r#"{"host":"h1","path":"/p/"}"#;
pub const SYNC_OK: &str = r#"{"ds":0,"broker":{"host":"b1","clientId":"c1","username":"u1","sub":"devices/c1/messages/devicebound/#","pub":"devices/c1/messages/events/"},"dtg":"g1"}"#;

/// Base64 of "secretkey".
pub const SYMMETRIC_KEY: &str = "c2VjcmV0a2V5";

pub fn identity() -> DeviceIdentity {
    DeviceIdentity::new("cpid1", "env1", "dev1")
}

pub fn symmetric_config() -> ClientConfig {
    ClientConfig::new(
        ConnectionType::Azure,
        identity(),
        AuthInfo::new(
            "root-ca.pem",
            AuthCredential::SymmetricKey {
                key: SYMMETRIC_KEY.into(),
            },
        ),
    )
}

pub fn x509_config(connection_type: ConnectionType) -> ClientConfig {
    ClientConfig::new(
        connection_type,
        identity(),
        AuthInfo::new(
            "root-ca.pem",
            AuthCredential::X509 {
                cert_path: "device-cert.pem".into(),
                key_path: "device-key.pem".into(),
            },
        ),
    )
}

/// Scripted [`HttpsTransport`]: answers requests in order and records them.
#[derive(Debug, Default)]
pub struct MockHttps {
    responses: VecDeque<Result<HttpResponse, ()>>,
    pub requests: Vec<(String, Option<String>)>,
}

impl MockHttps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, status: u16, body: &str) -> Self {
        self.responses.push_back(Ok(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        }));
        self
    }

    pub fn fail(mut self) -> Self {
        self.responses.push_back(Err(()));
        self
    }

    pub fn urls(&self) -> Vec<&str> {
        self.requests.iter().map(|(url, _)| url.as_str()).collect()
    }
}

impl HttpsTransport for MockHttps {
    type Error = ();

    fn request(&mut self, url: &str, body: Option<&str>) -> Result<HttpResponse, Self::Error> {
        self.requests.push((url.to_string(), body.map(str::to_string)));
        self.responses.pop_front().unwrap_or(Err(()))
    }
}

/// Owned copy of the [`ConnectParams`] a transport was opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedConnect {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub trust_store: String,
    pub credential: AuthCredential,
    pub keep_alive_seconds: u16,
}

/// In-memory [`MqttTransport`].
#[derive(Debug, Default)]
pub struct MockMqtt {
    pub connected: bool,
    pub connects: Vec<RecordedConnect>,
    pub subscriptions: Vec<(String, QoS)>,
    pub published: Vec<(String, Vec<u8>, QoS, Delivery)>,
    pub inbound: VecDeque<Result<InboundMessage, TransportError>>,
    pub disconnects: usize,
    pub fail_connect: Option<TransportError>,
    pub fail_subscribe: Option<TransportError>,
    pub fail_disconnect: Option<TransportError>,
}

impl MockMqtt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&mut self, topic: &str, payload: &str) {
        self.inbound.push_back(Ok(InboundMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        }));
    }

    pub fn drop_connection(&mut self, err: TransportError) {
        self.inbound.push_back(Err(err));
    }
}

impl MqttTransport for MockMqtt {
    fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), TransportError> {
        self.connects.push(RecordedConnect {
            host: params.host.to_string(),
            port: params.port,
            client_id: params.client_id.to_string(),
            username: params.username.map(str::to_string),
            password: params.password.map(str::to_string),
            trust_store: params.trust_store.to_string(),
            credential: params.credential.clone(),
            keep_alive_seconds: params.keep_alive_seconds,
        });
        if let Some(err) = self.fail_connect.take() {
            return Err(err);
        }
        self.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(err) = self.fail_subscribe.take() {
            return Err(err);
        }
        self.subscriptions.push((topic.to_string(), qos));
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.published
            .push((topic.to_string(), payload.to_vec(), qos, delivery));
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match self.inbound.pop_front() {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(err)) => {
                self.connected = false;
                Err(err)
            }
            None => Ok(None),
        }
    }

    fn disconnect(&mut self, _timeout_ms: u32) -> Result<(), TransportError> {
        self.disconnects += 1;
        self.connected = false;
        match self.fail_disconnect.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Clock that moves forward by `step` milliseconds on every reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
    step: u64,
}

impl ManualClock {
    pub fn at_secs(secs: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(secs * 1000)),
            step: 0,
        }
    }

    pub fn ticking(step: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            step,
        }
    }

    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get() + millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

/// Both directions of a [`MockConnection`], shared with the test.
#[derive(Debug, Default)]
pub struct Wire {
    pub inbound: VecDeque<u8>,
    pub outbound: Vec<u8>,
    pub closed: bool,
}

/// Byte stream backed by a shared [`Wire`].
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    wire: Rc<RefCell<Wire>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes for the client to read.
    pub fn feed(&self, data: &[u8]) {
        self.wire.borrow_mut().inbound.extend(data.iter().copied());
    }

    /// Everything the client has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.wire.borrow().outbound.clone()
    }

    pub fn clear_written(&self) {
        self.wire.borrow_mut().outbound.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.wire.borrow().closed
    }
}

impl Read for MockConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.closed {
            return Err(Error::NotOpen);
        }
        let len = buf.len().min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for MockConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.closed {
            return Err(Error::NotOpen);
        }
        wire.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.wire.borrow().closed {
            return Err(Error::NotOpen);
        }
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        self.wire.borrow_mut().closed = true;
        Ok(())
    }
}

impl Connection for MockConnection {}

/// Owned copy of one TLS handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsRecord {
    pub remote: String,
    pub server_name: String,
    pub trust_store: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

/// [`TlsConnect`] handing out prepared [`MockConnection`]s in order.
#[derive(Debug, Clone, Default)]
pub struct MockTls {
    connections: Rc<RefCell<VecDeque<MockConnection>>>,
    opened: Rc<RefCell<Vec<TlsRecord>>>,
}

impl MockTls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, connection: MockConnection) {
        self.connections.borrow_mut().push_back(connection);
    }

    pub fn opened(&self) -> Vec<TlsRecord> {
        self.opened.borrow().clone()
    }
}

impl TlsConnect for MockTls {
    type Connection = MockConnection;
    type Error = ();

    fn connect_tls(
        &mut self,
        remote: &str,
        tls: &TlsOptions<'_>,
    ) -> Result<Self::Connection, Self::Error> {
        self.opened.borrow_mut().push(TlsRecord {
            remote: remote.to_string(),
            server_name: tls.server_name.to_string(),
            trust_store: tls.trust_store.map(str::to_string),
            client_cert: tls.client_cert.map(str::to_string),
            client_key: tls.client_key.map(str::to_string),
        });
        self.connections.borrow_mut().pop_front().ok_or(())
    }
}
