//! [`MqttTransport`] over the built-in client and a [`TlsConnect`] implementation.

use super::client::{Client, ConnectError, Options, Packet, PublishPacket, QoS};
use crate::auth::AuthCredential;
use crate::clock::Clock;
use crate::network::TlsConnect;
use crate::network::TlsOptions;
use crate::network::error::Error;
use crate::session::{
    ConnectParams, Delivery, InboundMessage, MqttTransport, PUBLISH_TIMEOUT_MS, TransportError,
};
use alloc::collections::VecDeque;
use alloc::format;

/// SUBACK return code for a refused subscription.
const SUBACK_FAILURE: u8 = 0x80;

/// A broker session opened through `T` and timed by `K`.
///
/// Acknowledgement waits (SUBACK, PUBACK) spin on [`Client::next_packet`] until
/// the deadline measured by the clock; application messages that arrive in the
/// meantime are queued and handed out by the next [`poll`](MqttTransport::poll).
pub struct BrokerConnection<T: TlsConnect, K: Clock> {
    connector: T,
    clock: K,
    client: Option<Client<T::Connection>>,
    pending: VecDeque<PublishPacket>,
    keep_alive_ms: u64,
    last_sent_ms: u64,
    ack_timeout_ms: u64,
}

impl<T: TlsConnect, K: Clock> BrokerConnection<T, K> {
    /// Creates an unconnected transport.
    pub fn new(connector: T, clock: K) -> Self {
        Self {
            connector,
            clock,
            client: None,
            pending: VecDeque::new(),
            keep_alive_ms: 0,
            last_sent_ms: 0,
            ack_timeout_ms: PUBLISH_TIMEOUT_MS as u64,
        }
    }

    /// Overrides how long SUBACK and PUBACK waits may take.
    pub fn with_ack_timeout(mut self, timeout_ms: u32) -> Self {
        self.ack_timeout_ms = timeout_ms as u64;
        self
    }

    fn client(&mut self) -> Result<&mut Client<T::Connection>, TransportError> {
        self.client.as_mut().ok_or(TransportError::NotConnected)
    }

    fn drop_session(&mut self, err: Error) -> TransportError {
        self.client = None;
        TransportError::Network(err)
    }

    /// Reads packets until `matches` accepts one or the deadline passes.
    fn wait_for<R>(
        &mut self,
        mut matches: impl FnMut(&Packet) -> Option<R>,
    ) -> Result<R, TransportError> {
        let deadline = self.clock.now_millis().saturating_add(self.ack_timeout_ms);
        loop {
            let packet = match self.client()?.next_packet() {
                Ok(packet) => packet,
                Err(err) => return Err(self.drop_session(err)),
            };
            match packet {
                Some(Packet::Publish(publish)) => self.pending.push_back(publish),
                Some(other) => {
                    if let Some(result) = matches(&other) {
                        return Ok(result);
                    }
                }
                None => {}
            }
            if self.clock.now_millis() >= deadline {
                return Err(TransportError::Timeout);
            }
        }
    }
}

impl<T: TlsConnect, K: Clock> core::fmt::Debug for BrokerConnection<T, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("connected", &self.is_connected())
            .field("pending", &self.pending.len())
            .field("keep_alive_ms", &self.keep_alive_ms)
            .finish()
    }
}

impl<T: TlsConnect, K: Clock> MqttTransport for BrokerConnection<T, K> {
    fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), TransportError> {
        if let Some(client) = self.client.take() {
            let _ = client.disconnect();
        }
        self.pending.clear();

        let mut tls = TlsOptions::server(params.host, Some(params.trust_store));
        if let AuthCredential::X509 {
            cert_path,
            key_path,
        } = params.credential
        {
            tls.client_cert = Some(cert_path.as_str());
            tls.client_key = Some(key_path.as_str());
        }

        let remote = format!("{}:{}", params.host, params.port);
        let connection = self
            .connector
            .connect_tls(&remote, &tls)
            .map_err(|_| TransportError::Network(Error::TlsError))?;

        let options = Options {
            client_id: params.client_id,
            keep_alive_seconds: params.keep_alive_seconds,
            clean_session: true,
            username: params.username,
            password: params.password,
        };
        let client = Client::connect(connection, &options).map_err(|err| match err {
            ConnectError::Network(err) => TransportError::Network(err),
            ConnectError::Refused(code) => TransportError::Refused(code),
        })?;

        self.client = Some(client);
        self.keep_alive_ms = params.keep_alive_seconds as u64 * 1000;
        self.last_sent_ms = self.clock.now_millis();
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        let id = match self.client()?.subscribe(topic, qos) {
            Ok(id) => id,
            Err(err) => return Err(self.drop_session(err)),
        };
        self.last_sent_ms = self.clock.now_millis();

        let code = self.wait_for(|packet| match packet {
            Packet::SubAck {
                packet_id,
                return_code,
            } if *packet_id == id => Some(*return_code),
            _ => None,
        })?;
        if code == SUBACK_FAILURE {
            return Err(TransportError::SubscribeRefused);
        }
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        let qos = match delivery {
            Delivery::Acknowledged => qos,
            Delivery::FireAndForget => QoS::AtMostOnce,
        };
        let id = match self.client()?.publish(topic, payload, qos) {
            Ok(id) => id,
            Err(err) => return Err(self.drop_session(err)),
        };
        self.last_sent_ms = self.clock.now_millis();

        match id {
            Some(id) => self.wait_for(|packet| match packet {
                Packet::PubAck(acked) if *acked == id => Some(()),
                _ => None,
            }),
            None => Ok(()),
        }
    }

    fn poll(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        if let Some(publish) = self.pending.pop_front() {
            return Ok(Some(into_inbound(publish)));
        }

        let now = self.clock.now_millis();
        // ping at half the keep-alive interval
        if self.keep_alive_ms > 0 && now.saturating_sub(self.last_sent_ms) >= self.keep_alive_ms / 2 {
            if let Err(err) = self.client()?.ping() {
                return Err(self.drop_session(err));
            }
            self.last_sent_ms = now;
        }

        match self.client()?.next_packet() {
            Ok(Some(Packet::Publish(publish))) => Ok(Some(into_inbound(publish))),
            Ok(_) => Ok(None),
            Err(err) => Err(self.drop_session(err)),
        }
    }

    fn disconnect(&mut self, _timeout_ms: u32) -> Result<(), TransportError> {
        // DISCONNECT is not acknowledged, so there is nothing to wait for
        self.pending.clear();
        match self.client.take() {
            Some(client) => client.disconnect().map_err(TransportError::Network),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.client
            .as_ref()
            .is_some_and(|client| client.is_connected())
    }
}

fn into_inbound(publish: PublishPacket) -> InboundMessage {
    InboundMessage {
        topic: publish.topic,
        payload: publish.payload,
    }
}
