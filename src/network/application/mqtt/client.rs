//! MQTT 3.1.1 client.
//!
//! Packet encoding and decoding for the subset of MQTT the IoTConnect brokers use:
//! CONNECT with username/password, PUBLISH at QoS 0/1, SUBSCRIBE, PINGREQ and
//! DISCONNECT. The client is connection agnostic; TLS is the job of the
//! [`Connection`] it is handed.
//!
//! The client does not wait for acknowledgements other than CONNACK. Callers read
//! packets with [`Client::next_packet`] and match SUBACK / PUBACK packet ids
//! themselves, which lets them keep inbound PUBLISH packets that arrive in
//! between (see [`BrokerConnection`](super::BrokerConnection)).
//!
//! # Examples
//!
//! ```rust,no_run
//! use iotconnect::network::application::mqtt::{Client, Options, QoS};
//! # use iotconnect::network::Connection;
//! # struct TlsStream;
//! # impl Connection for TlsStream {}
//! # impl iotconnect::network::Read for TlsStream {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl iotconnect::network::Write for TlsStream {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl iotconnect::network::Close for TlsStream {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//!
//! let options = Options {
//!     client_id: "avtds-nik-deleteme",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//!     username: Some("hub.azure-devices.net/avtds-nik-deleteme/?api-version=2018-06-30"),
//!     password: Some("SharedAccessSignature sr=..."),
//! };
//! let mut client = Client::connect(TlsStream, &options).unwrap();
//! client.subscribe("devices/avtds-nik-deleteme/messages/devicebound/#", QoS::AtLeastOnce).unwrap();
//! client.publish("devices/avtds-nik-deleteme/messages/events/", b"{}", QoS::AtMostOnce).unwrap();
//! ```

use crate::network::error::Error;
use crate::network::{Connection, Read, Write};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

// Fixed header packet types (upper nibble)
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // 3.1.1

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// Largest inbound packet accepted. Cloud-to-device messages are small JSON
/// documents; anything bigger is treated as a protocol violation.
pub const MAX_PACKET_SIZE: usize = 16 * 1024;

/// Quality of Service levels for MQTT messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// **QoS 0**: at most once, no acknowledgement.
    AtMostOnce = 0,
    /// **QoS 1**: at least once, acknowledged with PUBACK.
    AtLeastOnce = 1,
    /// **QoS 2**: exactly once. Encoded for completeness; IoTConnect brokers
    /// reject it.
    ExactlyOnce = 2,
}

impl QoS {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QoS {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "QoS{=u8}", *self as u8)
    }
}

/// CONNECT parameters.
#[derive(Debug, Clone)]
pub struct Options<'a> {
    /// Client identifier. IoTConnect hands it out in the sync response.
    pub client_id: &'a str,
    /// Keep-alive interval in seconds; 0 disables it.
    pub keep_alive_seconds: u16,
    /// Discard any session state the broker holds for this client.
    pub clean_session: bool,
    /// User name, if the broker expects one.
    pub username: Option<&'a str>,
    /// Password. Only sent together with a user name, as MQTT 3.1.1 requires.
    pub password: Option<&'a str>,
}

/// Why a CONNECT did not produce a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// The exchange itself failed.
    Network(Error),
    /// The broker answered with a non-zero CONNACK return code (1..=5).
    Refused(u8),
}

impl From<Error> for ConnectError {
    fn from(err: Error) -> Self {
        ConnectError::Network(err)
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::Network(err) => write!(f, "{}", err),
            ConnectError::Refused(code) => write!(f, "connection refused by broker (code {})", code),
        }
    }
}

/// An inbound application message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublishPacket {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
    /// Delivery QoS chosen by the broker.
    pub qos: QoS,
    /// Packet id, present for QoS 1 and 2.
    pub packet_id: Option<u16>,
}

/// A decoded packet from the broker.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Packet {
    /// Application message. QoS 1 messages have already been acknowledged.
    Publish(PublishPacket),
    /// Acknowledgement of one of our QoS 1 publishes.
    PubAck(u16),
    /// Subscription result; `return_code` 0x80 means refused.
    SubAck {
        /// Id of the SUBSCRIBE being answered.
        packet_id: u16,
        /// Granted QoS, or 0x80 on failure.
        return_code: u8,
    },
    /// Answer to a PINGREQ.
    PingResp,
    /// Any other packet, identified by its first header byte.
    Other(u8),
}

/// An MQTT 3.1.1 client over a single connection.
pub struct Client<C: Connection> {
    connection: C,
    is_connected: bool,
    next_packet_id: u16,
}

impl<C: Connection> Client<C> {
    /// Sends CONNECT and waits for CONNACK.
    ///
    /// CONNACK must be the first packet the broker sends, so it is read directly
    /// from the connection.
    pub fn connect(mut connection: C, options: &Options<'_>) -> Result<Self, ConnectError> {
        let mut body = Vec::new();
        put_bytes(&mut body, PROTOCOL_NAME)?;
        body.push(PROTOCOL_LEVEL);

        let mut flags = 0;
        if options.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }
        // password without user name is a protocol violation in 3.1.1
        let password = options.username.and(options.password);
        if options.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        body.push(flags);
        body.extend_from_slice(&options.keep_alive_seconds.to_be_bytes());

        put_bytes(&mut body, options.client_id.as_bytes())?;
        if let Some(username) = options.username {
            put_bytes(&mut body, username.as_bytes())?;
        }
        if let Some(password) = password {
            put_bytes(&mut body, password.as_bytes())?;
        }

        write_packet(&mut connection, CONNECT, &body)?;

        let mut connack = [0u8; 4];
        read_exact(&mut connection, &mut connack)?;
        if connack[0] != CONNACK || connack[1] != 2 {
            return Err(Error::ProtocolError.into());
        }

        match connack[3] {
            0 => Ok(Self {
                connection,
                is_connected: true,
                next_packet_id: 1,
            }),
            code @ 1..=5 => Err(ConnectError::Refused(code)),
            _ => Err(Error::ProtocolError.into()),
        }
    }

    /// Whether the session is still believed to be up.
    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// Sends a PUBLISH.
    ///
    /// Returns the packet id for QoS 1 and 2, which the broker will echo in its
    /// acknowledgement.
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<Option<u16>, Error> {
        let mut body = Vec::new();
        body.try_reserve(2 + topic.len() + 2 + payload.len())
            .map_err(|_| Error::Overflow)?;
        put_bytes(&mut body, topic.as_bytes())?;

        let packet_id = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce | QoS::ExactlyOnce => {
                let id = self.allocate_packet_id();
                body.extend_from_slice(&id.to_be_bytes());
                Some(id)
            }
        };
        body.extend_from_slice(payload);

        self.send(PUBLISH | ((qos as u8) << 1), &body)?;
        Ok(packet_id)
    }

    /// Sends a SUBSCRIBE for a single topic filter and returns its packet id.
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, Error> {
        let id = self.allocate_packet_id();

        let mut body = Vec::new();
        body.extend_from_slice(&id.to_be_bytes());
        put_bytes(&mut body, topic.as_bytes())?;
        body.push(qos as u8);

        self.send(SUBSCRIBE, &body)?;
        Ok(id)
    }

    /// Sends a PINGREQ.
    pub fn ping(&mut self) -> Result<(), Error> {
        self.send(PINGREQ, &[])
    }

    /// Reads the next packet, if one is available.
    ///
    /// Inbound QoS 1 PUBLISH packets are acknowledged before they are returned.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, Error> {
        let mut header = [0u8; 1];
        match self.connection.read(&mut header) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(_) => return self.fail(Error::ReadError),
        }

        let remaining = match read_remaining_length(&mut self.connection) {
            Ok(len) => len,
            Err(err) => return self.fail(err),
        };
        if remaining > MAX_PACKET_SIZE {
            return self.fail(Error::Overflow);
        }

        let mut body = Vec::new();
        body.try_reserve_exact(remaining)
            .map_err(|_| Error::Overflow)?;
        body.resize(remaining, 0);
        if let Err(err) = read_exact(&mut self.connection, &mut body) {
            return self.fail(err);
        }

        let packet = match header[0] & 0xF0 {
            PUBLISH => {
                let publish = decode_publish(header[0], &body)?;
                if let (QoS::AtLeastOnce, Some(id)) = (publish.qos, publish.packet_id) {
                    self.send(PUBACK, &id.to_be_bytes())?;
                }
                Packet::Publish(publish)
            }
            PUBACK => Packet::PubAck(read_u16(&body, 0)?),
            SUBACK => Packet::SubAck {
                packet_id: read_u16(&body, 0)?,
                return_code: *body.get(2).ok_or(Error::ProtocolError)?,
            },
            PINGRESP => Packet::PingResp,
            _ => Packet::Other(header[0]),
        };
        Ok(Some(packet))
    }

    /// Sends DISCONNECT and closes the connection.
    ///
    /// The connection is closed even when DISCONNECT cannot be written; the
    /// first error encountered is returned.
    pub fn disconnect(mut self) -> Result<(), Error> {
        let sent = self.send(DISCONNECT, &[]);
        let closed = self.connection.close().map_err(|_| Error::ConnectionClosed);
        sent.and(closed)
    }

    fn send(&mut self, header: u8, body: &[u8]) -> Result<(), Error> {
        let result = write_packet(&mut self.connection, header, body);
        if result.is_err() {
            self.is_connected = false;
        }
        result
    }

    fn fail<T>(&mut self, err: Error) -> Result<T, Error> {
        self.is_connected = false;
        Err(err)
    }

    fn allocate_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        // zero is not a valid packet id
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }
}

fn decode_publish(header: u8, body: &[u8]) -> Result<PublishPacket, Error> {
    let qos = QoS::from_bits((header >> 1) & 0x03).ok_or(Error::ProtocolError)?;
    let topic_len = read_u16(body, 0)? as usize;
    let topic_end = 2 + topic_len;
    let topic = body.get(2..topic_end).ok_or(Error::ProtocolError)?;
    let topic = core::str::from_utf8(topic).map_err(|_| Error::ProtocolError)?;

    let (packet_id, payload_start) = match qos {
        QoS::AtMostOnce => (None, topic_end),
        _ => (Some(read_u16(body, topic_end)?), topic_end + 2),
    };
    let payload = body.get(payload_start..).ok_or(Error::ProtocolError)?;

    Ok(PublishPacket {
        topic: String::from(topic),
        payload: payload.to_vec(),
        qos,
        packet_id,
    })
}

fn read_u16(buf: &[u8], at: usize) -> Result<u16, Error> {
    match buf.get(at..at + 2) {
        Some(bytes) => Ok(u16::from_be_bytes([bytes[0], bytes[1]])),
        None => Err(Error::ProtocolError),
    }
}

/// Appends a length-prefixed MQTT string / binary field.
fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(bytes.len()).map_err(|_| Error::Overflow)?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn write_packet<C: Write>(connection: &mut C, header: u8, body: &[u8]) -> Result<(), Error> {
    let mut fixed_header: heapless::Vec<u8, 5> = heapless::Vec::new();
    // header byte first; `encode_remaining_length` fills the other four
    fixed_header.push(header).map_err(|_| Error::Overflow)?;
    encode_remaining_length(&mut fixed_header, body.len()).map_err(|_| Error::Overflow)?;

    write_all(connection, &fixed_header)?;
    write_all(connection, body)?;
    connection.flush().map_err(|_| Error::WriteError)
}

fn write_all<C: Write>(connection: &mut C, mut buf: &[u8]) -> Result<(), Error> {
    while !buf.is_empty() {
        match connection.write(buf) {
            Ok(0) => return Err(Error::WriteError),
            Ok(n) => buf = &buf[n..],
            Err(_) => return Err(Error::WriteError),
        }
    }
    Ok(())
}

fn read_exact<C: Read>(connection: &mut C, buf: &mut [u8]) -> Result<(), Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match connection.read(&mut buf[filled..]) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => filled += n,
            Err(_) => return Err(Error::ReadError),
        }
    }
    Ok(())
}

fn read_remaining_length<C: Read>(connection: &mut C) -> Result<usize, Error> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for _ in 0..4 {
        let mut byte = [0u8; 1];
        read_exact(connection, &mut byte)?;
        value += (byte[0] & 0x7F) as usize * multiplier;
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
        multiplier *= 128;
    }
    Err(Error::ProtocolError)
}

/// Encodes the variable-length "remaining length" field.
///
/// Up to four bytes of seven bits each, high bit set when another byte follows,
/// which caps packets at 268,435,455 bytes.
fn encode_remaining_length(buf: &mut heapless::Vec<u8, 5>, mut len: usize) -> Result<(), ()> {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).map_err(|_| ())?;
        if len == 0 {
            return Ok(());
        }
    }
}
