//! Application callbacks and the reply outbox.

use super::ConnectionStatus;
use crate::c2d::{C2dMessage, Command, OtaRequest};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

type StatusFn = Box<dyn FnMut(ConnectionStatus)>;
type CommandFn = Box<dyn FnMut(&Command, &mut Outbox)>;
type OtaFn = Box<dyn FnMut(&OtaRequest, &mut Outbox)>;
type MessageFn = Box<dyn FnMut(&C2dMessage)>;
type InboundFn = Box<dyn FnMut(&str, &[u8])>;

/// Optional application hooks, invoked by
/// [`Session::receive`](super::Session::receive) one at a time.
#[derive(Default)]
pub struct Callbacks {
    pub(crate) on_status: Option<StatusFn>,
    pub(crate) on_command: Option<CommandFn>,
    pub(crate) on_ota: Option<OtaFn>,
    pub(crate) on_message: Option<MessageFn>,
    pub(crate) on_inbound: Option<InboundFn>,
}

impl Callbacks {
    /// No callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on every CONNECTED / DISCONNECTED transition, as it happens.
    pub fn on_status(mut self, f: impl FnMut(ConnectionStatus) + 'static) -> Self {
        self.on_status = Some(Box::new(f));
        self
    }

    /// Called for each device command.
    pub fn on_command(mut self, f: impl FnMut(&Command, &mut Outbox) + 'static) -> Self {
        self.on_command = Some(Box::new(f));
        self
    }

    /// Called for each firmware update request.
    pub fn on_ota(mut self, f: impl FnMut(&OtaRequest, &mut Outbox) + 'static) -> Self {
        self.on_ota = Some(Box::new(f));
        self
    }

    /// Called for every decoded application message, commands and OTA included.
    pub fn on_message(mut self, f: impl FnMut(&C2dMessage) + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    /// Called with the raw topic and payload of every application message,
    /// before decoding.
    pub fn on_inbound(mut self, f: impl FnMut(&str, &[u8]) + 'static) -> Self {
        self.on_inbound = Some(Box::new(f));
        self
    }

    pub(crate) fn status(&mut self, status: ConnectionStatus) {
        if let Some(f) = self.on_status.as_mut() {
            f(status);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_status", &self.on_status.is_some())
            .field("on_command", &self.on_command.is_some())
            .field("on_ota", &self.on_ota.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_inbound", &self.on_inbound.is_some())
            .finish()
    }
}

/// A reply queued from inside a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination; `None` means the sync-provided publish topic.
    pub topic: Option<String>,
    /// Payload.
    pub payload: Vec<u8>,
}

/// Replies (acknowledgements, status reports) collected while a callback runs.
///
/// The session publishes them once the callback has returned, with
/// [`Delivery::FireAndForget`](super::Delivery::FireAndForget): QoS 0 and no
/// wait for a PUBACK. Replies from callbacks never get delivery confirmation.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<OutboundMessage>,
}

impl Outbox {
    /// An empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `payload` for the telemetry topic.
    pub fn publish(&mut self, payload: impl Into<Vec<u8>>) {
        self.messages.push(OutboundMessage {
            topic: None,
            payload: payload.into(),
        });
    }

    /// Queues `payload` for `topic`.
    pub fn publish_to(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.messages.push(OutboundMessage {
            topic: Some(topic.into()),
            payload: payload.into(),
        });
    }

    /// Number of queued replies.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn into_messages(self) -> Vec<OutboundMessage> {
        self.messages
    }
}
