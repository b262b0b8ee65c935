//! Cloud-to-device message decoding.
//!
//! Two message generations are in the field:
//!
//! - protocol 2.1: `{"ct": <number>, ...}` with `ct` 0 for commands, 1 for OTA,
//!   101–105 for "refresh" notifications and 106–109 for device deleted /
//!   disabled / released / stop;
//! - legacy: `{"cmdType": "0x..", "data": {...}}` with `0x01` command, `0x02`
//!   OTA, `0x10`–`0x15` settings/rule/device updates and `0x99` stop.
//!
//! Refresh and update notifications become [`ControlEvent::ForceSync`]; the
//! deleted/disabled/stop family becomes [`ControlEvent::Close`]. The session
//! handles control events itself and hands the rest to the application.

use crate::bootstrap::response::unescape;
use alloc::string::String;
use core::fmt;
use core::marker::PhantomData;
use serde::Deserialize;
use serde::de::{Deserializer, SeqAccess, Visitor};

/// Most download URLs kept from an OTA request. Further URLs are dropped with a
/// warning.
pub const MAX_OTA_URLS: usize = 8;

/// A device command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command line as typed in the portal.
    pub command: String,
    /// Acknowledgement id, present when the portal expects an ack.
    pub ack_id: Option<String>,
}

/// A firmware update request. Download and installation are up to the
/// application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaRequest {
    /// Acknowledgement id.
    pub ack_id: Option<String>,
    /// Software version to install.
    pub version: Option<String>,
    /// Download URLs, in the order sent.
    pub urls: heapless::Vec<String, MAX_OTA_URLS>,
}

/// Lifecycle instructions from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Re-run discovery and sync, then reconnect.
    ForceSync,
    /// Close the connection and stay disconnected.
    Close,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ControlEvent {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ControlEvent::ForceSync => defmt::write!(f, "ForceSync"),
            ControlEvent::Close => defmt::write!(f, "Close"),
        }
    }
}

/// A decoded cloud-to-device message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum C2dMessage {
    /// Device command.
    Command(Command),
    /// Firmware update.
    Ota(OtaRequest),
    /// Lifecycle instruction.
    Control(ControlEvent),
    /// Any other message; carries the message type when there was one.
    Other(Option<i32>),
}

impl C2dMessage {
    /// The control event this message carries, if any.
    pub fn control_event(&self) -> Option<ControlEvent> {
        match self {
            C2dMessage::Control(event) => Some(*event),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct UrlEntry<'a> {
    url: &'a str,
}

/// The first [`MAX_OTA_URLS`] entries of a `urls` array and a count of the rest.
struct UrlList<'a> {
    entries: heapless::Vec<UrlEntry<'a>, MAX_OTA_URLS>,
    dropped: usize,
}

impl<'de: 'a, 'a> Deserialize<'de> for UrlList<'a> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ListVisitor<'a>(PhantomData<&'a ()>);

        impl<'de: 'a, 'a> Visitor<'de> for ListVisitor<'a> {
            type Value = UrlList<'a>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of url entries")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut list = UrlList {
                    entries: heapless::Vec::new(),
                    dropped: 0,
                };
                while let Some(entry) = seq.next_element::<UrlEntry<'a>>()? {
                    if list.entries.push(entry).is_err() {
                        list.dropped += 1;
                    }
                }
                Ok(list)
            }
        }

        deserializer.deserialize_seq(ListVisitor(PhantomData))
    }
}

#[derive(Deserialize)]
struct Message<'a> {
    #[serde(default)]
    ct: Option<i32>,
    #[serde(rename = "cmdType", borrow, default)]
    cmd_type: Option<&'a str>,
    #[serde(borrow, default)]
    cmd: Option<&'a str>,
    #[serde(borrow, default)]
    ack: Option<&'a str>,
    #[serde(borrow, default)]
    sw: Option<&'a str>,
    #[serde(borrow, default)]
    urls: Option<UrlList<'a>>,
    #[serde(borrow, default)]
    data: Option<LegacyData<'a>>,
}

#[derive(Deserialize)]
struct LegacyData<'a> {
    #[serde(rename = "ackId", borrow, default)]
    ack_id: Option<&'a str>,
    #[serde(borrow, default)]
    command: Option<&'a str>,
    #[serde(borrow, default)]
    sw: Option<&'a str>,
    #[serde(borrow, default)]
    urls: Option<UrlList<'a>>,
}

/// Decodes a message payload. Anything that is not a recognizable JSON message
/// decodes to [`C2dMessage::Other`].
pub fn decode(payload: &[u8]) -> C2dMessage {
    let Some(json) = core::str::from_utf8(payload)
        .ok()
        .and_then(|text| text.find('{').map(|start| text[start..].trim_end()))
    else {
        return C2dMessage::Other(None);
    };
    let Ok((message, _)) = serde_json_core::from_str::<Message<'_>>(json) else {
        return C2dMessage::Other(None);
    };

    match (message.ct, message.cmd_type) {
        (Some(ct), _) => decode_v2(ct, &message),
        (None, Some(cmd_type)) => decode_legacy(cmd_type, &message),
        (None, None) => C2dMessage::Other(None),
    }
}

fn decode_v2(ct: i32, message: &Message<'_>) -> C2dMessage {
    match ct {
        0 => C2dMessage::Command(Command {
            command: text(message.cmd).unwrap_or_default(),
            ack_id: text(message.ack),
        }),
        1 => C2dMessage::Ota(OtaRequest {
            ack_id: text(message.ack),
            version: text(message.sw),
            urls: collect_urls(message.urls.as_ref()),
        }),
        101..=105 => C2dMessage::Control(ControlEvent::ForceSync),
        106..=109 => C2dMessage::Control(ControlEvent::Close),
        other => C2dMessage::Other(Some(other)),
    }
}

fn decode_legacy(cmd_type: &str, message: &Message<'_>) -> C2dMessage {
    let digits = cmd_type
        .strip_prefix("0x")
        .or_else(|| cmd_type.strip_prefix("0X"))
        .unwrap_or(cmd_type);
    let Ok(code) = i32::from_str_radix(digits, 16) else {
        return C2dMessage::Other(None);
    };
    let data = message.data.as_ref();

    match code {
        0x01 => C2dMessage::Command(Command {
            command: text(data.and_then(|d| d.command)).unwrap_or_default(),
            ack_id: text(data.and_then(|d| d.ack_id)),
        }),
        0x02 => C2dMessage::Ota(OtaRequest {
            ack_id: text(data.and_then(|d| d.ack_id)),
            version: text(data.and_then(|d| d.sw)),
            urls: collect_urls(data.and_then(|d| d.urls.as_ref())),
        }),
        0x10..=0x15 => C2dMessage::Control(ControlEvent::ForceSync),
        0x99 => C2dMessage::Control(ControlEvent::Close),
        other => C2dMessage::Other(Some(other)),
    }
}

fn text(raw: Option<&str>) -> Option<String> {
    raw.and_then(unescape)
}

fn collect_urls(list: Option<&UrlList<'_>>) -> heapless::Vec<String, MAX_OTA_URLS> {
    let mut urls = heapless::Vec::new();
    let Some(list) = list else {
        return urls;
    };
    if list.dropped > 0 {
        warn!(
            "OTA request: keeping {} download URLs, dropping {}",
            MAX_OTA_URLS,
            list.dropped
        );
    }
    for url in list.entries.iter().filter_map(|entry| unescape(entry.url)) {
        // at most MAX_OTA_URLS entries were kept
        let _ = urls.push(url);
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_command() {
        let message = decode(br#"{"v":"2.1","ct":0,"cmd":"led-color red","ack":"a-1"}"#);
        assert_eq!(
            message,
            C2dMessage::Command(Command {
                command: "led-color red".into(),
                ack_id: Some("a-1".into()),
            })
        );
    }

    #[test]
    fn v2_ota_collects_urls() {
        let message = decode(
            br#"{"ct":1,"cmd":"ota","ack":"o-9","sw":"1.2","urls":[{"url":"https:\/\/f\/a.bin","fileName":"a.bin"},{"url":"https://f/b.bin"}]}"#,
        );
        let C2dMessage::Ota(ota) = message else {
            panic!("expected an OTA request");
        };
        assert_eq!(ota.ack_id.as_deref(), Some("o-9"));
        assert_eq!(ota.version.as_deref(), Some("1.2"));
        assert_eq!(ota.urls.len(), 2);
        assert_eq!(ota.urls[0], "https://f/a.bin");
    }

    #[test]
    fn ota_keeps_the_first_urls_of_a_long_list() {
        let mut payload = String::from(r#"{"ct":1,"ack":"o1","sw":"1.0","urls":["#);
        for i in 0..MAX_OTA_URLS + 3 {
            if i > 0 {
                payload.push(',');
            }
            payload.push_str(&alloc::format!(r#"{{"url":"https://f/{}.bin"}}"#, i));
        }
        payload.push_str("]}");

        let C2dMessage::Ota(ota) = decode(payload.as_bytes()) else {
            panic!("expected an OTA request");
        };
        assert_eq!(ota.ack_id.as_deref(), Some("o1"));
        assert_eq!(ota.urls.len(), MAX_OTA_URLS);
        assert_eq!(ota.urls[0], "https://f/0.bin");
        assert_eq!(ota.urls[MAX_OTA_URLS - 1], "https://f/7.bin");
    }

    #[test]
    fn legacy_ota_with_long_url_list_is_still_ota() {
        let mut payload = String::from(r#"{"cmdType":"0x02","data":{"ackId":"l1","urls":["#);
        for i in 0..12 {
            if i > 0 {
                payload.push(',');
            }
            payload.push_str(r#"{"url":"https://f/x.bin"}"#);
        }
        payload.push_str("]}}");

        let C2dMessage::Ota(ota) = decode(payload.as_bytes()) else {
            panic!("expected an OTA request");
        };
        assert_eq!(ota.ack_id.as_deref(), Some("l1"));
        assert_eq!(ota.urls.len(), MAX_OTA_URLS);
    }

    #[test]
    fn v2_control_ranges() {
        for ct in 101..=105 {
            let payload = alloc::format!(r#"{{"ct":{}}}"#, ct);
            assert_eq!(
                decode(payload.as_bytes()).control_event(),
                Some(ControlEvent::ForceSync)
            );
        }
        for ct in 106..=109 {
            let payload = alloc::format!(r#"{{"ct":{}}}"#, ct);
            assert_eq!(
                decode(payload.as_bytes()).control_event(),
                Some(ControlEvent::Close)
            );
        }
        assert_eq!(decode(br#"{"ct":110}"#), C2dMessage::Other(Some(110)));
    }

    #[test]
    fn legacy_messages() {
        assert_eq!(
            decode(br#"{"cmdType":"0x01","data":{"ackId":"x","command":"reboot","ack":true}}"#),
            C2dMessage::Command(Command {
                command: "reboot".into(),
                ack_id: Some("x".into()),
            })
        );
        assert_eq!(
            decode(br#"{"cmdType":"0x12","data":{}}"#).control_event(),
            Some(ControlEvent::ForceSync)
        );
        assert_eq!(
            decode(br#"{"cmdType":"0x99"}"#).control_event(),
            Some(ControlEvent::Close)
        );
    }

    #[test]
    fn garbage_is_other() {
        assert_eq!(decode(b"hello"), C2dMessage::Other(None));
        assert_eq!(decode(br#"{"temp":21}"#), C2dMessage::Other(None));
        assert_eq!(decode(&[0xff, 0xfe]), C2dMessage::Other(None));
    }
}
