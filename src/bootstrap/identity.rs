//! Identity sync: device id → broker connection parameters.

use super::response::{unescape, validate_response};
use super::{DiscoveryResult, Enveloped, HttpsTransport};
use crate::auth::AuthType;
use crate::error::Error;
use alloc::format;
use alloc::string::String;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Upper bound on the serialized sync request.
const SYNC_BODY_CAPACITY: usize = 512;

/// Device status reported by sync, plus the two local failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Device is known and active.
    Ok,
    /// Device is not registered yet.
    DeviceNotRegistered,
    /// Device will be registered automatically.
    AutoRegister,
    /// No device with this unique id.
    DeviceNotFound,
    /// Device is disabled in the portal.
    DeviceInactive,
    /// Device moved to another instance.
    DeviceMoved,
    /// No company with this id.
    CpidNotFound,
    /// A status code this SDK does not know.
    UnknownDeviceStatus(i32),
    /// The request could not be built.
    AllocationError,
    /// The request failed or the response could not be understood.
    ParsingError,
}

impl SyncStatus {
    /// Maps the `ds` field of a sync response.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => SyncStatus::Ok,
            1 => SyncStatus::DeviceNotRegistered,
            2 => SyncStatus::AutoRegister,
            3 => SyncStatus::DeviceNotFound,
            4 => SyncStatus::DeviceInactive,
            5 => SyncStatus::DeviceMoved,
            6 => SyncStatus::CpidNotFound,
            other => SyncStatus::UnknownDeviceStatus(other),
        }
    }

    /// Whether a later attempt may see a different answer without anyone
    /// touching the portal.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SyncStatus::DeviceNotFound | SyncStatus::CpidNotFound)
    }

    fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Ok => "ok",
            SyncStatus::DeviceNotRegistered => "device not registered",
            SyncStatus::AutoRegister => "auto register",
            SyncStatus::DeviceNotFound => "device not found",
            SyncStatus::DeviceInactive => "device inactive",
            SyncStatus::DeviceMoved => "device moved",
            SyncStatus::CpidNotFound => "cpid not found",
            SyncStatus::UnknownDeviceStatus(_) => "unknown device status",
            SyncStatus::AllocationError => "allocation error",
            SyncStatus::ParsingError => "parsing error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::UnknownDeviceStatus(code) => write!(f, "unknown device status {}", code),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SyncStatus {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SyncStatus::UnknownDeviceStatus(code) => {
                defmt::write!(f, "unknown device status {=i32}", code)
            }
            other => defmt::write!(f, "{=str}", other.as_str()),
        }
    }
}

/// Broker connection parameters from sync.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerParams {
    /// MQTT broker host.
    pub host: String,
    /// MQTT client id.
    pub client_id: String,
    /// MQTT user name.
    pub username: Option<String>,
    /// Broker token, used as the password for token authentication.
    pub password_seed: Option<String>,
    /// Cloud-to-device topic filter.
    pub subscribe_topic: Option<String>,
    /// Telemetry topic.
    pub publish_topic: Option<String>,
}

impl fmt::Debug for BrokerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerParams")
            .field("host", &self.host)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password_seed", &self.password_seed.as_ref().map(|_| "<redacted>"))
            .field("subscribe_topic", &self.subscribe_topic)
            .field("publish_topic", &self.publish_topic)
            .finish()
    }
}

/// A usable sync outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// [`SyncStatus::Ok`], or [`SyncStatus::DeviceNotRegistered`] on the TPM
    /// enrollment path.
    pub status: SyncStatus,
    /// Where and how to connect.
    pub broker: BrokerParams,
    /// Device telemetry group id. Absent from the first sync of a TPM device.
    pub device_telemetry_group_id: Option<String>,
}

#[derive(Serialize)]
struct SyncRequest<'a> {
    #[serde(rename = "cpId")]
    company_id: &'a str,
    #[serde(rename = "uniqueId")]
    unique_id: &'a str,
    option: SyncOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncOptions {
    attribute: bool,
    setting: bool,
    protocol: bool,
    device: bool,
    sdk_config: bool,
    rule: bool,
}

#[derive(Deserialize)]
struct SyncDocument<'a> {
    ds: i32,
    #[serde(default)]
    ec: Option<i32>,
    #[serde(borrow, default)]
    broker: Option<BrokerDocument<'a>>,
    #[serde(borrow, default)]
    dtg: Option<&'a str>,
}

#[derive(Deserialize)]
struct BrokerDocument<'a> {
    #[serde(borrow, default)]
    host: Option<&'a str>,
    #[serde(rename = "clientId", borrow, default)]
    client_id: Option<&'a str>,
    #[serde(borrow, default)]
    username: Option<&'a str>,
    #[serde(borrow, default)]
    pass: Option<&'a str>,
    #[serde(borrow, default)]
    sub: Option<&'a str>,
    #[serde(rename = "pub", borrow, default)]
    publish: Option<&'a str>,
}

/// `https://{host}{path}sync?`
pub fn sync_url(discovery: &DiscoveryResult) -> String {
    format!("https://{}{}sync?", discovery.host, discovery.path)
}

/// Serializes the sync POST body. Only the broker (`protocol`) section is
/// requested.
pub fn sync_request_body(
    company_id: &str,
    unique_id: &str,
) -> Result<heapless::String<SYNC_BODY_CAPACITY>, Error> {
    let request = SyncRequest {
        company_id,
        unique_id,
        option: SyncOptions {
            attribute: false,
            setting: false,
            protocol: true,
            device: false,
            sdk_config: false,
            rule: false,
        },
    };
    serde_json_core::to_string(&request).map_err(|_| Error::SyncFailed {
        status: SyncStatus::AllocationError,
        response: None,
    })
}

/// Runs one sync exchange.
///
/// `DeviceNotRegistered` is accepted for TPM devices: the client id becomes
/// `{company_id}-{unique_id}` and the caller proceeds to enrollment. The
/// response must still name a broker host. Every
/// other non-OK status is a [`Error::SyncFailed`] carrying the raw response.
pub fn sync<H: HttpsTransport>(
    http: &mut H,
    discovery: &DiscoveryResult,
    company_id: &str,
    unique_id: &str,
    auth_type: AuthType,
) -> Result<SyncResult, Error> {
    let url = sync_url(discovery);
    let body = sync_request_body(company_id, unique_id)?;

    debug!("sync: POST {}", url.as_str());
    let response = http.request(&url, Some(body.as_str())).map_err(|_| {
        error!("sync: request failed");
        Error::SyncFailed {
            status: SyncStatus::ParsingError,
            response: None,
        }
    })?;
    if !(200..300).contains(&response.status) {
        warn!("sync: HTTP status {}", response.status);
    }

    let failed = |status: SyncStatus| {
        let raw = String::from_utf8_lossy(&response.body).into_owned();
        error!("sync: {}", status);
        debug!("sync response: {}", raw.as_str());
        Error::SyncFailed {
            status,
            response: Some(raw),
        }
    };

    let json = validate_response(&response.body).map_err(|_| failed(SyncStatus::ParsingError))?;
    let document = decode(json).ok_or_else(|| failed(SyncStatus::ParsingError))?;

    if let Some(code) = document.ec.filter(|&code| code != 0) {
        warn!("sync: error code {}", code);
    }

    let status = SyncStatus::from_code(document.ds);
    let broker = document.broker.as_ref();
    let field = |value: Option<&str>| -> Result<Option<String>, Error> {
        match value {
            Some(raw) if !raw.is_empty() => unescape(raw)
                .map(Some)
                .ok_or_else(|| failed(SyncStatus::ParsingError)),
            _ => Ok(None),
        }
    };

    let (host, client_id) = match status {
        SyncStatus::Ok => {
            let host = field(broker.and_then(|b| b.host))?;
            let client_id = field(broker.and_then(|b| b.client_id))?;
            match (host, client_id) {
                (Some(host), Some(client_id)) => (host, client_id),
                _ => return Err(failed(SyncStatus::ParsingError)),
            }
        }
        SyncStatus::DeviceNotRegistered if auth_type == AuthType::Tpm => {
            let host = field(broker.and_then(|b| b.host))?
                .ok_or_else(|| failed(SyncStatus::ParsingError))?;
            info!("sync: TPM device not registered yet, enrolling");
            (host, format!("{}-{}", company_id, unique_id))
        }
        other => return Err(failed(other)),
    };

    Ok(SyncResult {
        status,
        broker: BrokerParams {
            host,
            client_id,
            username: field(broker.and_then(|b| b.username))?,
            password_seed: field(broker.and_then(|b| b.pass))?,
            subscribe_topic: field(broker.and_then(|b| b.sub))?,
            publish_topic: field(broker.and_then(|b| b.publish))?,
        },
        device_telemetry_group_id: field(document.dtg)?,
    })
}

fn decode(json: &str) -> Option<SyncDocument<'_>> {
    match serde_json_core::from_str::<Enveloped<SyncDocument<'_>>>(json) {
        Ok((envelope, _)) => Some(envelope.d),
        Err(_) => serde_json_core::from_str::<SyncDocument<'_>>(json)
            .ok()
            .map(|(document, _)| document),
    }
}
