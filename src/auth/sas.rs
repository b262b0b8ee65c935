//! Shared Access Signature tokens for symmetric-key devices.
//!
//! Azure IoT Hub accepts a SAS token as the MQTT password. The token signs the
//! device resource URI and an absolute expiry with the device's symmetric key:
//!
//! ```text
//! SharedAccessSignature sr={encoded resource uri}&sig={encoded signature}&se={expiry}
//!
//! resource uri   = {hub host}/devices/{client id}
//! string to sign = {encoded resource uri} "\n" {expiry}
//! signature      = base64(HMAC-SHA256(base64-decoded key, string to sign))
//! ```
//!
//! "encoded" is [`percent_encode`](crate::network::url::percent_encode).

use crate::clock::Clock;
use crate::network::url::push_percent_encoded;
use alloc::string::String;
use base64ct::{Base64, Encoding};
use core::fmt::{self, Write as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "SharedAccessSignature sr=";
const DEVICES_SEGMENT: &str = "/devices/";

/// Error returned when a token cannot be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasError {
    /// The key is not valid standard base64 or decodes to nothing.
    BadKey,
    /// A buffer for an intermediate string could not be allocated.
    OutOfMemory,
    /// Token authentication was selected but the identity service returned no
    /// token seed.
    MissingToken,
    /// A password was derived but the identity service returned no broker
    /// username to send it with.
    MissingUsername,
}

impl fmt::Display for SasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SasError::BadKey => f.write_str("symmetric key is not valid base64"),
            SasError::OutOfMemory => f.write_str("out of memory while building token"),
            SasError::MissingToken => f.write_str("identity service returned no token"),
            SasError::MissingUsername => f.write_str("identity service returned no username"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SasError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SasError::BadKey => defmt::write!(f, "BadKey"),
            SasError::OutOfMemory => defmt::write!(f, "OutOfMemory"),
            SasError::MissingToken => defmt::write!(f, "MissingToken"),
            SasError::MissingUsername => defmt::write!(f, "MissingUsername"),
        }
    }
}

/// A signed, time-limited access token.
///
/// Never persisted: a fresh token is derived for every connect.
#[derive(Clone, PartialEq, Eq)]
pub struct SasToken {
    value: String,
    expires_at: u64,
}

impl SasToken {
    /// The full `SharedAccessSignature ...` string.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Unix time (seconds) after which the service rejects the token.
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Whether the token has expired according to `clock`.
    pub fn is_expired(&self, clock: &impl Clock) -> bool {
        clock.now_secs() >= self.expires_at
    }

    /// Consumes the token, returning the wire string.
    pub fn into_string(self) -> String {
        self.value
    }
}

impl fmt::Debug for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Derives a token valid for `ttl_secs` from now.
///
/// `host` is the broker (IoT Hub) host and `client_id` the device id the broker
/// knows the device by, both as returned by sync.
pub fn derive_sas_token(
    host: &str,
    client_id: &str,
    base64_key: &str,
    ttl_secs: u64,
    clock: &impl Clock,
) -> Result<SasToken, SasError> {
    let expires_at = clock.now_secs().saturating_add(ttl_secs);
    sign_sas_token(host, client_id, base64_key, expires_at)
}

/// Signs a token with an explicit absolute expiry.
pub fn sign_sas_token(
    host: &str,
    client_id: &str,
    base64_key: &str,
    expires_at: u64,
) -> Result<SasToken, SasError> {
    let key = Base64::decode_vec(base64_key.trim()).map_err(|_| SasError::BadKey)?;
    if key.is_empty() {
        return Err(SasError::BadKey);
    }

    let mut resource_uri = String::new();
    resource_uri
        .try_reserve(host.len() + DEVICES_SEGMENT.len() + client_id.len())
        .map_err(|_| SasError::OutOfMemory)?;
    resource_uri.push_str(host);
    resource_uri.push_str(DEVICES_SEGMENT);
    resource_uri.push_str(client_id);

    let encoded_uri = encode(&resource_uri)?;

    // u64::MAX has 20 digits
    let mut string_to_sign = String::new();
    string_to_sign
        .try_reserve(encoded_uri.len() + 1 + 20)
        .map_err(|_| SasError::OutOfMemory)?;
    string_to_sign.push_str(&encoded_uri);
    string_to_sign.push('\n');
    write!(string_to_sign, "{}", expires_at).map_err(|_| SasError::OutOfMemory)?;

    let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| SasError::BadKey)?;
    mac.update(string_to_sign.as_bytes());
    let digest = mac.finalize().into_bytes();

    let signature = Base64::encode_string(&digest);
    let encoded_signature = encode(&signature)?;

    let mut value = String::new();
    value
        .try_reserve(TOKEN_PREFIX.len() + encoded_uri.len() + encoded_signature.len() + 30)
        .map_err(|_| SasError::OutOfMemory)?;
    value.push_str(TOKEN_PREFIX);
    value.push_str(&encoded_uri);
    value.push_str("&sig=");
    value.push_str(&encoded_signature);
    value.push_str("&se=");
    write!(value, "{}", expires_at).map_err(|_| SasError::OutOfMemory)?;

    Ok(SasToken { value, expires_at })
}

fn encode(input: &str) -> Result<String, SasError> {
    let mut out = String::new();
    out.try_reserve(input.len() * 3)
        .map_err(|_| SasError::OutOfMemory)?;
    push_percent_encoded(&mut out, input);
    Ok(out)
}
