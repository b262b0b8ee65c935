//! Device authentication material.
//!
//! Exactly one [`AuthCredential`] variant is active per session. The trust store
//! (CA bundle used to verify the broker) is common to every variant and mandatory.

use alloc::string::String;
use core::fmt;

pub mod sas;

pub use sas::{SasError, SasToken, derive_sas_token, sign_sas_token};

/// Authentication method, without its secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// Device certificate and private key (CA-signed or self-signed).
    X509,
    /// IoT Hub symmetric key (primary or secondary); a SAS token is derived from it.
    SymmetricKey,
    /// Broker password handed out by the identity service.
    Token,
    /// TPM attestation through the provisioning service.
    Tpm,
}

impl AuthType {
    /// Short name used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::X509 => "x509",
            AuthType::SymmetricKey => "symmetric-key",
            AuthType::Token => "token",
            AuthType::Tpm => "tpm",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AuthType {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

/// Variant-specific authentication secrets.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthCredential {
    /// Mutual TLS with a device certificate.
    X509 {
        /// Path to the PEM device certificate (or chain).
        cert_path: String,
        /// Path to the PEM device private key.
        key_path: String,
    },
    /// Symmetric key, base64 encoded as shown in the portal.
    SymmetricKey {
        /// The key material.
        key: String,
    },
    /// Password taken from the sync response.
    Token,
    /// TPM enrollment.
    Tpm {
        /// Provisioning service ID scope.
        scope_id: String,
        /// Hardware-derived registration id, used as the device unique id when the
        /// configuration leaves it blank.
        registration_id: Option<String>,
    },
}

impl AuthCredential {
    /// The method this credential authenticates with.
    pub fn auth_type(&self) -> AuthType {
        match self {
            AuthCredential::X509 { .. } => AuthType::X509,
            AuthCredential::SymmetricKey { .. } => AuthType::SymmetricKey,
            AuthCredential::Token => AuthType::Token,
            AuthCredential::Tpm { .. } => AuthType::Tpm,
        }
    }
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthCredential::X509 {
                cert_path,
                key_path,
            } => f
                .debug_struct("X509")
                .field("cert_path", cert_path)
                .field("key_path", key_path)
                .finish(),
            AuthCredential::SymmetricKey { .. } => f
                .debug_struct("SymmetricKey")
                .field("key", &"<redacted>")
                .finish(),
            AuthCredential::Token => f.write_str("Token"),
            AuthCredential::Tpm {
                scope_id,
                registration_id,
            } => f
                .debug_struct("Tpm")
                .field("scope_id", scope_id)
                .field("registration_id", registration_id)
                .finish(),
        }
    }
}

/// Trust store plus the active credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    /// CA bundle used to verify the remote MQTT host.
    pub trust_store: String,
    /// The device credential.
    pub credential: AuthCredential,
}

impl AuthInfo {
    /// Bundles a trust store with a credential.
    pub fn new(trust_store: impl Into<String>, credential: AuthCredential) -> Self {
        Self {
            trust_store: trust_store.into(),
            credential,
        }
    }

    /// Shorthand for [`AuthCredential::auth_type`].
    pub fn auth_type(&self) -> AuthType {
        self.credential.auth_type()
    }
}
