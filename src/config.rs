//! Client configuration and its validation.
//!
//! Configuration is built in code by the application; nothing here touches the
//! network. [`ClientConfig::validate`] runs before every bootstrap so a broken
//! configuration fails fast without a single HTTP request.

use crate::auth::{AuthCredential, AuthInfo, AuthType};
use crate::network::application::mqtt::QoS;
use crate::session::Callbacks;
use alloc::string::String;
use core::fmt;

/// Default QoS for outbound messages.
pub const DEFAULT_QOS: QoS = QoS::AtLeastOnce;

/// Default lifetime of a derived SAS token, in seconds.
pub const DEFAULT_SAS_TOKEN_TTL_SECS: u64 = 60;

/// Cloud backend hosting the device's IoTConnect instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// AWS IoT Core.
    Aws,
    /// Azure IoT Hub.
    Azure,
}

impl ConnectionType {
    /// Whether devices on this backend may authenticate with `auth`.
    ///
    /// AWS IoT Core only accepts X.509 device certificates; SAS tokens, broker
    /// tokens and TPM enrollment are IoT Hub mechanisms.
    pub fn supports(&self, auth: AuthType) -> bool {
        match self {
            ConnectionType::Aws => auth == AuthType::X509,
            ConnectionType::Azure => true,
        }
    }

    /// Short name used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Aws => "aws",
            ConnectionType::Azure => "azure",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectionType {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

/// Who the device is. Immutable once the session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Company id (CPID), from the portal key vault.
    pub company_id: String,
    /// Environment name, from the portal key vault.
    pub environment: String,
    /// Device unique id. May be left empty for TPM devices whose registration id
    /// is used instead.
    pub device_unique_id: String,
}

impl DeviceIdentity {
    /// Builds an identity.
    pub fn new(
        company_id: impl Into<String>,
        environment: impl Into<String>,
        device_unique_id: impl Into<String>,
    ) -> Self {
        Self {
            company_id: company_id.into(),
            environment: environment.into(),
            device_unique_id: device_unique_id.into(),
        }
    }
}

/// A configuration problem found before any network activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A required value is empty. Carries the value's name.
    MissingValue(&'static str),
    /// The credential type is not available on the selected backend.
    UnsupportedAuth {
        /// Selected backend.
        connection_type: ConnectionType,
        /// Rejected credential type.
        auth_type: AuthType,
    },
    /// The brokers do not support the requested QoS.
    UnsupportedQos(QoS),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingValue(name) => write!(f, "configuration value {} is required", name),
            ConfigError::UnsupportedAuth {
                connection_type,
                auth_type,
            } => write!(
                f,
                "{} authentication is not supported on {}",
                auth_type, connection_type
            ),
            ConfigError::UnsupportedQos(qos) => write!(f, "QoS {} is not supported", *qos as u8),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConfigError::MissingValue(name) => defmt::write!(f, "MissingValue({=str})", name),
            ConfigError::UnsupportedAuth {
                connection_type,
                auth_type,
            } => defmt::write!(f, "UnsupportedAuth({}, {})", auth_type, connection_type),
            ConfigError::UnsupportedQos(qos) => defmt::write!(f, "UnsupportedQos({=u8})", *qos as u8),
        }
    }
}

/// Everything the session needs to bootstrap and connect.
pub struct ClientConfig {
    /// Cloud backend.
    pub connection_type: ConnectionType,
    /// Device identity.
    pub identity: DeviceIdentity,
    /// Trust store and credential.
    pub auth: AuthInfo,
    /// QoS for outbound messages.
    pub qos: QoS,
    /// Log every inbound and outbound payload at debug level.
    pub trace_data: bool,
    /// Overrides the discovery host for the connection type.
    pub discovery_host: Option<String>,
    /// Lifetime of derived SAS tokens.
    pub sas_token_ttl_secs: u64,
    /// Application callbacks.
    pub callbacks: Callbacks,
}

impl ClientConfig {
    /// Creates a configuration with default QoS, token lifetime and no callbacks.
    pub fn new(connection_type: ConnectionType, identity: DeviceIdentity, auth: AuthInfo) -> Self {
        Self {
            connection_type,
            identity,
            auth,
            qos: DEFAULT_QOS,
            trace_data: false,
            discovery_host: None,
            sas_token_ttl_secs: DEFAULT_SAS_TOKEN_TTL_SECS,
            callbacks: Callbacks::default(),
        }
    }

    /// Sets the outbound QoS.
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Enables or disables payload tracing.
    pub fn with_trace_data(mut self, trace_data: bool) -> Self {
        self.trace_data = trace_data;
        self
    }

    /// Uses `host` instead of the public discovery service.
    pub fn with_discovery_host(mut self, host: impl Into<String>) -> Self {
        self.discovery_host = Some(host.into());
        self
    }

    /// Sets the SAS token lifetime.
    pub fn with_sas_token_ttl(mut self, secs: u64) -> Self {
        self.sas_token_ttl_secs = secs;
        self
    }

    /// Installs application callbacks.
    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// The device unique id sync is performed with.
    ///
    /// Falls back to the TPM registration id when the configured id is blank.
    pub fn device_unique_id(&self) -> Option<&str> {
        if !self.identity.device_unique_id.is_empty() {
            return Some(&self.identity.device_unique_id);
        }
        match &self.auth.credential {
            AuthCredential::Tpm {
                registration_id: Some(id),
                ..
            } if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    /// Checks that the configuration can be used for a bootstrap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.company_id.is_empty() {
            return Err(ConfigError::MissingValue("cpid"));
        }
        if self.identity.environment.is_empty() {
            return Err(ConfigError::MissingValue("env"));
        }
        if self.device_unique_id().is_none() {
            return Err(ConfigError::MissingValue("duid"));
        }

        if self.auth.trust_store.is_empty() {
            return Err(ConfigError::MissingValue("trust_store"));
        }

        match &self.auth.credential {
            AuthCredential::X509 {
                cert_path,
                key_path,
            } => {
                if cert_path.is_empty() {
                    return Err(ConfigError::MissingValue("device_cert"));
                }
                if key_path.is_empty() {
                    return Err(ConfigError::MissingValue("device_key"));
                }
            }
            AuthCredential::SymmetricKey { key } => {
                if key.trim().is_empty() {
                    return Err(ConfigError::MissingValue("symmetric_key"));
                }
            }
            AuthCredential::Token => {}
            AuthCredential::Tpm { scope_id, .. } => {
                if scope_id.is_empty() {
                    return Err(ConfigError::MissingValue("scope_id"));
                }
            }
        }

        let auth_type = self.auth.auth_type();
        if !self.connection_type.supports(auth_type) {
            return Err(ConfigError::UnsupportedAuth {
                connection_type: self.connection_type,
                auth_type,
            });
        }

        if self.qos == QoS::ExactlyOnce {
            return Err(ConfigError::UnsupportedQos(self.qos));
        }

        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("connection_type", &self.connection_type)
            .field("identity", &self.identity)
            .field("auth", &self.auth)
            .field("qos", &self.qos)
            .field("trace_data", &self.trace_data)
            .field("discovery_host", &self.discovery_host)
            .field("sas_token_ttl_secs", &self.sas_token_ttl_secs)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x509() -> AuthInfo {
        AuthInfo::new(
            "DigiCertGlobalRootG2.pem",
            AuthCredential::X509 {
                cert_path: "client-crt.pem".into(),
                key_path: "client-key.pem".into(),
            },
        )
    }

    fn config(connection_type: ConnectionType, auth: AuthInfo) -> ClientConfig {
        ClientConfig::new(
            connection_type,
            DeviceIdentity::new("avtds", "Avnet", "nik-deleteme"),
            auth,
        )
    }

    #[test]
    fn x509_on_both_backends_is_valid() {
        assert_eq!(config(ConnectionType::Aws, x509()).validate(), Ok(()));
        assert_eq!(config(ConnectionType::Azure, x509()).validate(), Ok(()));
    }

    #[test]
    fn symmetric_key_is_rejected_on_aws() {
        let auth = AuthInfo::new("AmazonRootCA1.pem", AuthCredential::SymmetricKey { key: "a2V5".into() });
        assert_eq!(
            config(ConnectionType::Aws, auth).validate(),
            Err(ConfigError::UnsupportedAuth {
                connection_type: ConnectionType::Aws,
                auth_type: AuthType::SymmetricKey,
            })
        );
    }

    #[test]
    fn missing_identity_values_are_named() {
        let mut c = config(ConnectionType::Azure, x509());
        c.identity.company_id.clear();
        assert_eq!(c.validate(), Err(ConfigError::MissingValue("cpid")));

        let mut c = config(ConnectionType::Azure, x509());
        c.identity.environment.clear();
        assert_eq!(c.validate(), Err(ConfigError::MissingValue("env")));

        let mut c = config(ConnectionType::Azure, x509());
        c.identity.device_unique_id.clear();
        assert_eq!(c.validate(), Err(ConfigError::MissingValue("duid")));
    }

    #[test]
    fn trust_store_is_required() {
        let mut auth = x509();
        auth.trust_store.clear();
        assert_eq!(
            config(ConnectionType::Azure, auth).validate(),
            Err(ConfigError::MissingValue("trust_store"))
        );
    }

    #[test]
    fn missing_device_certificate_is_fatal() {
        let auth = AuthInfo::new(
            "ca.pem",
            AuthCredential::X509 {
                cert_path: String::new(),
                key_path: "client-key.pem".into(),
            },
        );
        assert_eq!(
            config(ConnectionType::Azure, auth).validate(),
            Err(ConfigError::MissingValue("device_cert"))
        );

        let auth = AuthInfo::new(
            "ca.pem",
            AuthCredential::X509 {
                cert_path: "client-crt.pem".into(),
                key_path: String::new(),
            },
        );
        assert_eq!(
            config(ConnectionType::Azure, auth).validate(),
            Err(ConfigError::MissingValue("device_key"))
        );
    }

    #[test]
    fn blank_symmetric_key_is_fatal() {
        let auth = AuthInfo::new("ca.pem", AuthCredential::SymmetricKey { key: "  ".into() });
        assert_eq!(
            config(ConnectionType::Azure, auth).validate(),
            Err(ConfigError::MissingValue("symmetric_key"))
        );
    }

    #[test]
    fn tpm_registration_id_stands_in_for_blank_duid() {
        let auth = AuthInfo::new(
            "ca.pem",
            AuthCredential::Tpm {
                scope_id: "0ne000A1B2C".into(),
                registration_id: Some("tpm-reg-1".into()),
            },
        );
        let mut c = config(ConnectionType::Azure, auth);
        c.identity.device_unique_id.clear();
        assert_eq!(c.validate(), Ok(()));
        assert_eq!(c.device_unique_id(), Some("tpm-reg-1"));
    }

    #[test]
    fn qos_two_is_rejected() {
        let c = config(ConnectionType::Azure, x509()).with_qos(QoS::ExactlyOnce);
        assert_eq!(
            c.validate(),
            Err(ConfigError::UnsupportedQos(QoS::ExactlyOnce))
        );
    }
}
