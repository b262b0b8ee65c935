//! Errors surfaced by the session.
//!
//! Each bootstrap stage has its own error type; [`Error`] tags which stage
//! failed so callers can tell configuration mistakes (fatal) from network and
//! service conditions (worth another attempt).

use crate::auth::SasError;
use crate::bootstrap::{DiscoveryError, SyncStatus};
use crate::config::ConfigError;
use crate::session::{SessionState, TransportError};
use alloc::string::String;
use core::fmt;

/// Result type used across the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// A failed session operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The configuration is incomplete or contradictory. No network activity
    /// took place.
    ConfigInvalid(ConfigError),
    /// The identity service URL could not be resolved.
    DiscoveryFailed(DiscoveryError),
    /// The identity service rejected the device or returned nothing usable.
    SyncFailed {
        /// Device status reported by the service, or the local failure class.
        status: SyncStatus,
        /// Raw response body, when there was one.
        response: Option<String>,
    },
    /// The broker password could not be produced.
    CredentialDerivationFailed(SasError),
    /// The MQTT transport failed.
    TransportFailed(TransportError),
    /// Memory for a request, token or message could not be allocated.
    AllocationFailure,
    /// The operation is not allowed in the current state.
    InvalidState(SessionState),
}

impl Error {
    /// Whether repeating the operation unchanged can succeed.
    ///
    /// Configuration errors, bad key material and device states that need
    /// action in the portal are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConfigInvalid(_) => false,
            Error::CredentialDerivationFailed(SasError::BadKey) => false,
            Error::SyncFailed { status, .. } => status.is_transient(),
            _ => true,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::ConfigInvalid(err)
    }
}

impl From<DiscoveryError> for Error {
    fn from(err: DiscoveryError) -> Self {
        Error::DiscoveryFailed(err)
    }
}

impl From<SasError> for Error {
    fn from(err: SasError) -> Self {
        Error::CredentialDerivationFailed(err)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::TransportFailed(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigInvalid(err) => write!(f, "invalid configuration: {}", err),
            Error::DiscoveryFailed(err) => write!(f, "discovery failed: {}", err),
            Error::SyncFailed { status, .. } => write!(f, "sync failed: {}", status),
            Error::CredentialDerivationFailed(err) => {
                write!(f, "credential derivation failed: {}", err)
            }
            Error::TransportFailed(err) => write!(f, "transport failed: {}", err),
            Error::AllocationFailure => f.write_str("allocation failure"),
            Error::InvalidState(state) => write!(f, "not allowed while {}", state),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::ConfigInvalid(err) => defmt::write!(f, "ConfigInvalid({})", err),
            Error::DiscoveryFailed(err) => defmt::write!(f, "DiscoveryFailed({})", err),
            Error::SyncFailed { status, .. } => defmt::write!(f, "SyncFailed({})", status),
            Error::CredentialDerivationFailed(err) => {
                defmt::write!(f, "CredentialDerivationFailed({})", err)
            }
            Error::TransportFailed(err) => defmt::write!(f, "TransportFailed({})", err),
            Error::AllocationFailure => defmt::write!(f, "AllocationFailure"),
            Error::InvalidState(state) => defmt::write!(f, "InvalidState({})", state),
        }
    }
}
