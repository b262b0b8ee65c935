//! Two-stage HTTP bootstrap.
//!
//! 1. [`discover`] asks the public discovery service where the identity service
//!    for a company id and environment lives.
//! 2. [`sync`] posts the device's unique id to that identity service and gets
//!    back the broker host, client id, credentials seed and topics.
//!
//! Both stages go through an [`HttpsTransport`], run exactly one request and
//! never retry.

use alloc::vec::Vec;
use serde::Deserialize;

pub mod discovery;
pub mod identity;
pub mod response;

pub use discovery::{
    AWS_DISCOVERY_HOST, AZURE_DISCOVERY_HOST, DiscoveryError, DiscoveryResult, discover,
    discovery_url, parse_discovery,
};
pub use identity::{BrokerParams, SyncResult, SyncStatus, sync, sync_request_body, sync_url};
pub use response::{ResponseError, validate_response};

/// Status and body of a completed HTTPS exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTPS request collaborator.
///
/// A `Some` body makes the request a POST with a JSON content type; `None` makes
/// it a GET. The bootstrap judges a response by its body alone, so
/// implementations only fail for transport problems.
pub trait HttpsTransport {
    /// Transport failure.
    type Error: core::fmt::Debug;

    /// Performs one request against an `https://` URL.
    fn request(&mut self, url: &str, body: Option<&str>) -> Result<HttpResponse, Self::Error>;
}

impl<H: HttpsTransport + ?Sized> HttpsTransport for &mut H {
    type Error = H::Error;

    fn request(&mut self, url: &str, body: Option<&str>) -> Result<HttpResponse, Self::Error> {
        (**self).request(url, body)
    }
}

/// Identity service responses may wrap the document as `{"d": {...}}`.
#[derive(Deserialize)]
struct Enveloped<T> {
    d: T,
}
