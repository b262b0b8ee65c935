//! HTTP/1.1 for the discovery and identity endpoints.
//!
//! [`Client`] speaks HTTP over an already open [`Connection`](crate::network::Connection).
//! [`HttpsClient`] opens a fresh TLS connection per request through a
//! [`TlsConnect`] implementation and is the SDK's default
//! [`HttpsTransport`].
//!
//! ```rust,no_run
//! use iotconnect::bootstrap::HttpsTransport;
//! use iotconnect::network::application::http::HttpsClient;
//! # use iotconnect::network::{Connection, TlsConnect, TlsOptions};
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
//! # struct Tls;
//! # impl TlsConnect for Tls {
//! #     type Connection = TlsStream;
//! #     type Error = ();
//! #     fn connect_tls(&mut self, _: &str, _: &TlsOptions<'_>) -> Result<TlsStream, ()> { Ok(TlsStream) }
//! # }
//!
//! let mut https = HttpsClient::new(Tls);
//! let response = https
//!     .request("https://discovery.iotconnect.io/api/sdk/cpid/avtds/lang/M_C/ver/2.0/env/Avnet", None)
//!     .unwrap();
//! assert_eq!(response.status, 200);
//! ```

/// HTTP client implementation and supporting types.
pub mod client;

pub use client::{Client, Header, Method, Request, Response};

use crate::bootstrap::{HttpResponse, HttpsTransport};
use crate::network::error::Error;
use crate::network::url::HttpsUrl;
use crate::network::{Close, TlsConnect, TlsOptions};
use alloc::format;
use alloc::string::String;

const USER_AGENT: &str = concat!("iotconnect-rust/", env!("CARGO_PKG_VERSION"));

/// [`HttpsTransport`] that opens one TLS connection per request.
pub struct HttpsClient<T: TlsConnect> {
    connector: T,
    trust_store: Option<String>,
    max_response: usize,
}

impl<T: TlsConnect> HttpsClient<T> {
    /// Uses the connector's default trust anchors.
    pub fn new(connector: T) -> Self {
        Self {
            connector,
            trust_store: None,
            max_response: client::DEFAULT_MAX_RESPONSE,
        }
    }

    /// Verifies the discovery and identity hosts against `trust_store`.
    pub fn with_trust_store(mut self, trust_store: impl Into<String>) -> Self {
        self.trust_store = Some(trust_store.into());
        self
    }

    /// Caps the size of a response.
    pub fn with_max_response(mut self, max_response: usize) -> Self {
        self.max_response = max_response;
        self
    }
}

impl<T: TlsConnect> core::fmt::Debug for HttpsClient<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HttpsClient")
            .field("trust_store", &self.trust_store)
            .field("max_response", &self.max_response)
            .finish()
    }
}

impl<T: TlsConnect> HttpsTransport for HttpsClient<T> {
    type Error = Error;

    fn request(&mut self, url: &str, body: Option<&str>) -> Result<HttpResponse, Self::Error> {
        let url = HttpsUrl::parse(url)?;
        let tls = TlsOptions::server(url.host, self.trust_store.as_deref());
        let remote = format!("{}:{}", url.host, url.port);
        let connection = self
            .connector
            .connect_tls(&remote, &tls)
            .map_err(|_| Error::TlsError)?;

        let host = if url.port == crate::network::url::HTTPS_PORT {
            String::from(url.host)
        } else {
            remote.clone()
        };
        let (method, headers): (Method, &[(&str, &str)]) = match body {
            Some(_) => (
                Method::Post,
                &[
                    ("Accept", "application/json"),
                    ("Content-Type", "application/json"),
                    ("User-Agent", USER_AGENT),
                ],
            ),
            None => (
                Method::Get,
                &[("Accept", "application/json"), ("User-Agent", USER_AGENT)],
            ),
        };
        let request = Request {
            method,
            host: &host,
            path: url.path,
            headers,
            body: body.map(str::as_bytes),
        };

        let mut client = Client::new(connection).with_max_response(self.max_response);
        let result = client.request(&request);
        // Connection: close was requested; a failing close changes nothing
        let _ = client.into_inner().close();

        let response = result?;
        Ok(HttpResponse {
            status: response.status_code,
            body: response.body,
        })
    }
}
