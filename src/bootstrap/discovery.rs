//! Discovery: company id + environment → identity service base URL.

use super::response::{ResponseError, unescape, validate_response};
use super::{Enveloped, HttpsTransport};
use crate::config::ConnectionType;
use crate::network::url::push_percent_encoded;
use alloc::string::String;
use core::fmt;
use serde::Deserialize;

/// Public discovery service for Azure-hosted instances.
pub const AZURE_DISCOVERY_HOST: &str = "discovery.iotconnect.io";

/// Public discovery service for AWS-hosted instances.
pub const AWS_DISCOVERY_HOST: &str = "awsdiscovery.iotconnect.io";

/// Where the identity service for this company and environment lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    /// Identity service host.
    pub host: String,
    /// Path prefix, always starting and ending with `/`.
    pub path: String,
}

/// Why discovery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The HTTP exchange failed.
    Http,
    /// The body is empty or not JSON.
    Response(ResponseError),
    /// The body is JSON but not a discovery document.
    Parse,
    /// Host or path is missing or empty.
    MissingFields,
    /// The service reported an error code.
    Service(i32),
}

impl From<ResponseError> for DiscoveryError {
    fn from(err: ResponseError) -> Self {
        DiscoveryError::Response(err)
    }
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::Http => f.write_str("HTTP request failed"),
            DiscoveryError::Response(err) => write!(f, "{}", err),
            DiscoveryError::Parse => f.write_str("malformed discovery response"),
            DiscoveryError::MissingFields => f.write_str("discovery response lacks host or path"),
            DiscoveryError::Service(code) => write!(f, "discovery service error {}", code),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DiscoveryError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            DiscoveryError::Http => defmt::write!(f, "Http"),
            DiscoveryError::Response(err) => defmt::write!(f, "Response({})", err),
            DiscoveryError::Parse => defmt::write!(f, "Parse"),
            DiscoveryError::MissingFields => defmt::write!(f, "MissingFields"),
            DiscoveryError::Service(code) => defmt::write!(f, "Service({=i32})", code),
        }
    }
}

#[derive(Deserialize)]
struct DiscoveryDocument<'a> {
    #[serde(default)]
    ec: Option<i32>,
    #[serde(borrow, default)]
    host: Option<&'a str>,
    #[serde(borrow, default)]
    path: Option<&'a str>,
    #[serde(borrow, default)]
    bu: Option<&'a str>,
}

/// Builds the discovery GET URL.
///
/// `host` overrides the public discovery host for the connection type. Company
/// id and environment are percent-encoded.
pub fn discovery_url(
    connection_type: ConnectionType,
    host: Option<&str>,
    company_id: &str,
    environment: &str,
) -> String {
    let mut url = String::from("https://");
    match connection_type {
        ConnectionType::Azure => {
            url.push_str(host.unwrap_or(AZURE_DISCOVERY_HOST));
            url.push_str("/api/sdk/cpid/");
            push_percent_encoded(&mut url, company_id);
            url.push_str("/lang/M_C/ver/2.0/env/");
            push_percent_encoded(&mut url, environment);
        }
        ConnectionType::Aws => {
            url.push_str(host.unwrap_or(AWS_DISCOVERY_HOST));
            url.push_str("/api/v2.1/dsdk/cpId/");
            push_percent_encoded(&mut url, company_id);
            url.push_str("/env/");
            push_percent_encoded(&mut url, environment);
            url.push_str("?pf=aws");
        }
    }
    url
}

/// Performs the discovery GET and parses the result.
///
/// One request, no retries.
pub fn discover<H: HttpsTransport>(http: &mut H, url: &str) -> Result<DiscoveryResult, DiscoveryError> {
    debug!("discovery: GET {}", url);
    let response = http.request(url, None).map_err(|_| {
        error!("discovery: request failed");
        DiscoveryError::Http
    })?;
    if !(200..300).contains(&response.status) {
        warn!("discovery: HTTP status {}", response.status);
    }

    let result = validate_response(&response.body)
        .map_err(DiscoveryError::from)
        .and_then(parse_discovery);
    if let Err(err) = &result {
        error!("discovery: {}", err);
        if let Ok(body) = core::str::from_utf8(&response.body) {
            debug!("discovery response: {}", body);
        }
    }
    result
}

/// Parses a discovery document, bare or inside a `{"d": ...}` envelope.
pub fn parse_discovery(json: &str) -> Result<DiscoveryResult, DiscoveryError> {
    let document = match serde_json_core::from_str::<Enveloped<DiscoveryDocument<'_>>>(json) {
        Ok((envelope, _)) => envelope.d,
        Err(_) => {
            serde_json_core::from_str::<DiscoveryDocument<'_>>(json)
                .map_err(|_| DiscoveryError::Parse)?
                .0
        }
    };

    if let Some(code) = document.ec.filter(|&code| code != 0) {
        return Err(DiscoveryError::Service(code));
    }

    let (host, path) = match (document.host, document.path, document.bu) {
        (Some(host), Some(path), _) if !host.is_empty() && !path.is_empty() => (
            unescape(host).ok_or(DiscoveryError::Parse)?,
            unescape(path).ok_or(DiscoveryError::Parse)?,
        ),
        (_, _, Some(base_url)) => {
            let base_url = unescape(base_url).ok_or(DiscoveryError::Parse)?;
            split_base_url(&base_url)?
        }
        _ => return Err(DiscoveryError::MissingFields),
    };
    if host.is_empty() {
        return Err(DiscoveryError::MissingFields);
    }

    Ok(DiscoveryResult {
        host,
        path: normalize_path(path),
    })
}

fn split_base_url(base_url: &str) -> Result<(String, String), DiscoveryError> {
    let rest = base_url
        .strip_prefix("https://")
        .ok_or(DiscoveryError::MissingFields)?;
    let (host, path) = match rest.find('/') {
        Some(at) => rest.split_at(at),
        None => (rest, "/"),
    };
    Ok((String::from(host), String::from(path)))
}

/// The sync URL is `{path}sync?`, so the prefix must start and end with `/`.
fn normalize_path(mut path: String) -> String {
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}
