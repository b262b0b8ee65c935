//! URL helpers.

use super::error::Error;
use alloc::string::String;

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Default port for `https://` URLs.
pub const HTTPS_PORT: u16 = 443;

/// Returns `true` for bytes that pass through [`percent_encode`] unescaped.
pub fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'~' | b'.')
}

/// Percent-encodes `input`.
///
/// ASCII alphanumerics and `-_~.` pass through. Every other byte, including each
/// byte of a multi-byte UTF-8 sequence, becomes `%XX` with uppercase hex digits.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    push_percent_encoded(&mut out, input);
    out
}

/// Appends the percent-encoded form of `input` to `out`.
pub fn push_percent_encoded(out: &mut String, input: &str) {
    for &byte in input.as_bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX_UPPER[(byte >> 4) as usize] as char);
            out.push(HEX_UPPER[(byte & 0x0F) as usize] as char);
        }
    }
}

/// An `https://` URL split into the parts an HTTP/1.1 request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpsUrl<'a> {
    /// Host name, without port.
    pub host: &'a str,
    /// Explicit port, or 443.
    pub port: u16,
    /// Path including the query string. Always starts with `/`.
    pub path: &'a str,
}

impl<'a> HttpsUrl<'a> {
    /// Parses `https://host[:port][/path][?query]`.
    ///
    /// Only the `https` scheme is accepted; the bootstrap endpoints are never plain
    /// HTTP.
    pub fn parse(url: &'a str) -> Result<Self, Error> {
        let rest = url.strip_prefix("https://").ok_or(Error::InvalidAddress)?;
        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, path) = rest.split_at(authority_end);
        let path = if path.is_empty() { "/" } else { path };
        if !path.starts_with('/') {
            // `https://host?query` has no path; not something the service returns
            return Err(Error::InvalidAddress);
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| Error::InvalidAddress)?,
            ),
            None => (authority, HTTPS_PORT),
        };
        if host.is_empty() {
            return Err(Error::InvalidAddress);
        }

        Ok(Self { host, port, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_characters_pass_through_unchanged() {
        let safe = "AZaz09-_~.poc-iotconnect-iothub-eu.azure-devices.net";
        assert_eq!(percent_encode(safe), safe);
    }

    #[test]
    fn reserved_characters_are_uppercase_hex() {
        assert_eq!(percent_encode("a/b c"), "a%2Fb%20c");
        assert_eq!(percent_encode("k+z/w=="), "k%2Bz%2Fw%3D%3D");
        assert_eq!(percent_encode("\n"), "%0A");
    }

    #[test]
    fn multibyte_utf8_is_encoded_per_byte() {
        assert_eq!(percent_encode("é"), "%C3%A9");
    }

    #[test]
    fn encoding_an_encoded_string_escapes_the_percent() {
        assert_eq!(percent_encode("%2F"), "%252F");
    }

    #[test]
    fn parse_full_url() {
        let url = HttpsUrl::parse("https://h1:8443/p/sync?").unwrap();
        assert_eq!(url.host, "h1");
        assert_eq!(url.port, 8443);
        assert_eq!(url.path, "/p/sync?");
    }

    #[test]
    fn parse_defaults_port_and_path() {
        let url = HttpsUrl::parse("https://discovery.iotconnect.io").unwrap();
        assert_eq!(url.host, "discovery.iotconnect.io");
        assert_eq!(url.port, HTTPS_PORT);
        assert_eq!(url.path, "/");
    }

    #[test]
    fn parse_rejects_other_schemes_and_bad_ports() {
        assert_eq!(
            HttpsUrl::parse("http://h1/p/"),
            Err(Error::InvalidAddress)
        );
        assert_eq!(
            HttpsUrl::parse("https://h1:http/p/"),
            Err(Error::InvalidAddress)
        );
        assert_eq!(HttpsUrl::parse("https:///p/"), Err(Error::InvalidAddress));
    }

    #[test]
    fn parse_query_without_path_is_rejected() {
        assert_eq!(HttpsUrl::parse("https://h1?x=1"), Err(Error::InvalidAddress));
    }
}
