//! HTTP response body validation and JSON string helpers.

use alloc::string::String;
use core::fmt;

/// Why a response body cannot be handed to a JSON parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    /// No body at all.
    Empty,
    /// The body is not UTF-8 or has no `{` to start parsing from.
    NotJson,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseError::Empty => f.write_str("empty response"),
            ResponseError::NotJson => f.write_str("response is not JSON"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ResponseError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ResponseError::Empty => defmt::write!(f, "Empty"),
            ResponseError::NotJson => defmt::write!(f, "NotJson"),
        }
    }
}

/// Returns the JSON document inside `body`, starting at its first `{`.
///
/// The identity service sometimes sends whitespace or a byte order mark before
/// the document; that is logged and skipped. Trailing whitespace is trimmed.
pub fn validate_response(body: &[u8]) -> Result<&str, ResponseError> {
    if body.is_empty() {
        return Err(ResponseError::Empty);
    }
    let start = body
        .iter()
        .position(|&b| b == b'{')
        .ok_or(ResponseError::NotJson)?;
    if start > 0 {
        warn!("response JSON starts at byte {}, skipping leading bytes", start);
    }

    let json = core::str::from_utf8(&body[start..]).map_err(|_| ResponseError::NotJson)?;
    Ok(json.trim_end())
}

/// Resolves JSON escape sequences in a string slice borrowed from a document.
///
/// `serde-json-core` hands out borrowed strings verbatim, so `"https:\/\/host"`
/// arrives with its backslashes. Returns `None` for a malformed escape.
pub(crate) fn unescape(raw: &str) -> Option<String> {
    if !raw.contains('\\') {
        return Some(String::from(raw));
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let decoded = match chars.next()? {
            '"' => '"',
            '\\' => '\\',
            '/' => '/',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'u' => {
                let mut code = 0u32;
                for _ in 0..4 {
                    code = code * 16 + chars.next()?.to_digit(16)?;
                }
                // surrogate pairs do not occur in host names, ids or topics
                char::from_u32(code)?
            }
            _ => return None,
        };
        out.push(decoded);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_rejected() {
        assert_eq!(validate_response(b""), Err(ResponseError::Empty));
    }

    #[test]
    fn body_without_brace_is_not_json() {
        assert_eq!(
            validate_response(b"<html>502 Bad Gateway</html>"),
            Err(ResponseError::NotJson)
        );
    }

    #[test]
    fn leading_noise_is_skipped() {
        assert_eq!(
            validate_response(b" \r\n{\"ds\":0}\n"),
            Ok("{\"ds\":0}")
        );
        assert_eq!(
            validate_response("\u{feff}{\"a\":1}".as_bytes()),
            Ok("{\"a\":1}")
        );
    }

    #[test]
    fn document_at_byte_zero_is_returned_whole() {
        assert_eq!(validate_response(b"{}"), Ok("{}"));
    }

    #[test]
    fn escapes_are_resolved() {
        assert_eq!(
            unescape(r"https:\/\/h1\/p\/").as_deref(),
            Some("https://h1/p/")
        );
        assert_eq!(unescape(r#"a\"b\u0041"#).as_deref(), Some("a\"bA"));
        assert_eq!(unescape(r"bad\q"), None);
    }
}
