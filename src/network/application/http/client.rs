use crate::network::Connection;
use crate::network::error::Error;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;

/// Default cap on a whole response (status line, headers and body).
pub const DEFAULT_MAX_RESPONSE: usize = 16 * 1024;

const READ_CHUNK: usize = 256;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name as sent by the server.
    pub name: String,
    /// Value with surrounding whitespace removed.
    pub value: String,
}

/// An HTTP/1.1 request.
///
/// `Host`, `Connection: close` and, when there is a body, `Content-Length` are
/// always sent; `headers` adds to them.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Request method.
    pub method: Method,
    /// Value of the `Host` header.
    pub host: &'a str,
    /// Path and query.
    pub path: &'a str,
    /// Extra headers.
    pub headers: &'a [(&'a str, &'a str)],
    /// Request body.
    pub body: Option<&'a [u8]>,
}

/// A parsed HTTP response with the body fully read and de-chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code from the status line.
    pub status_code: u16,
    /// Response headers in the order received.
    pub headers: Vec<Header>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl Response {
    /// First header called `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(usize),
    Chunked,
    UntilClose,
}

struct Head {
    status_code: u16,
    headers: Vec<Header>,
    framing: Framing,
    body_start: usize,
}

/// One-request-per-connection HTTP/1.1 client.
pub struct Client<C: Connection> {
    connection: C,
    max_response: usize,
}

impl<C: Connection> Client<C> {
    /// Wraps an open connection.
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            max_response: DEFAULT_MAX_RESPONSE,
        }
    }

    /// Caps the number of bytes read for one response.
    pub fn with_max_response(mut self, max_response: usize) -> Self {
        self.max_response = max_response;
        self
    }

    /// Returns the underlying connection.
    pub fn into_inner(self) -> C {
        self.connection
    }

    /// Sends `request` and reads the complete response.
    ///
    /// The body is delimited by `Content-Length`, chunked transfer encoding, or
    /// the server closing the connection, in that order of preference.
    pub fn request(&mut self, request: &Request<'_>) -> Result<Response, Error> {
        let head = encode_head(request)?;
        self.write_all(head.as_bytes())?;
        if let Some(body) = request.body {
            self.write_all(body)?;
        }
        self.connection.flush().map_err(|_| Error::WriteError)?;

        self.read_response()
    }

    fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        while !buf.is_empty() {
            match self.connection.write(buf) {
                Ok(0) | Err(_) => return Err(Error::WriteError),
                Ok(n) => buf = &buf[n..],
            }
        }
        Ok(())
    }

    fn read_response(&mut self) -> Result<Response, Error> {
        let mut raw: Vec<u8> = Vec::new();
        let mut head: Option<Head> = None;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if head.is_none() {
                if let Some(end) = find_slice(&raw, b"\r\n\r\n") {
                    head = Some(parse_head(&raw[..end], end + 4)?);
                }
            }
            if let Some(head) = &head {
                let data = &raw[head.body_start..];
                if let Some(body) = complete_body(head.framing, data, self.max_response)? {
                    return Ok(finish(head, body));
                }
            }

            let n = self
                .connection
                .read(&mut chunk)
                .map_err(|_| Error::ReadError)?;
            if n == 0 {
                break;
            }
            if raw.len() + n > self.max_response {
                return Err(Error::Overflow);
            }
            raw.try_reserve(n).map_err(|_| Error::Overflow)?;
            raw.extend_from_slice(&chunk[..n]);
        }

        // the server closed the connection
        match head {
            Some(head) if head.framing == Framing::UntilClose => {
                let body = raw[head.body_start..].to_vec();
                Ok(finish(&head, body))
            }
            Some(_) => Err(Error::ConnectionClosed),
            None if raw.is_empty() => Err(Error::ConnectionClosed),
            None => Err(Error::ProtocolError),
        }
    }
}

fn encode_head(request: &Request<'_>) -> Result<String, Error> {
    let mut head = String::new();
    let written = (|| -> core::fmt::Result {
        write!(head, "{} {} HTTP/1.1\r\n", request.method.as_str(), request.path)?;
        write!(head, "Host: {}\r\n", request.host)?;
        head.push_str("Connection: close\r\n");
        for (name, value) in request.headers {
            write!(head, "{}: {}\r\n", name, value)?;
        }
        if let Some(body) = request.body {
            write!(head, "Content-Length: {}\r\n", body.len())?;
        }
        head.push_str("\r\n");
        Ok(())
    })();
    written.map_err(|_| Error::WriteError)?;
    Ok(head)
}

fn parse_head(data: &[u8], body_start: usize) -> Result<Head, Error> {
    let text = core::str::from_utf8(data).map_err(|_| Error::ProtocolError)?;
    let mut lines = text.split("\r\n");

    let status_line = lines.next().ok_or(Error::ProtocolError)?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().ok_or(Error::ProtocolError)?;
    if !version.starts_with("HTTP/") {
        return Err(Error::ProtocolError);
    }
    let status_code = parts
        .next()
        .ok_or(Error::ProtocolError)?
        .parse::<u16>()
        .map_err(|_| Error::ProtocolError)?;

    let mut headers = Vec::new();
    let mut framing = Framing::UntilClose;
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line.split_once(':').ok_or(Error::ProtocolError)?;
        let (name, value) = (name.trim(), value.trim());

        if name.eq_ignore_ascii_case("Transfer-Encoding")
            && value.to_ascii_lowercase().contains("chunked")
        {
            framing = Framing::Chunked;
        } else if name.eq_ignore_ascii_case("Content-Length") && framing != Framing::Chunked {
            let len = value.parse::<usize>().map_err(|_| Error::ProtocolError)?;
            framing = Framing::Length(len);
        }

        headers.push(Header {
            name: String::from(name),
            value: String::from(value),
        });
    }

    Ok(Head {
        status_code,
        headers,
        framing,
        body_start,
    })
}

/// Returns the body once `data` holds all of it.
fn complete_body(
    framing: Framing,
    data: &[u8],
    max_response: usize,
) -> Result<Option<Vec<u8>>, Error> {
    match framing {
        Framing::Length(len) if data.len() >= len => Ok(Some(data[..len].to_vec())),
        Framing::Length(_) | Framing::UntilClose => Ok(None),
        Framing::Chunked => decode_chunked(data, max_response),
    }
}

/// Decodes a chunked body. `Ok(None)` while the terminating chunk is still
/// missing; trailers are ignored. A chunk larger than `max_size` is an
/// [`Error::Overflow`].
fn decode_chunked(data: &[u8], max_size: usize) -> Result<Option<Vec<u8>>, Error> {
    let mut body = Vec::new();
    let mut pos = 0;
    loop {
        let Some(line_len) = find_slice(&data[pos..], b"\r\n") else {
            return Ok(None);
        };
        let line = core::str::from_utf8(&data[pos..pos + line_len])
            .map_err(|_| Error::ProtocolError)?;
        let size = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size, 16).map_err(|_| Error::ProtocolError)?;
        pos += line_len + 2;

        if size == 0 {
            return Ok(Some(body));
        }
        if size > max_size {
            return Err(Error::Overflow);
        }
        let end = pos
            .checked_add(size)
            .and_then(|n| n.checked_add(2))
            .ok_or(Error::Overflow)?;
        if data.len() < end {
            return Ok(None);
        }
        if &data[end - 2..end] != b"\r\n" {
            return Err(Error::ProtocolError);
        }
        body.extend_from_slice(&data[pos..end - 2]);
        pos = end;
    }
}

fn finish(head: &Head, body: Vec<u8>) -> Response {
    Response {
        status_code: head.status_code,
        headers: head.headers.clone(),
        body,
    }
}

fn find_slice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_body_is_reassembled() {
        let data = b"5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\n\r\n";
        assert_eq!(
            decode_chunked(data, 1024).unwrap().as_deref(),
            Some(&b"hello world"[..])
        );
    }

    #[test]
    fn partial_chunked_body_is_incomplete() {
        assert_eq!(decode_chunked(b"5\r\nhel", 1024).unwrap(), None);
        assert_eq!(decode_chunked(b"5\r\nhello\r\n", 1024).unwrap(), None);
    }

    #[test]
    fn bad_chunk_size_is_a_protocol_error() {
        assert_eq!(decode_chunked(b"zz\r\n", 1024), Err(Error::ProtocolError));
    }

    #[test]
    fn chunk_larger_than_the_response_cap_overflows() {
        assert_eq!(
            decode_chunked(b"ffffffffffffffff\r\nab\r\n", 1024),
            Err(Error::Overflow)
        );
        assert_eq!(decode_chunked(b"401\r\nab", 1024), Err(Error::Overflow));
    }

    #[test]
    fn head_prefers_chunked_over_length() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Length: 3";
        let head = parse_head(raw, raw.len() + 4).unwrap();
        assert_eq!(head.status_code, 200);
        assert_eq!(head.framing, Framing::Chunked);
        assert_eq!(head.headers.len(), 2);
    }

    #[test]
    fn request_head_carries_mandatory_headers() {
        let request = Request {
            method: Method::Post,
            host: "h1",
            path: "/p/sync?",
            headers: &[("Content-Type", "application/json")],
            body: Some(b"{}"),
        };
        let head = encode_head(&request).unwrap();
        assert_eq!(
            head,
            "POST /p/sync? HTTP/1.1\r\nHost: h1\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n"
        );
    }
}
