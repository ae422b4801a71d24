//! Simple HTTP client for no_std environments
//!
//! Sends a GET over any async byte connection and hands back the response
//! body as a stream, so callers can pull it a bounded chunk at a time.
//! Requests are HTTP/1.0 so servers never reply with chunked encoding.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Write as FmtWrite;
use core::str;

use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use log::debug;
use thiserror::Error;

/// Buffer used to collect the status line and headers
pub const HEADER_BUF_SIZE: usize = 4096;

/// HTTP client error types
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("failed to connect to server")]
    Connect,
    #[error("failed to resolve host")]
    Dns,
    #[error("failed to write request")]
    Write,
    #[error("failed to read response")]
    Read,
    #[error("invalid URL")]
    InvalidUrl,
    #[error("malformed response")]
    Parse,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("response headers too large")]
    TooLarge,
    #[error("TLS handshake failed")]
    Tls,
}

impl embedded_io_async::Error for HttpError {
    fn kind(&self) -> ErrorKind {
        match self {
            HttpError::Connect => ErrorKind::ConnectionRefused,
            HttpError::Read | HttpError::Write => ErrorKind::BrokenPipe,
            HttpError::InvalidUrl => ErrorKind::InvalidInput,
            HttpError::Parse | HttpError::TooLarge => ErrorKind::InvalidData,
            HttpError::Dns | HttpError::Status(_) | HttpError::Tls => ErrorKind::Other,
        }
    }
}

/// URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// Parsed URL components
#[derive(Debug, PartialEq, Eq)]
pub struct Url<'a> {
    pub scheme: Scheme,
    pub host: &'a str,
    pub port: u16,
    /// Path including any query string
    pub path: &'a str,
}

impl<'a> Url<'a> {
    /// Parse a URL string into components
    /// Supports: http://host:port/path?query, https://host:port/path?query
    pub fn parse(url: &'a str) -> Result<Self, HttpError> {
        let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (Scheme::Https, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (Scheme::Http, rest)
        } else {
            return Err(HttpError::InvalidUrl);
        };

        let default_port = match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        };

        // The authority ends at the first '/' or '?'
        let split = rest.find(['/', '?']).unwrap_or(rest.len());
        let (host_port, path) = match &rest[split..] {
            "" => (rest, "/"),
            path => (&rest[..split], path),
        };

        let (host, port) = match host_port.find(':') {
            Some(idx) => {
                let port = host_port[idx + 1..]
                    .parse()
                    .map_err(|_| HttpError::InvalidUrl)?;
                (&host_port[..idx], port)
            }
            None => (host_port, default_port),
        };

        if host.is_empty() {
            return Err(HttpError::InvalidUrl);
        }

        Ok(Url {
            scheme,
            host,
            port,
            path,
        })
    }
}

/// Response body of a GET, readable a chunk at a time
///
/// Body bytes that arrived together with the headers are served first, then
/// reads go straight to the connection. Reading stops at `Content-Length`
/// when the server sent one, otherwise at connection close.
pub struct HttpBody<C> {
    conn: C,
    status: u16,
    content_length: Option<usize>,
    head: Vec<u8>,
    head_pos: usize,
    body_read: usize,
}

impl<C> HttpBody<C> {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    /// Get remaining body bytes to read
    pub fn remaining(&self) -> Option<usize> {
        self.content_length
            .map(|len| len.saturating_sub(self.body_read))
    }
}

impl<C> ErrorType for HttpBody<C> {
    type Error = HttpError;
}

impl<C: Read> Read for HttpBody<C> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        let limit = match self.remaining() {
            Some(0) => return Ok(0),
            Some(remaining) => buf.len().min(remaining),
            None => buf.len(),
        };
        if limit == 0 {
            return Ok(0);
        }

        let n = if self.head_pos < self.head.len() {
            let pending = &self.head[self.head_pos..];
            let n = pending.len().min(limit);
            buf[..n].copy_from_slice(&pending[..n]);
            self.head_pos += n;
            if self.head_pos == self.head.len() {
                self.head = Vec::new();
                self.head_pos = 0;
            }
            n
        } else {
            self.conn
                .read(&mut buf[..limit])
                .await
                .map_err(|_| HttpError::Read)?
        };

        self.body_read += n;
        Ok(n)
    }
}

/// Perform an HTTP GET request and return the body stream
///
/// Only the status line and headers are read here. Any status outside
/// 2xx is an error; redirects are not followed.
pub async fn get<C>(
    mut conn: C,
    url: &Url<'_>,
    headers: &[(&str, &str)],
) -> Result<HttpBody<C>, HttpError>
where
    C: Read + Write,
{
    let mut request = String::new();
    write!(
        &mut request,
        "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n",
        url.path, url.host
    )
    .map_err(|_| HttpError::TooLarge)?;
    for (name, value) in headers {
        write!(&mut request, "{}: {}\r\n", name, value).map_err(|_| HttpError::TooLarge)?;
    }
    request.push_str("\r\n");

    conn.write_all(request.as_bytes())
        .await
        .map_err(|_| HttpError::Write)?;
    conn.flush().await.map_err(|_| HttpError::Write)?;

    let mut rx_buf = vec![0u8; HEADER_BUF_SIZE];
    let mut total_read = 0;

    // Read until we find \r\n\r\n
    let headers_end = loop {
        if total_read >= rx_buf.len() {
            return Err(HttpError::TooLarge);
        }

        let n = conn
            .read(&mut rx_buf[total_read..])
            .await
            .map_err(|_| HttpError::Read)?;

        if n == 0 {
            return Err(HttpError::Read);
        }

        total_read += n;

        if let Some(pos) = find_header_end(&rx_buf[..total_read]) {
            break pos;
        }
    };

    let header_str = str::from_utf8(&rx_buf[..headers_end]).map_err(|_| HttpError::Parse)?;
    let status = parse_status(header_str)?;
    let content_length = parse_header(header_str, "content-length").and_then(|v| v.parse().ok());

    debug!(
        "GET {}{} -> {} ({:?} bytes)",
        url.host, url.path, status, content_length
    );

    if !(200..300).contains(&status) {
        return Err(HttpError::Status(status));
    }

    let body_start = headers_end + 4; // Skip \r\n\r\n
    rx_buf.truncate(total_read);
    let head = rx_buf.split_off(body_start);

    Ok(HttpBody {
        conn,
        status,
        content_length,
        head,
        head_pos: 0,
        body_read: 0,
    })
}

/// Find the position of \r\n\r\n in the buffer
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse HTTP status code from status line
pub fn parse_status(headers: &str) -> Result<u16, HttpError> {
    // HTTP/1.1 200 OK
    let line = headers.lines().next().ok_or(HttpError::Parse)?;
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().ok_or(HttpError::Parse)?;
    if !version.starts_with("HTTP/") {
        return Err(HttpError::Parse);
    }
    parts
        .next()
        .ok_or(HttpError::Parse)?
        .parse()
        .map_err(|_| HttpError::Parse)
}

/// Parse a header value (case-insensitive)
pub fn parse_header<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}
