//! Minimal HTTP/1.1 client for Tapo devices.
//!
//! This implementation uses raw TCP sockets instead of an HTTP client library
//! because the embedded device servers reject lowercase header names, which
//! modern HTTP libraries emit unconditionally. Headers are sent title-case.
//!
//! One connection is opened per request. The `TP_SESSIONID` cookie handed out
//! during the handshake is replayed on every later request until
//! [`HttpTransport::reset_session`] is called.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::{
    error::Error,
    transport::{
        BASE_PATH, DEFAULT_PORT, DEFAULT_TIMEOUT, HttpResponse, HttpTransport, MAX_RESPONSE_LEN,
    },
};

/// Session cookie name used by KLAP devices.
const SESSION_COOKIE_NAME: &str = "TP_SESSIONID";

/// HTTP transport over a plain TCP connection.
///
/// Every connect, read and write is bounded by the configured timeout.
#[derive(Clone)]
pub struct RawHttpTransport {
    host: String,
    port: u16,
    timeout: Duration,
    session_cookie: Option<String>,
}

impl RawHttpTransport {
    /// Creates a transport for `host:port`.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            session_cookie: None,
        }
    }

    /// Returns the device port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` if a session cookie is currently held.
    pub fn has_session_cookie(&self) -> bool {
        self.session_cookie.is_some()
    }

    fn build_request(&self, path: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut request = format!(
            "POST {}/{} HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Accept: */*\r\n\
             Connection: close\r\n",
            BASE_PATH,
            path,
            self.host,
            self.port,
            content_type,
            body.len()
        );

        if let Some(cookie) = &self.session_cookie {
            request.push_str(&format!("Cookie: {}={}\r\n", SESSION_COOKIE_NAME, cookie));
        }

        request.push_str("\r\n");

        let mut bytes = request.into_bytes();
        bytes.extend_from_slice(body);
        bytes
    }

    async fn read_response(&self, stream: &mut TcpStream) -> Result<Vec<u8>, Error> {
        let mut response = Vec::with_capacity(1024);
        let mut buf = [0u8; 4096];

        loop {
            let n = timeout(self.timeout, stream.read(&mut buf))
                .await
                .map_err(|_| Error::Transport("read timed out".into()))??;

            if n == 0 {
                break;
            }

            response.extend_from_slice(&buf[..n]);
            if response.len() > MAX_RESPONSE_LEN {
                return Err(Error::Transport(format!(
                    "response exceeds {} bytes",
                    MAX_RESPONSE_LEN
                )));
            }

            if let Some(header_end) = find_header_end(&response) {
                let headers = String::from_utf8_lossy(&response[..header_end]);
                if let Some(content_length) = parse_content_length(&headers) {
                    let expected = header_end
                        .checked_add(4)
                        .and_then(|n| n.checked_add(content_length))
                        .filter(|&n| n <= MAX_RESPONSE_LEN)
                        .ok_or_else(|| {
                            Error::Transport(format!(
                                "Content-Length {} exceeds {} bytes",
                                content_length, MAX_RESPONSE_LEN
                            ))
                        })?;
                    if response.len() >= expected {
                        break;
                    }
                }
            }
        }

        Ok(response)
    }
}

#[async_trait]
impl HttpTransport for RawHttpTransport {
    async fn post(
        &mut self,
        path: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<HttpResponse, Error> {
        let request = self.build_request(path, content_type, body);

        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Transport(format!("connection to {} timed out", addr)))?
            .map_err(|e| Error::Transport(format!("connection to {} failed: {}", addr, e)))?;

        timeout(self.timeout, stream.write_all(&request))
            .await
            .map_err(|_| Error::Transport("write timed out".into()))??;

        let response = self.read_response(&mut stream).await?;

        let header_end = find_header_end(&response)
            .ok_or_else(|| Error::Transport("invalid HTTP response: no header end".into()))?;
        let headers = String::from_utf8_lossy(&response[..header_end]);

        let status = parse_status_code(&headers)
            .ok_or_else(|| Error::Transport("invalid HTTP response: no status code".into()))?;

        let mut body = response[header_end + 4..].to_vec();
        if let Some(content_length) = parse_content_length(&headers) {
            if body.len() < content_length {
                return Err(Error::Transport(format!(
                    "connection closed after {} of {} body bytes",
                    body.len(),
                    content_length
                )));
            }
            body.truncate(content_length);
        }

        if let Some(cookie) = parse_session_cookie(&headers) {
            self.session_cookie = Some(cookie);
        }

        debug!(
            host = %self.host,
            port = self.port,
            path,
            status,
            body_len = body.len(),
            "HTTP response received"
        );

        Ok(HttpResponse { status, body })
    }

    fn reset_session(&mut self) {
        self.session_cookie = None;
    }

    fn host(&self) -> &str {
        &self.host
    }
}

impl Default for RawHttpTransport {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT, DEFAULT_TIMEOUT)
    }
}

// Implement Debug manually to avoid exposing the session cookie
impl std::fmt::Debug for RawHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHttpTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("session_cookie", &"[REDACTED]")
            .finish()
    }
}

/// Find the position of "\r\n\r\n" in the response (end of headers).
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse the HTTP status code from the response headers.
fn parse_status_code(headers: &str) -> Option<u16> {
    headers
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

/// Parse the Content-Length header value.
fn parse_content_length(headers: &str) -> Option<usize> {
    header_values(headers, "content-length").find_map(|value| value.parse().ok())
}

/// Parse the session cookie from the Set-Cookie header.
fn parse_session_cookie(headers: &str) -> Option<String> {
    header_values(headers, "set-cookie").find_map(|value| {
        // "TP_SESSIONID=value;TIMEOUT=86400"
        value
            .split(';')
            .next()?
            .trim()
            .strip_prefix(SESSION_COOKIE_NAME)?
            .strip_prefix('=')
            .map(str::to_string)
    })
}

fn header_values<'a>(headers: &'a str, name: &'a str) -> impl Iterator<Item = &'a str> {
    headers.lines().skip(1).filter_map(move |line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}
