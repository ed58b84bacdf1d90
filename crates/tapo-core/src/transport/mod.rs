//! HTTP transport used to reach a device's `/app` endpoints.
//!
//! The KLAP core only needs a byte-in/byte-out channel with status codes.
//! [`HttpTransport`] captures that contract; [`RawHttpTransport`] is the
//! implementation used against real devices.
//!
//! Endpoints, relative to the device base path `/app`:
//!
//! - `handshake1`: body = local seed, response = remote seed + server digest
//! - `handshake2`: body = client digest, success = any 2xx status
//! - `request?seq=<seq>`: body and response are encrypted frames

pub mod http;

pub use http::RawHttpTransport;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;

/// Default HTTP port for the KLAP protocol.
pub const DEFAULT_PORT: u16 = 80;

/// Default timeout for transport operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest HTTP response, headers included, a transport will buffer.
pub const MAX_RESPONSE_LEN: usize = 1024 * 1024;

/// Base path of the device API.
pub const BASE_PATH: &str = "/app";

/// Content type sent with every KLAP body (opaque bytes).
pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Path of the first handshake round.
pub const HANDSHAKE1_PATH: &str = "handshake1";

/// Path of the second handshake round.
pub const HANDSHAKE2_PATH: &str = "handshake2";

/// Returns the request path addressed by `seq`.
pub fn request_path(seq: i32) -> String {
    format!("request?seq={}", seq)
}

/// Status code and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response from a status code and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Byte-in/byte-out HTTP channel to a single device.
///
/// Implementations own any transport-level session state (cookies,
/// connection affinity) and must not retry or follow redirects.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POSTs `body` to `path` (relative to [`BASE_PATH`]).
    async fn post(
        &mut self,
        path: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<HttpResponse, Error>;

    /// Discards transport-level session state such as cookies.
    fn reset_session(&mut self);

    /// Returns the device host.
    fn host(&self) -> &str;
}
