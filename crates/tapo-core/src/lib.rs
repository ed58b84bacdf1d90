//! Core library for talking to TP-Link Tapo smart home devices over KLAP.
//!
//! KLAP is the authenticated, encrypted request/response protocol spoken by
//! current Tapo plugs, bulbs and hubs over HTTP. A session is set up with a
//! two-round handshake that proves both sides know the same credential hash,
//! then every request is encrypted with AES-128-CBC and authenticated with a
//! SHA-256 tag bound to a per-request sequence number.
//!
//! # Overview
//!
//! - [`crypto`]: auth hash, handshake digests and the session cipher
//! - [`handshake`]: the two handshake rounds
//! - [`transport`]: the HTTP seam and a minimal HTTP/1.1 client
//! - [`client`]: [`ApiClient`], which ties them together
//! - [`request`] / [`response`]: the JSON envelopes exchanged with devices
//!
//! # Example
//!
//! ```no_run
//! use tapo_core::{ApiClient, ClientConfig, Credentials, request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tapo_core::Error> {
//!     let config = ClientConfig::new("192.168.1.100")
//!         .with_credentials(Credentials::new("user@example.com", "password"));
//!     let mut client = ApiClient::connect(config).await?;
//!
//!     client
//!         .execute(request::SET_DEVICE_INFO, &request::DeviceOnParams { device_on: true })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Protocol Details
//!
//! 1. `POST /app/handshake1` with a random 16-byte local seed; the device
//!    answers with its remote seed and a digest over both seeds and the auth hash
//! 2. `POST /app/handshake2` with the client digest; the device answers 200
//! 3. `POST /app/request?seq=N` with `tag || AES-CBC(json)` for each request
//! 4. The response body uses the same framing under the same `N`

pub mod client;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod request;
pub mod response;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{ApiClient, ClientConfig, Clock, SessionState, SystemClock};
pub use credentials::Credentials;
pub use error::Error;
pub use response::ApiResponse;
pub use transport::{DEFAULT_PORT, DEFAULT_TIMEOUT, HttpResponse, HttpTransport, RawHttpTransport};

/// The version of the tapo-core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
