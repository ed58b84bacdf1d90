//! Error types for tapo-core.
//!
//! Every failure propagates to the immediate caller; nothing here is retried.
//! Use [`Error::is_login_failure`] to tell a credential or device identity
//! problem apart from a mid-session failure that calls for
//! [`ApiClient::refresh_session`](crate::ApiClient::refresh_session).

use thiserror::Error;

/// Error type for tapo-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The secure random source could not produce a local seed.
    #[error("randomness error: {0}")]
    Randomness(String),

    /// Network, I/O or timeout failure in the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered a request with a non-2xx status.
    ///
    /// This usually means the device expired the session.
    #[error("{endpoint} returned status {status}")]
    Status {
        /// Endpoint path the request was sent to.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// Handshake digest mismatch or non-2xx handshake response.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The response tag did not match; the response must not be trusted.
    #[error("integrity check failed: response tag mismatch")]
    Integrity,

    /// The frame is structurally invalid.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The sequence counter would overflow; a new login is required.
    #[error("sequence counter exhausted")]
    SequenceExhausted,

    /// A request was issued without an established session.
    #[error("not authenticated: call login first")]
    NotAuthenticated,

    /// Failed to serialize a request envelope.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failed to parse a decrypted response.
    #[error("parse error: {0}")]
    ParseError(String),

    /// The device returned a non-zero `error_code`.
    #[error("device error code {code}")]
    Device {
        /// The device-reported error code.
        code: i32,
    },

    /// Login failed; wraps the underlying cause.
    #[error("login failed: {0}")]
    LoginFailed(#[source] Box<Error>),
}

impl Error {
    /// Returns `true` if this error was raised while logging in.
    pub fn is_login_failure(&self) -> bool {
        matches!(self, Error::LoginFailed(_))
    }

    /// Returns the innermost error, unwrapping [`Error::LoginFailed`].
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::LoginFailed(inner) => inner.root_cause(),
            other => other,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
