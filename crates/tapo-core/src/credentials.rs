//! Credentials for authenticating with Tapo devices.
//!
//! Devices authenticate against the TP-Link cloud account the device was
//! provisioned with: the account email and its password, both case-sensitive.
//!
//! Passwords are stored using [`SecretString`] from the `secrecy` crate to
//! prevent accidental logging or display. Use
//! [`Credentials::expose_password()`] to access the raw value when it is
//! needed to derive the auth hash.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// Credentials for authenticating with a Tapo device.
///
/// # Example
///
/// ```
/// use tapo_core::Credentials;
///
/// let creds = Credentials::new("user@example.com", "password123");
/// assert_eq!(creds.username, "user@example.com");
/// assert_eq!(creds.expose_password(), "password123");
/// ```
#[derive(Clone)]
pub struct Credentials {
    /// The TP-Link account email address.
    pub username: String,
    /// The account password (protected from accidental logging).
    password: SecretString,
}

impl Credentials {
    /// Creates new credentials with the given username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Creates blank credentials (empty username and password).
    ///
    /// Devices that were never bound to a cloud account accept these.
    pub fn blank() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Returns `true` if both username and password are empty.
    pub fn is_blank(&self) -> bool {
        self.username.is_empty() && self.password.expose_secret().is_empty()
    }

    /// Exposes the password for hashing.
    ///
    /// Never log or display the returned value.
    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::blank()
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
            && self.password.expose_secret() == other.password.expose_secret()
    }
}

impl Eq for Credentials {}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
