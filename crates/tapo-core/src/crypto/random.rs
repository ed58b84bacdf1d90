//! Sources of handshake seeds.
//!
//! Login draws a fresh [`Seed`] for every attempt. Production code uses
//! [`OsSeedSource`]; tests inject fixed seeds to reproduce exact frames.

use rand::{TryRngCore, rngs::OsRng};

use crate::{crypto::klap::Seed, error::Error};

/// Supplies local seeds for the KLAP handshake.
///
/// Implementations must be cryptographically secure: predictable seeds break
/// mutual authentication.
pub trait SeedSource: Send + Sync {
    /// Returns a new 16-byte seed.
    fn next_seed(&mut self) -> Result<Seed, Error>;
}

/// Seed source backed by the operating system's secure RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn next_seed(&mut self) -> Result<Seed, Error> {
        let mut seed = Seed::default();
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| Error::Randomness(e.to_string()))?;
        Ok(seed)
    }
}
