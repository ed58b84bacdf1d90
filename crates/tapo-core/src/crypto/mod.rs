//! Cryptographic primitives for the KLAP protocol.
//!
//! - [`klap`]: auth hash, handshake digests and the session cipher
//! - [`random`]: injectable sources of handshake seeds

pub mod klap;
pub mod random;

pub use klap::{
    AuthHash, KlapCipher, Seed, SessionSeeds, handshake1_seed_auth_hash,
    handshake2_seed_auth_hash,
};
pub use random::{OsSeedSource, SeedSource};
