//! KLAP (Kasa Local Authentication Protocol) primitives.
//!
//! # Auth hash
//!
//! `auth_hash = sha256(sha1(username) + sha1(password))`
//!
//! # Handshake digests
//!
//! - handshake1 (server proof): `sha256(local_seed + remote_seed + auth_hash)`
//! - handshake2 (client proof): `sha256(remote_seed + local_seed + auth_hash)`
//!
//! The swapped seed order is what lets each side prove it derived the same
//! seeds without sending the auth hash.
//!
//! # Session cipher
//!
//! With `m = local_seed + remote_seed + auth_hash`:
//!
//! - key: `sha256("lsk" + m)[..16]`
//! - iv seed: `sha256("iv" + m)[..12]`, initial sequence from the last 4 bytes
//!   as a signed big-endian integer
//! - signing key: `sha256("ldk" + m)[..28]`
//!
//! Each request increments the sequence, encrypts with AES-128-CBC under
//! `iv_seed + seq`, and prefixes `sha256(signing_key + seq + ciphertext)`.

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{Credentials, error::Error};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Length of the local and remote seeds.
pub const SEED_LEN: usize = 16;

/// Length of the auth hash and of both handshake digests.
pub const DIGEST_LEN: usize = 32;

/// Length of the tag prefixed to every encrypted frame.
pub const TAG_LEN: usize = 32;

const KEY_LEN: usize = 16;
const IV_SEED_LEN: usize = 12;
const SIG_LEN: usize = 28;

const KEY_LABEL: &[u8] = b"lsk";
const IV_LABEL: &[u8] = b"iv";
const SIG_LABEL: &[u8] = b"ldk";

/// A 16-byte handshake seed.
pub type Seed = [u8; SEED_LEN];

/// Authentication secret derived from a username/password pair.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthHash([u8; DIGEST_LEN]);

impl AuthHash {
    /// Derives the auth hash: `sha256(sha1(username) + sha1(password))`.
    pub fn derive(credentials: &Credentials) -> Self {
        let username = Sha1::digest(credentials.username.as_bytes());
        let password = Sha1::digest(credentials.expose_password().as_bytes());
        Self(sha256_concat(&[&username[..], &password[..]]))
    }

    /// Returns the auth hash as bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl PartialEq for AuthHash {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl Eq for AuthHash {}

impl std::fmt::Debug for AuthHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthHash([REDACTED])")
    }
}

/// Seeds validated by a completed handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSeeds {
    /// Seed generated by the client.
    pub local: Seed,
    /// Seed supplied by the device.
    pub remote: Seed,
}

impl std::fmt::Debug for SessionSeeds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSeeds")
            .field("local", &hex::encode(self.local))
            .field("remote", &hex::encode(self.remote))
            .finish()
    }
}

/// Digest the device must return from handshake1.
pub fn handshake1_seed_auth_hash(
    local_seed: &Seed,
    remote_seed: &Seed,
    auth_hash: &AuthHash,
) -> [u8; DIGEST_LEN] {
    sha256_concat(&[&local_seed[..], &remote_seed[..], &auth_hash.as_bytes()[..]])
}

/// Digest the client sends in handshake2.
pub fn handshake2_seed_auth_hash(
    local_seed: &Seed,
    remote_seed: &Seed,
    auth_hash: &AuthHash,
) -> [u8; DIGEST_LEN] {
    sha256_concat(&[&remote_seed[..], &local_seed[..], &auth_hash.as_bytes()[..]])
}

/// Symmetric cipher for one authenticated KLAP session.
///
/// Key material is zeroized when the cipher is dropped. Logging in again
/// creates a new cipher; an instance is never re-keyed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KlapCipher {
    key: [u8; KEY_LEN],
    iv_seed: [u8; IV_SEED_LEN],
    sig: [u8; SIG_LEN],
    seq: i32,
}

impl KlapCipher {
    /// Derives session key material from handshake seeds and the auth hash.
    pub fn new(seeds: &SessionSeeds, auth_hash: &AuthHash) -> Self {
        let derive = |label: &[u8]| {
            Zeroizing::new(sha256_concat(&[
                label,
                &seeds.local[..],
                &seeds.remote[..],
                &auth_hash.as_bytes()[..],
            ]))
        };

        let key_digest = derive(KEY_LABEL);
        let iv_digest = derive(IV_LABEL);
        let sig_digest = derive(SIG_LABEL);

        let [.., a, b, c, d] = *iv_digest;

        Self {
            key: prefix(&key_digest),
            iv_seed: prefix(&iv_digest),
            sig: prefix(&sig_digest),
            seq: i32::from_be_bytes([a, b, c, d]),
        }
    }

    /// Returns the current sequence number.
    pub fn seq(&self) -> i32 {
        self.seq
    }

    /// Encrypts a request body.
    ///
    /// Increments the sequence and returns the frame with the sequence it is
    /// bound to. The sequence must be sent alongside the frame.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<(Vec<u8>, i32), Error> {
        let seq = self.seq.checked_add(1).ok_or(Error::SequenceExhausted)?;
        self.seq = seq;
        Ok((self.seal(plaintext, seq), seq))
    }

    /// Verifies and decrypts a response body against the current sequence.
    pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>, Error> {
        self.open(frame, self.seq)
    }

    pub(crate) fn seal(&self, plaintext: &[u8], seq: i32) -> Vec<u8> {
        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &self.iv_for(seq).into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut frame = Vec::with_capacity(TAG_LEN + ciphertext.len());
        frame.extend_from_slice(&self.tag(seq, &ciphertext));
        frame.extend_from_slice(&ciphertext);
        frame
    }

    pub(crate) fn open(&self, frame: &[u8], seq: i32) -> Result<Vec<u8>, Error> {
        if frame.len() < TAG_LEN {
            return Err(Error::MalformedFrame(format!(
                "frame is {} bytes, shorter than the {}-byte tag",
                frame.len(),
                TAG_LEN
            )));
        }

        let (tag, ciphertext) = frame.split_at(TAG_LEN);
        let expected = self.tag(seq, ciphertext);
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(Error::Integrity);
        }

        Aes128CbcDec::new(&self.key.into(), &self.iv_for(seq).into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::MalformedFrame("invalid block length or padding".into()))
    }

    fn iv_for(&self, seq: i32) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..IV_SEED_LEN].copy_from_slice(&self.iv_seed);
        iv[IV_SEED_LEN..].copy_from_slice(&seq.to_be_bytes());
        iv
    }

    fn tag(&self, seq: i32, ciphertext: &[u8]) -> [u8; TAG_LEN] {
        sha256_concat(&[&self.sig[..], &seq.to_be_bytes()[..], ciphertext])
    }
}

impl std::fmt::Debug for KlapCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlapCipher")
            .field("key", &"[REDACTED]")
            .field("seq", &self.seq)
            .finish()
    }
}

fn sha256_concat(parts: &[&[u8]]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn prefix<const N: usize>(digest: &[u8; DIGEST_LEN]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&digest[..N]);
    out
}
